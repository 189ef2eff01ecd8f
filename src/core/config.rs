//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{FfgError, Result};

/// Full Freefall Guard configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub protection: ProtectionConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// Protection durations and sensor-failure escalation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Protection length while on AC power or with the lid open.
    pub short_duration_secs: u64,
    /// Protection length on battery with the lid closed.
    pub long_duration_secs: u64,
    /// Unload timeout handed to the drive itself. Kept above the longest
    /// protection duration so the hardware self-unparks if the daemon never
    /// sends the unpark.
    pub park_timeout_secs: u64,
    /// Consecutive failed sensor reads before the daemon gives up.
    pub max_sensor_read_failures: u32,
}

/// Hardware attribute and device paths. All overridable so tests can point
/// the daemon at a scratch tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub freefall_device: PathBuf,
    pub sysfs_block_root: PathBuf,
    pub led_brightness: PathBuf,
    pub ac_online: PathBuf,
    pub lid_state: PathBuf,
}

/// Activity log tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub jsonl_log: PathBuf,
    pub fallback_log: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
    pub channel_capacity: usize,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            short_duration_secs: 2,
            long_duration_secs: 20,
            park_timeout_secs: 21,
            max_sensor_read_failures: 5,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("/etc/ffg/config.toml"),
            freefall_device: PathBuf::from("/dev/freefall"),
            sysfs_block_root: PathBuf::from("/sys/block"),
            led_brightness: PathBuf::from("/sys/class/leds/hp::hddprotect/brightness"),
            ac_online: PathBuf::from("/sys/class/power_supply/AC0/online"),
            lid_state: PathBuf::from("/proc/acpi/button/lid/LID/state"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            jsonl_log: PathBuf::from("/var/log/ffg/activity.jsonl"),
            fallback_log: Some(PathBuf::from("/dev/shm/ffg.jsonl")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 10,
            channel_capacity: 256,
        }
    }
}

/// Protection durations resolved to `Duration`, consumed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationPolicy {
    /// Applied on AC power or with the lid open.
    pub short: Duration,
    /// Applied on battery with the lid closed.
    pub long: Duration,
    /// Unload timeout written to the drive on park.
    pub park_timeout: Duration,
}

impl ProtectionConfig {
    /// Resolve configured seconds into the policy the controller consumes.
    #[must_use]
    pub fn policy(&self) -> DurationPolicy {
        DurationPolicy {
            short: Duration::from_secs(self.short_duration_secs),
            long: Duration::from_secs(self.long_duration_secs),
            park_timeout: Duration::from_secs(self.park_timeout_secs),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default
    /// path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| FfgError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(FfgError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for startup logging.
    ///
    /// Uses FNV-1a for cross-process-stable hashing.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(env_var)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // protection
        set_env_u64(
            &mut lookup,
            "FFG_PROTECTION_SHORT_DURATION_SECS",
            &mut self.protection.short_duration_secs,
        )?;
        set_env_u64(
            &mut lookup,
            "FFG_PROTECTION_LONG_DURATION_SECS",
            &mut self.protection.long_duration_secs,
        )?;
        set_env_u64(
            &mut lookup,
            "FFG_PROTECTION_PARK_TIMEOUT_SECS",
            &mut self.protection.park_timeout_secs,
        )?;
        set_env_u32(
            &mut lookup,
            "FFG_PROTECTION_MAX_SENSOR_READ_FAILURES",
            &mut self.protection.max_sensor_read_failures,
        )?;

        // paths
        set_env_path(
            &mut lookup,
            "FFG_PATHS_FREEFALL_DEVICE",
            &mut self.paths.freefall_device,
        );
        set_env_path(
            &mut lookup,
            "FFG_PATHS_SYSFS_BLOCK_ROOT",
            &mut self.paths.sysfs_block_root,
        );
        set_env_path(
            &mut lookup,
            "FFG_PATHS_LED_BRIGHTNESS",
            &mut self.paths.led_brightness,
        );
        set_env_path(&mut lookup, "FFG_PATHS_AC_ONLINE", &mut self.paths.ac_online);
        set_env_path(&mut lookup, "FFG_PATHS_LID_STATE", &mut self.paths.lid_state);

        // logging
        if let Some(raw) = lookup("FFG_LOGGING_JSONL_LOG") {
            self.logging.jsonl_log = PathBuf::from(raw);
        }
        set_env_u64(
            &mut lookup,
            "FFG_LOGGING_MAX_SIZE_BYTES",
            &mut self.logging.max_size_bytes,
        )?;
        set_env_u32(
            &mut lookup,
            "FFG_LOGGING_MAX_ROTATED_FILES",
            &mut self.logging.max_rotated_files,
        )?;
        set_env_u64(
            &mut lookup,
            "FFG_LOGGING_FSYNC_INTERVAL_SECS",
            &mut self.logging.fsync_interval_secs,
        )?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let p = &self.protection;
        if p.short_duration_secs == 0 {
            return Err(FfgError::InvalidConfig {
                details: "protection.short_duration_secs must be >= 1".to_string(),
            });
        }
        if p.long_duration_secs < p.short_duration_secs {
            return Err(FfgError::InvalidConfig {
                details: format!(
                    "protection.long_duration_secs ({}) must be >= short_duration_secs ({})",
                    p.long_duration_secs, p.short_duration_secs
                ),
            });
        }
        // The drive's own unload timeout is the fallback when the unpark
        // write never lands; it must outlast every protection duration.
        if p.park_timeout_secs <= p.long_duration_secs {
            return Err(FfgError::InvalidConfig {
                details: format!(
                    "protection.park_timeout_secs ({}) must be > long_duration_secs ({})",
                    p.park_timeout_secs, p.long_duration_secs
                ),
            });
        }
        if p.max_sensor_read_failures == 0 {
            return Err(FfgError::InvalidConfig {
                details: "protection.max_sensor_read_failures must be >= 1".to_string(),
            });
        }
        if self.logging.channel_capacity == 0 {
            return Err(FfgError::InvalidConfig {
                details: "logging.channel_capacity must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u64<F>(lookup: &mut F, name: &str, slot: &mut u64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.parse::<u64>().map_err(|error| FfgError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u32<F>(lookup: &mut F, name: &str, slot: &mut u32) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.parse::<u32>().map_err(|error| FfgError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_path<F>(lookup: &mut F, name: &str, slot: &mut PathBuf)
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = PathBuf::from(raw);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use super::{Config, FfgError};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    fn apply(cfg: &mut Config, pairs: &[(&str, &str)]) -> super::Result<()> {
        let table = vars(pairs);
        cfg.apply_env_overrides_from(|name| table.get(name).cloned())
    }

    #[test]
    fn defaults_match_hardware_conventions() {
        let cfg = Config::default();
        assert_eq!(cfg.protection.short_duration_secs, 2);
        assert_eq!(cfg.protection.long_duration_secs, 20);
        assert_eq!(cfg.protection.park_timeout_secs, 21);
        assert_eq!(cfg.paths.freefall_device, Path::new("/dev/freefall"));
        assert_eq!(cfg.paths.sysfs_block_root, Path::new("/sys/block"));
        assert!(
            cfg.paths
                .led_brightness
                .to_string_lossy()
                .contains("hddprotect")
        );
    }

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        apply(
            &mut cfg,
            &[
                ("FFG_PROTECTION_LONG_DURATION_SECS", "30"),
                ("FFG_PROTECTION_PARK_TIMEOUT_SECS", "31"),
                ("FFG_PATHS_FREEFALL_DEVICE", "/tmp/fake-freefall"),
            ],
        )
        .expect("overrides should apply");
        assert_eq!(cfg.protection.long_duration_secs, 30);
        assert_eq!(cfg.protection.park_timeout_secs, 31);
        assert_eq!(cfg.paths.freefall_device, PathBuf::from("/tmp/fake-freefall"));
    }

    #[test]
    fn env_override_rejects_garbage() {
        let mut cfg = Config::default();
        let err = apply(&mut cfg, &[("FFG_PROTECTION_LONG_DURATION_SECS", "soon")])
            .expect_err("garbage value should fail");
        assert!(matches!(err, FfgError::ConfigParse { .. }));
        assert!(err.to_string().contains("FFG_PROTECTION_LONG_DURATION_SECS"));
    }

    #[test]
    fn blank_env_value_is_ignored() {
        let mut cfg = Config::default();
        apply(&mut cfg, &[("FFG_PROTECTION_LONG_DURATION_SECS", "  ")])
            .expect("blank value should be skipped");
        assert_eq!(cfg.protection.long_duration_secs, 20);
    }

    #[test]
    fn validate_rejects_park_timeout_not_exceeding_long_duration() {
        let mut cfg = Config::default();
        cfg.protection.park_timeout_secs = cfg.protection.long_duration_secs;
        let err = cfg.validate().expect_err("equal timeout should fail");
        assert!(matches!(err, FfgError::InvalidConfig { .. }));
        assert!(err.to_string().contains("park_timeout_secs"));
    }

    #[test]
    fn validate_rejects_short_longer_than_long() {
        let mut cfg = Config::default();
        cfg.protection.short_duration_secs = 25;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_missing_explicit_path_errors() {
        let err = Config::load(Some(Path::new("/nonexistent/ffg.toml")))
            .expect_err("missing explicit config should fail");
        assert!(matches!(err, FfgError::MissingConfig { .. }));
    }

    #[test]
    fn load_parses_toml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).expect("create config");
        writeln!(
            file,
            "[protection]\nshort_duration_secs = 3\nlong_duration_secs = 25\npark_timeout_secs = 26"
        )
        .expect("write config");

        let cfg = Config::load(Some(&path)).expect("config should load");
        assert_eq!(cfg.protection.short_duration_secs, 3);
        assert_eq!(cfg.protection.long_duration_secs, 25);
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn load_rejects_invalid_toml_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[protection]\nshort_duration_secs = 0\n").expect("write config");
        let err = Config::load(Some(&path)).expect_err("zero duration should fail validation");
        assert!(matches!(err, FfgError::InvalidConfig { .. }));
    }

    #[test]
    fn stable_hash_is_deterministic() {
        let a = Config::default().stable_hash().expect("hash");
        let b = Config::default().stable_hash().expect("hash");
        assert_eq!(a, b);

        let mut changed = Config::default();
        changed.protection.long_duration_secs = 30;
        let c = changed.stable_hash().expect("hash");
        assert_ne!(a, c);
    }

    #[test]
    fn policy_resolves_durations() {
        let policy = Config::default().protection.policy();
        assert_eq!(policy.short.as_secs(), 2);
        assert_eq!(policy.long.as_secs(), 20);
        assert_eq!(policy.park_timeout.as_secs(), 21);
    }
}
