//! AC-power and lid state, pulled on demand per pulse.
//!
//! Unreadable state biases toward the longer protection duration: a machine
//! we know nothing about is assumed to be on battery with the lid closed.
//! The original hardware daemon assumed the opposite; here absence of
//! information must never select the weaker protection.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::config::DurationPolicy;

/// Instantaneous power/lid snapshot, recomputed per event and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerProfile {
    pub on_ac: bool,
    pub lid_open: bool,
}

impl PowerProfile {
    /// Map the snapshot to a protection duration.
    ///
    /// On AC (any lid state) or with the lid open the machine is likely in
    /// use on a desk; battery with the lid closed means it is being carried.
    #[must_use]
    pub fn protection_duration(&self, policy: &DurationPolicy) -> Duration {
        if self.on_ac || self.lid_open {
            policy.short
        } else {
            policy.long
        }
    }
}

/// A profile read, with flags recording which attributes fell back to the
/// conservative default because the file was missing or unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileReading {
    pub profile: PowerProfile,
    pub ac_fallback: bool,
    pub lid_fallback: bool,
}

/// Power/lid state source. Pull model; the system has no subscription to
/// power-state change events.
pub trait PowerSource: Send {
    /// Current AC state, or `None` when unreadable.
    fn ac_online(&self) -> Option<bool>;
    /// Current lid state, or `None` when unreadable.
    fn lid_open(&self) -> Option<bool>;

    /// Snapshot both attributes, applying the fail-safe defaults.
    fn profile(&self) -> ProfileReading {
        let ac = self.ac_online();
        let lid = self.lid_open();
        ProfileReading {
            profile: PowerProfile {
                on_ac: ac.unwrap_or(false),
                lid_open: lid.unwrap_or(false),
            },
            ac_fallback: ac.is_none(),
            lid_fallback: lid.is_none(),
        }
    }
}

/// Sysfs/procfs-backed power source.
#[derive(Debug)]
pub struct SysfsPowerSource {
    ac_online_path: PathBuf,
    lid_state_path: PathBuf,
}

impl SysfsPowerSource {
    #[must_use]
    pub fn new(ac_online_path: &Path, lid_state_path: &Path) -> Self {
        Self {
            ac_online_path: ac_online_path.to_path_buf(),
            lid_state_path: lid_state_path.to_path_buf(),
        }
    }
}

impl PowerSource for SysfsPowerSource {
    fn ac_online(&self) -> Option<bool> {
        let raw = fs::read_to_string(&self.ac_online_path).ok()?;
        Some(raw.trim() == "1")
    }

    fn lid_open(&self) -> Option<bool> {
        // The ACPI file reads like "state:      open".
        let raw = fs::read_to_string(&self.lid_state_path).ok()?;
        Some(raw.to_ascii_lowercase().contains("open"))
    }
}

// ──────────────────── mock ────────────────────

/// In-memory power source; `None` simulates an unreadable attribute.
#[derive(Debug, Clone)]
pub struct MockPowerSource {
    ac: Arc<Mutex<Option<bool>>>,
    lid: Arc<Mutex<Option<bool>>>,
}

impl MockPowerSource {
    #[must_use]
    pub fn new(ac: Option<bool>, lid: Option<bool>) -> Self {
        Self {
            ac: Arc::new(Mutex::new(ac)),
            lid: Arc::new(Mutex::new(lid)),
        }
    }

    pub fn set_ac(&self, ac: Option<bool>) {
        *self.ac.lock() = ac;
    }

    pub fn set_lid(&self, lid: Option<bool>) {
        *self.lid.lock() = lid;
    }
}

impl PowerSource for MockPowerSource {
    fn ac_online(&self) -> Option<bool> {
        *self.ac.lock()
    }

    fn lid_open(&self) -> Option<bool> {
        *self.lid.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DurationPolicy {
        DurationPolicy {
            short: Duration::from_secs(2),
            long: Duration::from_secs(20),
            park_timeout: Duration::from_secs(21),
        }
    }

    #[test]
    fn duration_policy_table_holds_for_all_combinations() {
        let cases = [
            (true, true, 2),
            (true, false, 2),
            (false, true, 2),
            (false, false, 20),
        ];
        for (on_ac, lid_open, expected_secs) in cases {
            let profile = PowerProfile { on_ac, lid_open };
            assert_eq!(
                profile.protection_duration(&policy()).as_secs(),
                expected_secs,
                "on_ac={on_ac} lid_open={lid_open}"
            );
        }
    }

    #[test]
    fn unreadable_state_falls_back_to_longest_duration() {
        let source = MockPowerSource::new(None, None);
        let reading = source.profile();
        assert!(reading.ac_fallback);
        assert!(reading.lid_fallback);
        assert_eq!(
            reading.profile.protection_duration(&policy()).as_secs(),
            20
        );
    }

    #[test]
    fn sysfs_reads_ac_online_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ac = dir.path().join("online");
        let lid = dir.path().join("state");
        fs::write(&ac, "1\n").expect("seed ac");
        fs::write(&lid, "state:      open\n").expect("seed lid");

        let source = SysfsPowerSource::new(&ac, &lid);
        assert_eq!(source.ac_online(), Some(true));
        assert_eq!(source.lid_open(), Some(true));

        fs::write(&ac, "0\n").expect("flip ac");
        fs::write(&lid, "state:      closed\n").expect("flip lid");
        assert_eq!(source.ac_online(), Some(false));
        assert_eq!(source.lid_open(), Some(false));
    }

    #[test]
    fn sysfs_missing_files_read_as_none() {
        let source = SysfsPowerSource::new(
            Path::new("/nonexistent/online"),
            Path::new("/nonexistent/state"),
        );
        assert_eq!(source.ac_online(), None);
        assert_eq!(source.lid_open(), None);
        let reading = source.profile();
        assert!(!reading.profile.on_ac);
        assert!(!reading.profile.lid_open);
    }
}
