//! Host limits on message queue attributes
//!
//! Linux exposes the per-queue limits under `/proc/sys/fs/mqueue`. Privileged
//! processes (`CAP_SYS_RESOURCE`) may go up to the kernel's hard ceilings
//! instead.

use std::fs;
use std::path::Path;

const MQUEUE_SYSCTL_DIR: &str = "/proc/sys/fs/mqueue";
const PROC_SELF_STATUS: &str = "/proc/self/status";

/// Capability bit that lifts the sysctl limits, see capabilities(7)
const CAP_SYS_RESOURCE: u32 = 24;

/// Kernel ceiling for `mq_maxmsg` with `CAP_SYS_RESOURCE`
pub const HARD_MSGMAX: u64 = 65_536;

/// Kernel ceiling for `mq_msgsize` with `CAP_SYS_RESOURCE`
pub const HARD_MSGSIZEMAX: u64 = 16 * 1024 * 1024;

/// Limits applying to newly created channels; `None` means unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostLimits {
    /// Maximum queued messages per channel
    pub max_messages: Option<u64>,
    /// Maximum message size in bytes
    pub max_message_size: Option<u64>,
    /// Maximum number of queues on the host
    pub max_queues: Option<u64>,
}

impl HostLimits {
    /// No known limits
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Read the limits of the running host
    pub fn detect() -> Self {
        let privileged = has_sys_resource(Path::new(PROC_SELF_STATUS));
        Self::read_from(Path::new(MQUEUE_SYSCTL_DIR), privileged)
    }

    /// Read limits from a sysctl-style directory
    pub fn read_from(dir: &Path, privileged: bool) -> Self {
        let read = |file: &str| -> Option<u64> {
            fs::read_to_string(dir.join(file))
                .ok()
                .and_then(|s| s.trim().parse().ok())
        };

        let mut limits = Self {
            max_messages: read("msg_max"),
            max_message_size: read("msgsize_max"),
            max_queues: read("queues_max"),
        };

        if privileged {
            limits.max_messages = limits.max_messages.map(|v| v.max(HARD_MSGMAX));
            limits.max_message_size = limits.max_message_size.map(|v| v.max(HARD_MSGSIZEMAX));
        }

        limits
    }
}

/// Whether the effective capability set in a `/proc/<pid>/status` file
/// holds `CAP_SYS_RESOURCE`
///
/// Root inside a container often lacks it, so the effective uid says nothing.
/// An unreadable or malformed file counts as unprivileged.
fn has_sys_resource(status: &Path) -> bool {
    fs::read_to_string(status)
        .ok()
        .and_then(|text| effective_caps(&text))
        .map_or(false, |caps| caps & (1 << CAP_SYS_RESOURCE) != 0)
}

fn effective_caps(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("CapEff:"))
        .and_then(|hex| u64::from_str_radix(hex.trim(), 16).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sysctl_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("mq_relay_limits_{}_{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("msg_max"), "10\n").unwrap();
        fs::write(dir.join("msgsize_max"), "8192\n").unwrap();
        fs::write(dir.join("queues_max"), "256\n").unwrap();
        dir
    }

    #[test]
    fn test_read_limits() {
        let dir = sysctl_dir("plain");
        let limits = HostLimits::read_from(&dir, false);

        assert_eq!(limits.max_messages, Some(10));
        assert_eq!(limits.max_message_size, Some(8192));
        assert_eq!(limits.max_queues, Some(256));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_privileged_uses_hard_ceiling() {
        let dir = sysctl_dir("priv");
        let limits = HostLimits::read_from(&dir, true);

        assert_eq!(limits.max_messages, Some(HARD_MSGMAX));
        assert_eq!(limits.max_message_size, Some(HARD_MSGSIZEMAX));

        fs::remove_dir_all(dir).unwrap();
    }

    fn status_file(tag: &str, cap_eff: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("mq_relay_status_{}_{}", tag, std::process::id()));
        let text = format!(
            "Name:\tmq-relay\nUid:\t0\t0\t0\t0\nCapInh:\t0000000000000000\n\
             CapPrm:\t{cap}\nCapEff:\t{cap}\nCapBnd:\t{cap}\n",
            cap = cap_eff
        );
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_root_without_sys_resource_is_unprivileged() {
        // Typical container root: everything but CAP_SYS_RESOURCE
        let status = status_file("nocap", "000001fffeffffff");
        assert!(!has_sys_resource(&status));

        let dir = sysctl_dir("nocap");
        let limits = HostLimits::read_from(&dir, has_sys_resource(&status));
        assert_eq!(limits.max_messages, Some(10));
        assert_eq!(limits.max_message_size, Some(8192));

        fs::remove_file(status).unwrap();
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_sys_resource_bit_grants_privilege() {
        let status = status_file("cap", "000001ffffffffff");
        assert!(has_sys_resource(&status));
        fs::remove_file(status).unwrap();

        let only_bit = status_file("onlybit", "0000000001000000");
        assert!(has_sys_resource(&only_bit));
        fs::remove_file(only_bit).unwrap();
    }

    #[test]
    fn test_unreadable_status_is_unprivileged() {
        assert!(!has_sys_resource(Path::new("/nonexistent/status")));
        assert_eq!(effective_caps("Name:\tx\nCapEff:\tzz\n"), None);
    }

    #[test]
    fn test_missing_dir_is_unknown() {
        let limits = HostLimits::read_from(Path::new("/nonexistent/mqueue"), false);
        assert_eq!(limits, HostLimits::unlimited());
    }
}
