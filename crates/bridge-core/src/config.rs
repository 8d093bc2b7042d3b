//! Centralized configuration for the service bridge.
//!
//! Fixed limits live as associated constants on unit structs; the only
//! runtime configuration is the proxy [`AllowList`].

use std::collections::BTreeSet;
use std::time::Duration;

/// Limits and timeouts for the local IPC channel.
pub struct IpcConfig;

impl IpcConfig {
    pub const BIND_HOST: &'static str = "127.0.0.1";
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16MB
    pub const MAX_CONNECTIONS: usize = 32;
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const READY_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Markers printed by the host binary so a parent process can discover it.
pub struct LaunchConfig;

impl LaunchConfig {
    pub const PORT_PREFIX: &'static str = "BRIDGE_PORT=";
    pub const READY_LINE: &'static str = "BRIDGE_READY";
}

/// Static set of service names whose calls are forwarded to the host.
///
/// Names not on the list are handed out as local references; calls against
/// them run inside the satellite and do not reach the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    names: BTreeSet<String>,
}

impl AllowList {
    /// Create an allow-list from service and mutator names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// An allow-list that forwards nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn allows(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_membership() {
        let mut list = AllowList::new(["ScenesService", "Scene"]);
        assert!(list.allows("ScenesService"));
        assert!(!list.allows("LayoutService"));

        list.insert("LayoutService");
        assert!(list.allows("LayoutService"));
        assert_eq!(list.names().count(), 3);
    }

    #[test]
    fn test_empty_allow_list_forwards_nothing() {
        assert!(!AllowList::empty().allows("ScenesService"));
    }

    #[test]
    fn test_limits_are_reasonable() {
        assert!(IpcConfig::MAX_MESSAGE_SIZE >= 1024 * 1024);
        assert!(IpcConfig::CONNECT_TIMEOUT > Duration::ZERO);
    }
}
