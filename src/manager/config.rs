//! Manager configuration.

use std::time::Duration;

/// Default deployment name, matching the root web context.
pub const DEFAULT_DEPLOYMENT_NAME: &str = "ROOT";

/// Default inactive interval for new sessions.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Immutable settings a manager is built with.
///
/// Every value here is resolved before the manager exists. In particular the
/// orphan-session flag is read from the environment once, by
/// [`Config::load`](crate::config::Config::load), and never re-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Name of the web deployment the sessions belong to.
    pub deployment_name: String,
    /// Inactive interval for sessions created without an explicit one.
    pub default_timeout: Duration,
    /// Upper bound on live sessions. `None` means unbounded.
    pub max_active_sessions: Option<usize>,
    /// Whether statistics are collected.
    pub statistics_enabled: bool,
    /// Whether sessions owned by departed cluster members may be served.
    pub orphan_session_allowed: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            default_timeout: DEFAULT_SESSION_TIMEOUT,
            max_active_sessions: None,
            statistics_enabled: true,
            orphan_session_allowed: false,
        }
    }
}

impl ManagerConfig {
    pub fn new(deployment_name: impl Into<String>) -> Self {
        Self {
            deployment_name: deployment_name.into(),
            ..Default::default()
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_active_sessions(mut self, max: Option<usize>) -> Self {
        self.max_active_sessions = max;
        self
    }

    /// Set the bound from a signed value; negative means unbounded.
    pub fn with_max_active_sessions_signed(mut self, max: i64) -> Self {
        self.max_active_sessions = max_from_signed(max);
        self
    }

    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.statistics_enabled = enabled;
        self
    }

    pub fn with_orphan_session_allowed(mut self, allowed: bool) -> Self {
        self.orphan_session_allowed = allowed;
        self
    }
}

/// Negative bounds are the conventional spelling of "unbounded".
pub(crate) fn max_from_signed(max: i64) -> Option<usize> {
    usize::try_from(max).ok()
}
