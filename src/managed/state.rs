//! # Lifecycle states of a managed resource.

/// Where a managed resource is in its lifecycle.
///
/// ```text
/// Initialized ──start ok──► Started ──stop──► Stopping ──teardown──► Stopped
///      │  ▲                                                             ▲
///      │  └── start failed/cancelled                                    │
///      └──────────────────────── stop before start ─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedState {
    /// Created; `start` not yet successful.
    Initialized,
    /// Setup succeeded; borrows succeed.
    Started,
    /// `stop` called; waiting for outstanding leases, then teardown.
    Stopping,
    /// Teardown finished (or the resource was never started).
    Stopped,
}

impl ManagedState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagedState::Initialized => "initialized",
            ManagedState::Started => "started",
            ManagedState::Stopping => "stopping",
            ManagedState::Stopped => "stopped",
        }
    }
}
