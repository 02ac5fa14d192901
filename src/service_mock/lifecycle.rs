use std::fmt::{self, Display, Formatter};

/// The lifecycle of a [`ServiceMock`](crate::ServiceMock).
///
/// ```text
/// Configuring --activate--> Active --dispose--> Disposed
///      |                                           ^
///      +------------------dispose------------------+
/// ```
///
/// A failed activation leaves the host in `Configuring`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Endpoints and mappings can be added; no network resources are held.
    Configuring,
    /// Listeners are bound and serving; mappings are frozen.
    Active,
    /// Listeners have been torn down. Terminal.
    Disposed,
}

impl LifecycleState {
    pub fn is_configuring(self) -> bool {
        self == LifecycleState::Configuring
    }

    /// The state after a successful activation, or `None` if activation is not allowed.
    pub(crate) fn activate(self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Configuring => Some(LifecycleState::Active),
            LifecycleState::Active | LifecycleState::Disposed => None,
        }
    }

    /// Disposal is allowed from every state; disposing twice is a no-op.
    pub(crate) fn dispose(self) -> LifecycleState {
        LifecycleState::Disposed
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Configuring => "Configuring",
            LifecycleState::Active => "Active",
            LifecycleState::Disposed => "Disposed",
        };
        f.write_str(name)
    }
}
