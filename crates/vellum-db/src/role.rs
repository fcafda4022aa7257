use std::sync::OnceLock;

/// Process-wide server role. Selects the local or the coordinator CRUD
/// pipeline and gates index scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    Single,
    DbServer,
    Coordinator,
}

static ROLE: OnceLock<ServerRole> = OnceLock::new();

impl ServerRole {
    /// Fix the role for this process. Later calls have no effect.
    pub fn initialize(role: ServerRole) {
        let _ = ROLE.set(role);
    }

    pub fn current() -> ServerRole {
        ROLE.get().copied().unwrap_or(ServerRole::Single)
    }

    pub fn is_coordinator(self) -> bool {
        self == ServerRole::Coordinator
    }
}
