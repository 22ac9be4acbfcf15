//! Process session
//!
//! A session lives exactly as long as the process. Its id is generated when
//! the SDK context is created and is never written back as something to
//! resume on the next start.

use chrono::{DateTime, Utc};

use super::newtypes::SessionId;

/// One process lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Starts a fresh session with a random id
    pub fn start() -> Self {
        Self {
            id: SessionId::new(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
