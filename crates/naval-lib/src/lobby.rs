use std::fmt::{self, Display};

use crate::SessionId;

/// Lifecycle of a session. Only ever moves forward, one step at a time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Waiting,
    Setup,
    Active,
    Finished,
}

impl Phase {
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Waiting => Some(Phase::Setup),
            Phase::Setup => Some(Phase::Active),
            Phase::Active => Some(Phase::Finished),
            Phase::Finished => None,
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Waiting => "WAITING",
            Phase::Setup => "SETUP",
            Phase::Active => "ACTIVE",
            Phase::Finished => "FINISHED",
        })
    }
}

/// One entry of a `GAMES_LIST` reply: `<display_name>|<session_id>|<current>|<max>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub display_name: String,
    pub session_id: SessionId,
    pub current_seats: usize,
    pub max_seats: usize,
}

impl Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.display_name, self.session_id, self.current_seats, self.max_seats
        )
    }
}
