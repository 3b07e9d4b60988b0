use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use naval_lib::lobby::SessionSummary;
use naval_lib::{Mode, SessionId};
use rand::{thread_rng, Rng};

use crate::session::{SeatHandle, SeatSender, Session, SessionError, SessionResult};

/// Registry of live sessions.
///
/// The registry lock is always taken before any session lock.
#[derive(Clone, Debug, Default)]
pub struct ServerState {
    sessions: Arc<Mutex<HashMap<SessionId, Arc<Session>>>>,
}

impl ServerState {
    /// Seat a player in the open session of `mode` with the lowest id, opening a new session
    /// when there is none.
    pub fn create_or_join(
        &self,
        mode: Mode,
        name: Option<String>,
        tx: SeatSender,
    ) -> SessionResult<SeatHandle> {
        let mut sessions = self.sessions();
        let open = sessions
            .values()
            .filter(|s| s.mode() == mode && s.lock().is_open())
            .min_by_key(|s| s.id())
            .cloned();

        let session = match open {
            Some(session) => session,
            None => {
                let session_id = Self::gen_session_id(&sessions);
                let session = Arc::new(Session::new(session_id, mode));
                sessions.insert(session_id, session.clone());
                tracing::info!(%session_id, %mode, "Session opened");
                session
            }
        };

        let seat = session.apply(|state, out| state.admit(name, tx, out))?;
        Ok(SeatHandle::new(self.clone(), session, seat))
    }

    /// Seat a player in a specific session.
    ///
    /// # Errors
    ///
    /// Will return [`SessionError::SessionNotFound`] if no session of `mode` has this id, and
    /// [`SessionError::SessionFull`] if it has no free seat or has already started.
    pub fn join_by_id(
        &self,
        session_id: SessionId,
        mode: Mode,
        name: Option<String>,
        tx: SeatSender,
    ) -> SessionResult<SeatHandle> {
        let sessions = self.sessions();
        let session = sessions
            .get(&session_id)
            .filter(|s| s.mode() == mode)
            .ok_or(SessionError::SessionNotFound)?
            .clone();

        let seat = session.apply(|state, out| state.admit(name, tx, out))?;
        Ok(SeatHandle::new(self.clone(), session, seat))
    }

    /// Sessions still waiting for players, ordered by id.
    pub fn list_open(&self) -> Vec<SessionSummary> {
        let mut open = self
            .sessions()
            .values()
            .filter_map(|s| {
                let state = s.lock();
                state.is_open().then(|| state.summary())
            })
            .collect::<Vec<_>>();
        open.sort_by_key(|s| s.session_id);
        open
    }

    #[cfg(test)]
    pub fn get(&self, session_id: SessionId) -> Option<Arc<Session>> {
        self.sessions().get(&session_id).cloned()
    }

    /// Remove a session once its last seat is gone. Returns whether it was removed.
    pub fn retire(&self, session_id: SessionId) -> bool {
        let mut sessions = self.sessions();
        let Some(phase) = sessions.get(&session_id).and_then(|s| {
            let state = s.lock();
            state.is_empty().then(|| state.phase())
        }) else {
            return false;
        };
        sessions.remove(&session_id);
        tracing::info!(%session_id, %phase, "Closing session");
        true
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gen_session_id(sessions: &HashMap<SessionId, Arc<Session>>) -> SessionId {
        let mut session_id;
        loop {
            session_id = thread_rng().gen::<u32>().into();
            if !sessions.contains_key(&session_id) {
                break;
            };
        }
        session_id
    }
}
