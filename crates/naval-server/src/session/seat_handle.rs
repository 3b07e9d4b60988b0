use std::sync::Arc;

use naval_lib::board::{Coord, Orientation, Outcome};
use naval_lib::lobby::Phase;
use naval_lib::{SeatId, SessionId};
use tokio::sync::watch;

use super::{Session, SessionResult};
use crate::state::ServerState;

/// A connection's seat in a session.
///
/// Every call locks the session for the duration of one mutation. Dropping the handle
/// removes the seat and retires the session once nobody is left in it.
#[derive(Debug)]
pub struct SeatHandle {
    state: ServerState,
    session: Arc<Session>,
    seat: SeatId,
}

impl SeatHandle {
    pub(crate) fn new(state: ServerState, session: Arc<Session>, seat: SeatId) -> Self {
        Self {
            state,
            session,
            seat,
        }
    }

    pub fn seat(&self) -> SeatId {
        self.seat
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.session.subscribe_phase()
    }

    pub fn set_team_name(&self, name: String) -> SessionResult<()> {
        self.session
            .apply(|state, out| state.set_team_name(self.seat, name, out))
    }

    pub fn place_ship(
        &self,
        name: &str,
        size: u8,
        at: Coord,
        orientation: Orientation,
    ) -> SessionResult<()> {
        self.session
            .apply(|state, out| state.place_ship(self.seat, name, size, at, orientation, out))
    }

    pub fn finish_setup(&self) -> SessionResult<()> {
        self.session
            .apply(|state, out| state.finish_setup(self.seat, out))
    }

    pub fn attack(&self, target: SeatId, at: Coord) -> SessionResult<Outcome> {
        self.session
            .apply(|state, out| state.attack(self.seat, target, at, out))
    }

    pub fn shot(&self, at: Coord) -> SessionResult<Outcome> {
        self.session.apply(|state, out| state.shot(self.seat, at, out))
    }

    pub fn report_result(&self, at: Coord, hit: bool) -> SessionResult<()> {
        self.session.lock().report_result(self.seat, at, hit)
    }

    pub fn report_sunk(&self, name: &str, cells: &[Coord]) -> SessionResult<()> {
        self.session.lock().report_sunk(self.seat, name, cells)
    }

    pub fn claim_win(&self) -> SessionResult<()> {
        self.session.apply(|state, out| state.claim_win(self.seat, out))
    }
}

impl Drop for SeatHandle {
    fn drop(&mut self) {
        self.session.apply(|state, out| state.leave(self.seat, out));
        self.state.retire(self.session.id());
    }
}

#[cfg(test)]
mod test {
    use naval_lib::lobby::Phase;
    use naval_lib::net::ServerMessage;
    use naval_lib::Mode;
    use tokio::sync::mpsc;

    use crate::state::ServerState;

    #[tokio::test]
    async fn drop_leaves_and_retires() {
        let state = ServerState::default();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let first = state.create_or_join(Mode::Pairs, None, tx1).unwrap();
        let second = state.create_or_join(Mode::Pairs, None, tx2).unwrap();
        let id = first.session_id();
        assert_eq!(second.session_id(), id);
        assert_eq!(*first.phase().borrow(), Phase::Setup);

        drop(second);
        let mut lines = vec![];
        while let Ok(m) = rx1.try_recv() {
            lines.push(m);
        }
        assert_eq!(
            lines[lines.len() - 2..],
            [
                ServerMessage::OpponentLeft,
                ServerMessage::GameOver(naval_lib::net::Verdict::Win)
            ]
        );
        assert!(state.get(id).is_some());

        drop(first);
        assert!(state.get(id).is_none());
    }

    #[tokio::test]
    async fn handle_routes_to_own_seat() {
        let state = ServerState::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = state
            .create_or_join(Mode::Teams, Some("Ann".to_owned()), tx)
            .unwrap();
        handle.set_team_name("Sharks".to_owned()).unwrap();
        assert!(handle.set_team_name("Jets".to_owned()).is_err());
        assert!(handle.finish_setup().is_err());
        assert_eq!(state.list_open()[0].display_name, "Ann");
    }
}
