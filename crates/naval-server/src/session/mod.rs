use std::sync::{Mutex, MutexGuard, PoisonError};

use naval_lib::board::PlacementError;
use naval_lib::lobby::Phase;
use naval_lib::net::ServerMessage;
use naval_lib::{Mode, SeatId, SessionId};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

pub use self::seat_handle::SeatHandle;
pub use self::session_state::SessionState;

pub mod seat_handle;
mod session_state;
mod turn;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    IllegalAction(&'static str),
    #[error("Invalid placement: {0}")]
    PlacementInvalid(#[from] PlacementError),
    #[error("Session is full")]
    SessionFull,
    #[error("Session not found")]
    SessionNotFound,
    #[error("Timed out waiting for players")]
    Timeout,
    #[error("Peer disconnected")]
    PeerDisconnected,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Sending half of a seat's outbound queue, drained by that connection's writer task.
pub type SeatSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug)]
struct Envelope {
    seat: SeatId,
    tx: SeatSender,
    message: ServerMessage,
}

/// Messages produced by one session mutation, released once the mutation is complete.
#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<Envelope>,
}

impl Outbox {
    pub fn push(&mut self, seat: SeatId, tx: &SeatSender, message: ServerMessage) {
        self.envelopes.push(Envelope {
            seat,
            tx: tx.clone(),
            message,
        });
    }

    /// Hand every message to its seat's queue. Queues never block, so this is safe to call
    /// with the session lock held, which keeps per-seat order identical to mutation order.
    fn flush(self) {
        for Envelope { seat, tx, message } in self.envelopes {
            if tx.send(message).is_err() {
                tracing::debug!(%seat, "Dropped message for a closed connection");
            }
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    #[cfg(test)]
    pub fn messages_for(&self, seat: SeatId) -> Vec<String> {
        self.envelopes
            .iter()
            .filter(|e| e.seat == seat)
            .map(|e| e.message.to_string())
            .collect()
    }
}

/// One match. All state lives behind a single lock that is never held across an `.await`.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    mode: Mode,
    state: Mutex<SessionState>,
    phase_rx: watch::Receiver<Phase>,
}

impl Session {
    pub fn new(id: SessionId, mode: Mode) -> Self {
        let (phase_tx, phase_rx) = watch::channel(Phase::Waiting);
        Self {
            id,
            mode,
            state: Mutex::new(SessionState::new(id, mode, phase_tx)),
            phase_rx,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// A receiver that observes every phase change of this session.
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase_rx.clone()
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Poisoning is ignored; each mutation validates before it writes
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the session lock and deliver whatever it queued.
    pub fn apply<T>(&self, f: impl FnOnce(&mut SessionState, &mut Outbox) -> T) -> T {
        let mut state = self.lock();
        let mut outbox = Outbox::default();
        let result = f(&mut state, &mut outbox);
        outbox.flush();
        result
    }
}

#[cfg(test)]
mod test {
    use naval_lib::lobby::Phase;
    use naval_lib::net::ServerMessage;
    use naval_lib::{Mode, SeatId};
    use tokio::sync::mpsc;

    use super::Session;

    #[tokio::test]
    async fn apply_delivers_in_order() {
        let session = Session::new(7.into(), Mode::Pairs);
        let mut phase_rx = session.subscribe_phase();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        session
            .apply(|state, out| state.admit(None, tx1, out))
            .unwrap();
        assert_eq!(
            rx1.recv().await,
            Some(ServerMessage::PlayerId {
                seat: SeatId::P1,
                session_id: 7.into()
            })
        );

        session
            .apply(|state, out| state.admit(Some("Bo".to_owned()), tx2, out))
            .unwrap();
        phase_rx.changed().await.unwrap();
        assert_eq!(*phase_rx.borrow(), Phase::Setup);

        let mut lines = Vec::new();
        while let Ok(m) = rx1.try_recv() {
            lines.push(m.to_string());
        }
        assert_eq!(
            lines,
            [
                "MSG Waiting for players (1/2)",
                "MSG Waiting for players (2/2)",
                "OPPONENT_NAME Bo",
                "SETUP_YOUR_BOARD"
            ]
        );
        assert_eq!(
            rx2.recv().await.map(|m| m.to_string()).as_deref(),
            Some("PLAYER_ID P2 7")
        );
    }
}
