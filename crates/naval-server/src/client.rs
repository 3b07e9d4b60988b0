use std::time::Duration;

use abort_on_drop::ChildTask;
use naval_lib::lobby::Phase;
use naval_lib::net::connection::{self, ConnectionRx, ConnectionTx};
use naval_lib::net::{ClientMessage, FrameError, ServerMessage};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::instrument;

use crate::config::ServerConfig;
use crate::session::{SeatHandle, SeatSender, SessionError, SessionResult};
use crate::state::ServerState;

/// How long a departing client's queued messages get to reach the socket.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Take a socket for a newly connected client and begin serving it.
#[instrument(skip_all, fields(peer = ?socket.peer_addr().ok()))]
pub async fn handle_new_connection(state: ServerState, config: ServerConfig, socket: TcpStream) {
    let client = match ConnectingClient::new(state, config, socket).handshake().await {
        Some(c) => c,
        None => return,
    };
    client.run().await;
}

/// Represents a client who just connected and still needs to tell the server which game
/// they want to play.
struct ConnectingClient {
    state: ServerState,
    config: ServerConfig,
    conn_tx: ConnectionTx,
    conn_rx: ConnectionRx,
}

impl ConnectingClient {
    fn new(state: ServerState, config: ServerConfig, socket: TcpStream) -> Self {
        let (conn_tx, conn_rx) = connection::from_socket(socket);
        Self {
            state,
            config,
            conn_tx,
            conn_rx,
        }
    }

    async fn handshake(mut self) -> Option<PlayerClient> {
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        match self.try_handshake(&local_tx).await {
            Ok(Some(seat)) => Some(PlayerClient::from_connecting(self, seat, local_tx, local_rx)),
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Error during handshake, Closing connection\n{e:?}");
                None
            }
        }
    }

    /// Answer lobby requests until the client is seated. Returns `Ok(None)` if the client
    /// leaves or is turned away first.
    async fn try_handshake(
        &mut self,
        local_tx: &SeatSender,
    ) -> Result<Option<SeatHandle>, FrameError> {
        loop {
            let message = match self.conn_rx.read_frame().await {
                Ok(Some(m)) => m,
                Ok(None) => return Ok(None),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("{e}");
                    let error = ServerMessage::Error(e.to_string());
                    self.conn_tx.write_frame(&error).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            tracing::debug!("Received message: {message}");

            let joined = match message {
                ClientMessage::ListGames => {
                    let games = ServerMessage::GamesList(self.state.list_open());
                    self.conn_tx.write_frame(&games).await?;
                    continue;
                }
                ClientMessage::CreateGame { mode, name } => {
                    self.state.create_or_join(mode, name, local_tx.clone())
                }
                ClientMessage::JoinGame {
                    session_id,
                    mode,
                    name,
                } => self
                    .state
                    .join_by_id(session_id, mode, name, local_tx.clone()),
                _ => {
                    let error = ServerMessage::Error("Create or join a game first".to_owned());
                    self.conn_tx.write_frame(&error).await?;
                    continue;
                }
            };

            match joined {
                Ok(seat) => {
                    tracing::info!(
                        session_id = %seat.session_id(),
                        seat = %seat.seat(),
                        "Player seated"
                    );
                    return Ok(Some(seat));
                }
                Err(error) => {
                    tracing::warn!(%error, "Join rejected");
                    let error = ServerMessage::Error(error.to_string());
                    self.conn_tx.write_frame(&error).await?;
                    return Ok(None);
                }
            }
        }
    }
}

async fn send_task(
    mut conn_tx: ConnectionTx,
    mut local_rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(m) = local_rx.recv().await {
        if let Err(e) = conn_tx.write_frame(&m).await {
            tracing::error!("Error writing message, Closing connection\n{e:?}");
            return;
        }
    }
}

/// Used to represent a client who holds a seat in a session.
struct PlayerClient {
    state: ServerState,
    seat: SeatHandle,
    conn_rx: ConnectionRx,
    local_tx: SeatSender,
    phase_rx: watch::Receiver<Phase>,
    wait_deadline: Instant,
    writer: ChildTask<()>,
}

impl PlayerClient {
    fn from_connecting(
        client: ConnectingClient,
        seat: SeatHandle,
        local_tx: SeatSender,
        local_rx: mpsc::UnboundedReceiver<ServerMessage>,
    ) -> Self {
        let writer = tokio::spawn(send_task(client.conn_tx, local_rx)).into();
        PlayerClient {
            state: client.state,
            phase_rx: seat.phase(),
            seat,
            conn_rx: client.conn_rx,
            local_tx,
            wait_deadline: Instant::now() + client.config.wait_timeout,
            writer,
        }
    }

    /// Takes ownership of self so the seat is released when the message loop ends.
    #[instrument(skip_all, fields(session_id = %self.seat.session_id(), seat = %self.seat.seat()))]
    async fn run(mut self) {
        loop {
            let frame = if *self.phase_rx.borrow() == Phase::Waiting {
                select! {
                    frame = self.conn_rx.read_frame() => frame,
                    changed = self.phase_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    () = sleep_until(self.wait_deadline) => {
                        tracing::warn!("Timed out waiting for players");
                        let error = ServerMessage::Error(SessionError::Timeout.to_string());
                        if self.reply(error).is_err() {
                            tracing::debug!("Connection closed before the timeout notice");
                        }
                        break;
                    }
                }
            } else {
                self.conn_rx.read_frame().await
            };

            let message = match frame {
                Ok(Some(m)) => m,
                Ok(None) => break,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("{e}");
                    match self.reply(ServerMessage::Error(e.to_string())) {
                        Ok(()) => continue,
                        Err(_) => break,
                    }
                }
                Err(e) => {
                    tracing::error!("Error reading message, Closing connection\n{e:?}");
                    break;
                }
            };

            tracing::debug!("Received message: {message}");
            if message == ClientMessage::LeaveGame {
                break;
            }
            let result = self
                .process(message)
                .or_else(|e| {
                    tracing::warn!("Rejected message: {e}");
                    self.reply(ServerMessage::Error(e.to_string()))
                });
            if let Err(SessionError::PeerDisconnected) = result {
                break;
            }
        }
        tracing::info!("Player disconnected");
        self.close().await;
    }

    fn process(&self, message: ClientMessage) -> SessionResult<()> {
        match message {
            ClientMessage::ListGames => {
                self.reply(ServerMessage::GamesList(self.state.list_open()))
            }
            ClientMessage::CreateGame { .. } | ClientMessage::JoinGame { .. } => Err(
                SessionError::IllegalAction("Already seated in a session"),
            ),
            ClientMessage::PlaceShip {
                name,
                size,
                at,
                orientation,
            } => self.seat.place_ship(&name, size, at, orientation),
            ClientMessage::FinishSetup => self.seat.finish_setup(),
            ClientMessage::TeamNameIs(name) => self.seat.set_team_name(name),
            ClientMessage::Attack { target, at } => self.seat.attack(target, at).map(drop),
            ClientMessage::Shot(at) => self.seat.shot(at).map(drop),
            ClientMessage::Result { at, hit } => self.seat.report_result(at, hit),
            ClientMessage::ISunkMyShip { name, cells } => self.seat.report_sunk(&name, &cells),
            ClientMessage::GameWon => self.seat.claim_win(),
            ClientMessage::LeaveGame => Ok(()),
        }
    }

    /// Queue a message for this client only.
    fn reply(&self, message: ServerMessage) -> SessionResult<()> {
        self.local_tx
            .send(message)
            .map_err(|_| SessionError::PeerDisconnected)
    }

    async fn close(self) {
        let PlayerClient {
            seat,
            local_tx,
            writer,
            ..
        } = self;
        // Leaving drops the session's sender, so the writer stops once the queue is drained
        drop(seat);
        drop(local_tx);
        if timeout(FLUSH_TIMEOUT, writer).await.is_err() {
            tracing::debug!("Dropped unsent messages for a stalled connection");
        }
    }
}
