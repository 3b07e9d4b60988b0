use std::collections::{BTreeMap, HashMap};

use naval_lib::board::{Board, Cell, Coord, Orientation, Outcome};
use naval_lib::lobby::{Phase, SessionSummary};
use naval_lib::net::{ServerMessage, Verdict};
use naval_lib::{Mode, SeatId, SessionId, TeamId};
use tokio::sync::watch;
use tracing::instrument;

use super::turn::TurnCoordinator;
use super::{Outbox, SeatSender, SessionError, SessionResult};

#[derive(Debug)]
struct Seat {
    name: String,
    tx: SeatSender,
    board: Board,
    ready: bool,
}

#[derive(Debug)]
struct Team {
    name: Option<String>,
    captain: SeatId,
}

/// Latest shot fired at a seat, used to check what that seat reports back.
#[derive(Debug, Copy, Clone)]
struct LastShot {
    attacker: SeatId,
    at: Coord,
    hit: bool,
}

/// Everything guarded by a session's lock.
///
/// Every operation runs to completion without awaiting and queues its outgoing messages in
/// an [`Outbox`] instead of writing to connections.
#[derive(Debug)]
pub struct SessionState {
    id: SessionId,
    mode: Mode,
    phase: Phase,
    phase_tx: watch::Sender<Phase>,
    seats: BTreeMap<SeatId, Seat>,
    teams: [Team; 2],
    turn: TurnCoordinator,
    last_shot: HashMap<SeatId, LastShot>,
}

impl SessionState {
    pub fn new(id: SessionId, mode: Mode, phase_tx: watch::Sender<Phase>) -> Self {
        let new_team = |team| Team {
            name: None,
            captain: mode.default_captain(team),
        };
        Self {
            id,
            mode,
            phase: Phase::Waiting,
            phase_tx,
            seats: BTreeMap::new(),
            teams: [new_team(TeamId::A), new_team(TeamId::B)],
            turn: TurnCoordinator::new(mode),
            last_shot: HashMap::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// Whether a new seat can still be admitted.
    pub fn is_open(&self) -> bool {
        self.phase == Phase::Waiting && self.seats.len() < self.mode.capacity()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            display_name: self
                .seats
                .values()
                .next()
                .map(|s| s.name.clone())
                .unwrap_or_else(|| self.id.to_string()),
            session_id: self.id,
            current_seats: self.seats.len(),
            max_seats: self.mode.capacity(),
        }
    }

    fn team(&self, team: TeamId) -> &Team {
        &self.teams[team as usize]
    }

    fn team_mut(&mut self, team: TeamId) -> &mut Team {
        &mut self.teams[team as usize]
    }

    fn team_name(&self, team: TeamId) -> String {
        self.team(team)
            .name
            .clone()
            .unwrap_or_else(|| format!("Team_{team}"))
    }

    fn is_captain(&self, seat: SeatId) -> bool {
        self.team(self.mode.team_of(seat)).captain == seat
    }

    fn seat(&self, seat: SeatId) -> SessionResult<&Seat> {
        self.seats
            .get(&seat)
            .ok_or(SessionError::IllegalAction("Not seated in this session"))
    }

    fn seat_mut(&mut self, seat: SeatId) -> SessionResult<&mut Seat> {
        self.seats
            .get_mut(&seat)
            .ok_or(SessionError::IllegalAction("Not seated in this session"))
    }

    /// Seated and, once the game is underway, with ships afloat.
    fn is_playable(&self, seat: SeatId) -> bool {
        self.seats
            .get(&seat)
            .is_some_and(|s| self.phase != Phase::Active || s.board.afloat() > 0)
    }

    fn side_playable(&self, team: TeamId) -> bool {
        self.mode
            .members(team)
            .iter()
            .any(|&seat| self.is_playable(seat))
    }

    fn playable_seats(&self) -> Vec<SeatId> {
        self.mode
            .seats()
            .iter()
            .copied()
            .filter(|&seat| self.is_playable(seat))
            .collect()
    }

    fn send(&self, out: &mut Outbox, seat: SeatId, message: ServerMessage) {
        if let Some(s) = self.seats.get(&seat) {
            out.push(seat, &s.tx, message);
        }
    }

    fn broadcast(&self, out: &mut Outbox, message: ServerMessage) {
        for (&seat, s) in &self.seats {
            out.push(seat, &s.tx, message.clone());
        }
    }

    fn broadcast_waiting(&self, out: &mut Outbox) {
        let text = format!(
            "Waiting for players ({}/{})",
            self.seats.len(),
            self.mode.capacity()
        );
        self.broadcast(out, ServerMessage::Msg(text));
    }

    /// Step the phase forward until it reaches `target`, publishing each step.
    fn advance_phase_to(&mut self, target: Phase) {
        while self.phase < target {
            let Some(next) = self.phase.next() else {
                break;
            };
            self.phase = next;
            tracing::info!(session_id = %self.id, phase = %next, "Phase changed");
            self.phase_tx.send_replace(next);
        }
    }
}

// ----------------------------------------------------------------------------
// Lobby
// ----------------------------------------------------------------------------
impl SessionState {
    /// Seat a new connection in the lowest free seat.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionFull`] when every seat is taken or the session has
    /// already left the WAITING phase.
    #[instrument(skip(self, tx, out), fields(session_id = %self.id))]
    pub fn admit(
        &mut self,
        name: Option<String>,
        tx: SeatSender,
        out: &mut Outbox,
    ) -> SessionResult<SeatId> {
        if self.phase != Phase::Waiting {
            return Err(SessionError::SessionFull);
        }
        let seat = self
            .mode
            .seats()
            .iter()
            .copied()
            .find(|s| !self.seats.contains_key(s))
            .ok_or(SessionError::SessionFull)?;

        out.push(
            seat,
            &tx,
            ServerMessage::PlayerId {
                seat,
                session_id: self.id,
            },
        );
        if self.mode.named_teams() && self.is_captain(seat) {
            out.push(seat, &tx, ServerMessage::RequestTeamName);
        }
        self.seats.insert(
            seat,
            Seat {
                name: name.unwrap_or_else(|| seat.to_string()),
                tx,
                board: Board::default(),
                ready: false,
            },
        );
        tracing::info!(%seat, "Seat joined");

        self.broadcast_waiting(out);
        self.try_begin_setup(out);
        Ok(seat)
    }

    #[instrument(skip(self, out))]
    pub fn set_team_name(
        &mut self,
        seat: SeatId,
        name: String,
        out: &mut Outbox,
    ) -> SessionResult<()> {
        self.seat(seat)?;
        if self.phase != Phase::Waiting {
            return Err(SessionError::IllegalAction(
                "Team names can only be set while waiting for players",
            ));
        }
        if !self.mode.named_teams() || !self.is_captain(seat) {
            return Err(SessionError::IllegalAction(
                "Only a team captain can name the team",
            ));
        }
        let team = self.mode.team_of(seat);
        if self.team(team).name.is_some() {
            return Err(SessionError::IllegalAction("Team name already set"));
        }
        if self.team(team.opponent()).name.as_ref() == Some(&name) {
            return Err(SessionError::IllegalAction("Team name already taken"));
        }

        tracing::info!(%team, %name, "Team named");
        self.broadcast(out, ServerMessage::Msg(format!("Team {team} is now {name}")));
        self.team_mut(team).name = Some(name);
        self.try_begin_setup(out);
        Ok(())
    }

    fn try_begin_setup(&mut self, out: &mut Outbox) {
        if self.phase != Phase::Waiting || self.seats.len() < self.mode.capacity() {
            return;
        }
        if self.mode.named_teams() && self.teams.iter().any(|t| t.name.is_none()) {
            return;
        }
        self.advance_phase_to(Phase::Setup);

        for (&seat, s) in &self.seats {
            let team = self.mode.team_of(seat);
            let captain = self.team(team).captain;
            if self.mode.named_teams() {
                let info = ServerMessage::TeamsInfoFinal {
                    mine: self.team_name(team),
                    theirs: self.team_name(team.opponent()),
                    opponents: self.mode.members(team.opponent()).to_vec(),
                };
                out.push(seat, &s.tx, info);
            } else {
                let opponent = self.mode.default_captain(team.opponent());
                let name = self
                    .seats
                    .get(&opponent)
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| opponent.to_string());
                out.push(seat, &s.tx, ServerMessage::OpponentName(name));
            }

            if seat == captain {
                out.push(seat, &s.tx, ServerMessage::SetupYourBoard);
            } else {
                let captain_name = self.seats.get(&captain).map_or("", |c| c.name.as_str());
                let text = format!("Your captain {captain_name} is placing the fleet");
                out.push(seat, &s.tx, ServerMessage::Msg(text));
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Setup
// ----------------------------------------------------------------------------
impl SessionState {
    #[instrument(skip(self, out))]
    pub fn place_ship(
        &mut self,
        seat: SeatId,
        name: &str,
        size: u8,
        at: Coord,
        orientation: Orientation,
        out: &mut Outbox,
    ) -> SessionResult<()> {
        self.seat(seat)?;
        if self.phase != Phase::Setup {
            return Err(SessionError::IllegalAction(
                "Ships can only be placed during setup",
            ));
        }
        if !self.is_captain(seat) {
            return Err(SessionError::IllegalAction("Only your captain places ships"));
        }

        let s = self.seat_mut(seat)?;
        if s.ready {
            return Err(SessionError::IllegalAction("Setup already finished"));
        }
        let cells = s.board.place_fleet_ship(name, size, at, orientation)?;
        out.push(
            seat,
            &s.tx,
            ServerMessage::Placed {
                name: name.to_owned(),
                cells,
            },
        );
        Ok(())
    }

    /// Mark a captain's fleet as final. Repeating this once accepted changes nothing.
    #[instrument(skip(self, out))]
    pub fn finish_setup(&mut self, seat: SeatId, out: &mut Outbox) -> SessionResult<()> {
        let phase = self.phase;
        let is_captain = self.is_captain(seat);

        let s = self.seat_mut(seat)?;
        if s.ready {
            return Ok(());
        }
        if phase != Phase::Setup {
            return Err(SessionError::IllegalAction("Setup is not in progress"));
        }
        if !is_captain {
            return Err(SessionError::IllegalAction("Only your captain finishes setup"));
        }
        if !s.board.fleet_complete() {
            return Err(SessionError::IllegalAction("Place your whole fleet first"));
        }
        s.ready = true;
        tracing::info!("Fleet submitted");

        if !self.try_begin_battle(out) {
            let text = "Fleet ready, waiting for the other side".to_owned();
            self.send(out, seat, ServerMessage::Msg(text));
        }
        Ok(())
    }

    /// Once every captain is ready, copy each captain's fleet to its teammates and start.
    fn try_begin_battle(&mut self, out: &mut Outbox) -> bool {
        if self.phase != Phase::Setup {
            return false;
        }
        let captains = [TeamId::A, TeamId::B].map(|team| self.team(team).captain);
        if !captains
            .iter()
            .all(|c| self.seats.get(c).is_some_and(|s| s.ready))
        {
            return false;
        }

        let mode = self.mode;
        for captain in captains {
            let Some(board) = self.seats.get(&captain).map(|s| s.board.clone()) else {
                continue;
            };
            for &mate in mode.members(mode.team_of(captain)) {
                if mate == captain {
                    continue;
                }
                if let Some(s) = self.seats.get_mut(&mate) {
                    s.board = board.clone();
                    s.ready = true;
                    out.push(mate, &s.tx, ServerMessage::TeamBoard(board.fleet()));
                }
            }
        }

        self.advance_phase_to(Phase::Active);
        self.turn = TurnCoordinator::new(mode);
        if !self.is_playable(self.turn.current()) {
            let playable = self.playable_seats();
            self.turn.advance(|s| playable.contains(&s));
        }
        tracing::info!(first = %self.turn.current(), "Game started");
        self.broadcast(out, ServerMessage::StartGame(self.turn.current()));
        true
    }
}

// ----------------------------------------------------------------------------
// Battle
// ----------------------------------------------------------------------------
impl SessionState {
    /// Fire at `target`'s board. With teams, the shot lands on every member of the target's
    /// team since they share one fleet.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::IllegalAction`], leaving the state untouched, when the game is
    /// not running, it is not `attacker`'s turn, `target` is on the attacker's own side,
    /// not seated or already defeated, or `at` is off the grid.
    #[instrument(skip(self, out))]
    pub fn attack(
        &mut self,
        attacker: SeatId,
        target: SeatId,
        at: Coord,
        out: &mut Outbox,
    ) -> SessionResult<Outcome> {
        self.seat(attacker)?;
        if self.phase != Phase::Active {
            return Err(SessionError::IllegalAction("The game is not in progress"));
        }
        if !self.turn.holds_turn(attacker) {
            return Err(SessionError::IllegalAction("It is not your turn"));
        }
        let side = self.mode.team_of(target);
        if side == self.mode.team_of(attacker) {
            return Err(SessionError::IllegalAction("Cannot attack your own side"));
        }
        let target_seat = self
            .seats
            .get(&target)
            .ok_or(SessionError::IllegalAction("Target is not in the game"))?;
        if target_seat.board.afloat() == 0 {
            return Err(SessionError::IllegalAction("Target has no ships left"));
        }
        if !at.in_bounds() {
            return Err(SessionError::IllegalAction("Coordinate is off the grid"));
        }

        let mut outcome = Outcome::Miss;
        for &seat in self.mode.members(side) {
            let Some(s) = self.seats.get_mut(&seat) else {
                continue;
            };
            let result = s.board.receive_attack(at);
            if seat == target {
                outcome = result;
            }
        }
        let hit = outcome.is_hit();
        for &seat in self.mode.members(side) {
            self.last_shot.insert(seat, LastShot { attacker, at, hit });
        }
        tracing::info!(%target, %at, ?outcome, "Attack resolved");

        if self.mode.named_teams() {
            let target = Some(target);
            self.broadcast(out, ServerMessage::Update { target, at, hit });
            if let Outcome::Sunk { name, cells } = &outcome {
                let sunk = ServerMessage::OpponentShipSunk {
                    target,
                    name: name.clone(),
                    cells: cells.clone(),
                };
                self.broadcast(out, sunk);
            }
        } else {
            let update = ServerMessage::Update {
                target: None,
                at,
                hit,
            };
            self.send(out, attacker, update);
            if let Outcome::Sunk { name, cells } = &outcome {
                let sunk = ServerMessage::OpponentShipSunk {
                    target: None,
                    name: name.clone(),
                    cells: cells.clone(),
                };
                self.send(out, attacker, sunk);
            }
            self.send(out, target, ServerMessage::Shot(at));
        }

        if self.side_playable(side) {
            let playable = self.playable_seats();
            let next = self.turn.after_attack(hit, |s| playable.contains(&s));
            self.broadcast(out, ServerMessage::Turn(next));
        } else {
            self.finish(self.mode.team_of(attacker), out);
        }
        Ok(outcome)
    }

    /// Attack the only opposing seat.
    pub fn shot(
        &mut self,
        attacker: SeatId,
        at: Coord,
        out: &mut Outbox,
    ) -> SessionResult<Outcome> {
        match self.mode.members(self.mode.team_of(attacker).opponent()) {
            [target] => self.attack(attacker, *target, at, out),
            _ => Err(SessionError::IllegalAction("Name a target with ATTACK")),
        }
    }

    /// Check a seat's own account of the latest shot against what the server resolved.
    pub fn report_result(&self, seat: SeatId, at: Coord, hit: bool) -> SessionResult<()> {
        self.seat(seat)?;
        if self.phase < Phase::Active {
            return Err(SessionError::IllegalAction("The game has not started"));
        }
        let last = self
            .last_shot
            .get(&seat)
            .filter(|last| last.at == at)
            .ok_or(SessionError::IllegalAction("No shot was fired at that cell"))?;
        if last.hit != hit {
            return Err(SessionError::IllegalAction(
                "Reported result does not match the board",
            ));
        }
        tracing::debug!(%seat, attacker = %last.attacker, %at, hit, "Result confirmed");
        Ok(())
    }

    /// Check a seat's claim that one of its ships went down.
    pub fn report_sunk(&self, seat: SeatId, name: &str, cells: &[Coord]) -> SessionResult<()> {
        let s = self.seat(seat)?;
        if self.phase < Phase::Active {
            return Err(SessionError::IllegalAction("The game has not started"));
        }
        let ship = s
            .board
            .ship(name)
            .ok_or(SessionError::IllegalAction("No such ship in your fleet"))?;

        let mut actual = ship.cells.clone();
        actual.sort();
        let mut reported = cells.to_vec();
        reported.sort();
        let sunk = actual.iter().all(|&c| s.board.cell(c) == Some(Cell::Sunk));
        let last_hit = self
            .last_shot
            .get(&seat)
            .is_some_and(|last| actual.contains(&last.at));
        if reported != actual || !sunk || !last_hit {
            return Err(SessionError::IllegalAction(
                "Reported sinking does not match the board",
            ));
        }
        tracing::debug!(%seat, ship = name, "Sinking confirmed");
        Ok(())
    }

    /// Accept a win claim when nobody on the other side can play on.
    pub fn claim_win(&mut self, seat: SeatId, out: &mut Outbox) -> SessionResult<()> {
        self.seat(seat)?;
        match self.phase {
            Phase::Finished => return Ok(()),
            Phase::Active => {}
            _ => return Err(SessionError::IllegalAction("The game is not in progress")),
        }
        let side = self.mode.team_of(seat);
        if self.side_playable(side.opponent()) {
            return Err(SessionError::IllegalAction(
                "Opponents still have ships afloat",
            ));
        }
        self.finish(side, out);
        Ok(())
    }

    fn finish(&mut self, winner: TeamId, out: &mut Outbox) {
        self.advance_phase_to(Phase::Finished);
        tracing::info!(%winner, "Game over");
        for (&seat, s) in &self.seats {
            let verdict = if self.mode.team_of(seat) == winner {
                Verdict::Win
            } else {
                Verdict::Lose
            };
            out.push(seat, &s.tx, ServerMessage::GameOver(verdict));
        }
    }
}

// ----------------------------------------------------------------------------
// Departures
// ----------------------------------------------------------------------------
impl SessionState {
    /// Remove a seat and keep the game consistent for whoever remains.
    #[instrument(skip(self, out), fields(session_id = %self.id))]
    pub fn leave(&mut self, seat: SeatId, out: &mut Outbox) {
        let Some(departed) = self.seats.remove(&seat) else {
            tracing::warn!("Attempted to remove a seat that isn't taken");
            return;
        };
        self.last_shot.remove(&seat);
        tracing::info!(phase = %self.phase, "Seat left");

        let team = self.mode.team_of(seat);
        match self.phase {
            Phase::Waiting => {
                if self.is_captain(seat) && self.team_mut(team).name.take().is_some() {
                    tracing::info!(%team, "Team name cleared");
                }
                self.broadcast_waiting(out);
            }
            Phase::Setup | Phase::Active if !self.side_playable(team) => {
                let notice = if self.mode.named_teams() {
                    ServerMessage::OpponentTeamLeft
                } else {
                    ServerMessage::OpponentLeft
                };
                for &opponent in self.mode.members(team.opponent()) {
                    self.send(out, opponent, notice.clone());
                }
                self.finish(team.opponent(), out);
            }
            Phase::Setup | Phase::Active => self.hand_over(seat, departed, out),
            Phase::Finished => {}
        }
    }

    /// A team member left but the team plays on.
    fn hand_over(&mut self, seat: SeatId, departed: Seat, out: &mut Outbox) {
        let team = self.mode.team_of(seat);
        let text = format!("{} ({seat}) left the game", departed.name);
        self.broadcast(out, ServerMessage::Msg(text));

        let mate = self
            .mode
            .members(team)
            .iter()
            .copied()
            .find(|s| self.seats.contains_key(s))
            .filter(|_| self.team(team).captain == seat);
        if let Some(mate) = mate {
            self.team_mut(team).captain = mate;
            tracing::info!(%mate, "Captaincy handed over");

            if self.phase == Phase::Setup {
                if let Some(s) = self.seats.get_mut(&mate) {
                    let text = "You are now the captain".to_owned();
                    out.push(mate, &s.tx, ServerMessage::Msg(text));
                    if departed.ready {
                        s.board = departed.board;
                        s.ready = true;
                        out.push(mate, &s.tx, ServerMessage::TeamBoard(s.board.fleet()));
                    } else if !s.ready {
                        out.push(mate, &s.tx, ServerMessage::SetupYourBoard);
                    }
                }
                self.try_begin_battle(out);
            }
        }

        if self.phase == Phase::Active && self.turn.holds_turn(seat) {
            let playable = self.playable_seats();
            if let Some(next) = self.turn.advance(|s| playable.contains(&s)) {
                self.broadcast(out, ServerMessage::Turn(next));
            }
        }
    }
}
