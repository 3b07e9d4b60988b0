use std::fmt::{self, Display};
use std::str::FromStr;

use crate::board::{Coord, Fleet, Orientation};
use crate::lobby::SessionSummary;
use crate::{sanitize_name, Mode, SeatId, SessionId};

use super::ProtocolError;

/// Everything a client may send, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    CreateGame {
        mode: Mode,
        name: Option<String>,
    },
    JoinGame {
        session_id: SessionId,
        mode: Mode,
        name: Option<String>,
    },
    ListGames,
    PlaceShip {
        name: String,
        size: u8,
        at: Coord,
        orientation: Orientation,
    },
    /// Sent as either `FINISH_SETUP` or `READY_SETUP`.
    FinishSetup,
    TeamNameIs(String),
    Attack {
        target: SeatId,
        at: Coord,
    },
    Shot(Coord),
    Result {
        at: Coord,
        hit: bool,
    },
    ISunkMyShip {
        name: String,
        cells: Vec<Coord>,
    },
    GameWon,
    LeaveGame,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Verdict {
    Win,
    Lose,
}

/// Everything the server may send, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    PlayerId {
        seat: SeatId,
        session_id: SessionId,
    },
    GamesList(Vec<SessionSummary>),
    OpponentName(String),
    TeamsInfoFinal {
        mine: String,
        theirs: String,
        opponents: Vec<SeatId>,
    },
    RequestTeamName,
    SetupYourBoard,
    Placed {
        name: String,
        cells: Vec<Coord>,
    },
    TeamBoard(Fleet),
    StartGame(SeatId),
    Turn(SeatId),
    Shot(Coord),
    /// `target` is only named when more than one board can be targeted.
    Update {
        target: Option<SeatId>,
        at: Coord,
        hit: bool,
    },
    OpponentShipSunk {
        target: Option<SeatId>,
        name: String,
        cells: Vec<Coord>,
    },
    GameOver(Verdict),
    OpponentLeft,
    OpponentTeamLeft,
    Msg(String),
    Error(String),
}

struct Args<'a> {
    usage: &'static str,
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next_str(&mut self) -> Result<&'a str, ProtocolError> {
        self.tokens.next().ok_or(ProtocolError::Usage(self.usage))
    }

    fn next<T: FromStr>(&mut self, what: &'static str) -> Result<T, ProtocolError> {
        let value = self.next_str()?;
        value.parse().map_err(|_| ProtocolError::InvalidArgument {
            what,
            value: value.to_owned(),
        })
    }

    fn coord(&mut self) -> Result<Coord, ProtocolError> {
        Ok(Coord::new(self.next("row")?, self.next("column")?))
    }

    fn hit_flag(&mut self) -> Result<bool, ProtocolError> {
        match self.next_str()? {
            "H" | "h" => Ok(true),
            "M" | "m" => Ok(false),
            other => Err(ProtocolError::InvalidArgument {
                what: "result",
                value: other.to_owned(),
            }),
        }
    }

    fn rest(&mut self) -> String {
        self.tokens.by_ref().collect::<Vec<_>>().join(" ")
    }

    fn coords(&mut self) -> Result<Vec<Coord>, ProtocolError> {
        self.tokens
            .by_ref()
            .map(|c| {
                c.parse().map_err(|_| ProtocolError::InvalidArgument {
                    what: "coordinate",
                    value: c.to_owned(),
                })
            })
            .collect()
    }

    fn finish(mut self) -> Result<(), ProtocolError> {
        match self.tokens.next() {
            Some(_) => Err(ProtocolError::Usage(self.usage)),
            None => Ok(()),
        }
    }
}

impl FromStr for ClientMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next().unwrap_or_default();
        let usage = match command {
            "CREATE_GAME" => "CREATE_GAME <mode> [name]",
            "JOIN_GAME" => "JOIN_GAME <session_id> <mode> [name]",
            "LIST_GAMES" => "LIST_GAMES",
            "PLACE_SHIP" => "PLACE_SHIP <name> <size> <row> <col> <H|V>",
            "FINISH_SETUP" | "READY_SETUP" => "FINISH_SETUP",
            "TEAM_NAME_IS" => "TEAM_NAME_IS <name>",
            "ATTACK" => "ATTACK <target_seat> <row> <col>",
            "SHOT" => "SHOT <row> <col>",
            "RESULT" => "RESULT <row> <col> <H|M>",
            "I_SUNK_MY_SHIP" => "I_SUNK_MY_SHIP <name> <row,col>...",
            "GAME_WON" => "GAME_WON",
            "LEAVE_GAME" => "LEAVE_GAME",
            _ => return Err(ProtocolError::UnknownCommand(command.to_owned())),
        };
        let mut args = Args { usage, tokens };

        let message = match command {
            "CREATE_GAME" => {
                let mode = args.next("mode")?;
                let name = sanitize_name(&args.rest());
                return Ok(Self::CreateGame { mode, name });
            }
            "JOIN_GAME" => {
                let session_id = args.next("session id")?;
                let mode = args.next("mode")?;
                let name = sanitize_name(&args.rest());
                return Ok(Self::JoinGame {
                    session_id,
                    mode,
                    name,
                });
            }
            "LIST_GAMES" => Self::ListGames,
            "PLACE_SHIP" => Self::PlaceShip {
                name: args.next_str()?.to_owned(),
                size: args.next("size")?,
                at: args.coord()?,
                orientation: args.next("orientation")?,
            },
            "FINISH_SETUP" | "READY_SETUP" => Self::FinishSetup,
            "TEAM_NAME_IS" => {
                let raw = args.rest();
                let name = sanitize_name(&raw).ok_or(ProtocolError::Usage(usage))?;
                return Ok(Self::TeamNameIs(name));
            }
            "ATTACK" => Self::Attack {
                target: args.next("seat")?,
                at: args.coord()?,
            },
            "SHOT" => Self::Shot(args.coord()?),
            "RESULT" => Self::Result {
                at: args.coord()?,
                hit: args.hit_flag()?,
            },
            "I_SUNK_MY_SHIP" => {
                let name = args.next_str()?.to_owned();
                let cells = args.coords()?;
                if cells.is_empty() {
                    return Err(ProtocolError::Usage(usage));
                }
                return Ok(Self::ISunkMyShip { name, cells });
            }
            "GAME_WON" => Self::GameWon,
            _ => Self::LeaveGame,
        };
        args.finish()?;
        Ok(message)
    }
}

fn write_coords(f: &mut fmt::Formatter<'_>, cells: &[Coord]) -> fmt::Result {
    for cell in cells {
        write!(f, " {cell}")?;
    }
    Ok(())
}

fn hit_flag(hit: bool) -> &'static str {
    if hit {
        "H"
    } else {
        "M"
    }
}

impl Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::CreateGame { mode, name } => {
                write!(f, "CREATE_GAME {mode}")?;
                name.iter().try_for_each(|n| write!(f, " {n}"))
            }
            ClientMessage::JoinGame {
                session_id,
                mode,
                name,
            } => {
                write!(f, "JOIN_GAME {session_id} {mode}")?;
                name.iter().try_for_each(|n| write!(f, " {n}"))
            }
            ClientMessage::ListGames => f.write_str("LIST_GAMES"),
            ClientMessage::PlaceShip {
                name,
                size,
                at,
                orientation,
            } => write!(
                f,
                "PLACE_SHIP {name} {size} {} {} {orientation}",
                at.row, at.col
            ),
            ClientMessage::FinishSetup => f.write_str("FINISH_SETUP"),
            ClientMessage::TeamNameIs(name) => write!(f, "TEAM_NAME_IS {name}"),
            ClientMessage::Attack { target, at } => {
                write!(f, "ATTACK {target} {} {}", at.row, at.col)
            }
            ClientMessage::Shot(at) => write!(f, "SHOT {} {}", at.row, at.col),
            ClientMessage::Result { at, hit } => {
                write!(f, "RESULT {} {} {}", at.row, at.col, hit_flag(*hit))
            }
            ClientMessage::ISunkMyShip { name, cells } => {
                write!(f, "I_SUNK_MY_SHIP {name}")?;
                write_coords(f, cells)
            }
            ClientMessage::GameWon => f.write_str("GAME_WON"),
            ClientMessage::LeaveGame => f.write_str("LEAVE_GAME"),
        }
    }
}

impl Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::PlayerId { seat, session_id } => {
                write!(f, "PLAYER_ID {seat} {session_id}")
            }
            ServerMessage::GamesList(entries) => {
                f.write_str("GAMES_LIST")?;
                for (i, entry) in entries.iter().enumerate() {
                    f.write_str(if i == 0 { " " } else { ";" })?;
                    write!(f, "{entry}")?;
                }
                Ok(())
            }
            ServerMessage::OpponentName(name) => write!(f, "OPPONENT_NAME {name}"),
            ServerMessage::TeamsInfoFinal {
                mine,
                theirs,
                opponents,
            } => {
                write!(f, "TEAMS_INFO_FINAL {mine} {theirs}")?;
                opponents.iter().try_for_each(|s| write!(f, " {s}"))
            }
            ServerMessage::RequestTeamName => f.write_str("REQUEST_TEAM_NAME"),
            ServerMessage::SetupYourBoard => f.write_str("SETUP_YOUR_BOARD"),
            ServerMessage::Placed { name, cells } => {
                write!(f, "PLACED {name}")?;
                write_coords(f, cells)
            }
            ServerMessage::TeamBoard(fleet) => write!(f, "TEAM_BOARD {fleet}"),
            ServerMessage::StartGame(seat) => write!(f, "START_GAME {seat}"),
            ServerMessage::Turn(seat) => write!(f, "TURN {seat}"),
            ServerMessage::Shot(at) => write!(f, "SHOT {} {}", at.row, at.col),
            ServerMessage::Update { target, at, hit } => {
                f.write_str("UPDATE")?;
                target.iter().try_for_each(|t| write!(f, " {t}"))?;
                write!(f, " {} {} {}", at.row, at.col, hit_flag(*hit))
            }
            ServerMessage::OpponentShipSunk {
                target,
                name,
                cells,
            } => {
                f.write_str("OPPONENT_SHIP_SUNK")?;
                target.iter().try_for_each(|t| write!(f, " {t}"))?;
                write!(f, " {name}")?;
                write_coords(f, cells)
            }
            ServerMessage::GameOver(Verdict::Win) => f.write_str("GAME_OVER WIN"),
            ServerMessage::GameOver(Verdict::Lose) => f.write_str("GAME_OVER LOSE"),
            ServerMessage::OpponentLeft => f.write_str("OPPONENT_LEFT"),
            ServerMessage::OpponentTeamLeft => f.write_str("OPPONENT_TEAM_LEFT"),
            ServerMessage::Msg(text) => write!(f, "MSG {text}"),
            ServerMessage::Error(text) => write!(f, "ERROR {text}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(line: &str) -> Result<ClientMessage, ProtocolError> {
        line.parse()
    }

    #[test]
    fn parses_lobby_commands() {
        assert_eq!(
            parse("CREATE_GAME 4 Captain  Haddock"),
            Ok(ClientMessage::CreateGame {
                mode: Mode::Teams,
                name: Some("Captain_Haddock".to_owned())
            })
        );
        assert_eq!(
            parse("JOIN_GAME 17 2"),
            Ok(ClientMessage::JoinGame {
                session_id: 17.into(),
                mode: Mode::Pairs,
                name: None
            })
        );
        assert_eq!(parse("LIST_GAMES"), Ok(ClientMessage::ListGames));
        assert_eq!(
            "CREATE_GAME 3".parse::<ClientMessage>(),
            Err(ProtocolError::InvalidArgument {
                what: "mode",
                value: "3".to_owned()
            })
        );
    }

    #[test]
    fn parses_game_commands() {
        assert_eq!(
            parse("PLACE_SHIP Destroyer 2 0 0 H"),
            Ok(ClientMessage::PlaceShip {
                name: "Destroyer".to_owned(),
                size: 2,
                at: Coord::new(0, 0),
                orientation: Orientation::Horizontal,
            })
        );
        assert_eq!(parse("READY_SETUP"), Ok(ClientMessage::FinishSetup));
        assert_eq!(parse("FINISH_SETUP"), Ok(ClientMessage::FinishSetup));
        assert_eq!(
            parse("ATTACK P3 4 7"),
            Ok(ClientMessage::Attack {
                target: SeatId::P3,
                at: Coord::new(4, 7)
            })
        );
        assert_eq!(
            parse("RESULT 1 2 M"),
            Ok(ClientMessage::Result {
                at: Coord::new(1, 2),
                hit: false
            })
        );
        assert_eq!(
            parse("I_SUNK_MY_SHIP Destroyer 0,0 0,1"),
            Ok(ClientMessage::ISunkMyShip {
                name: "Destroyer".to_owned(),
                cells: vec![Coord::new(0, 0), Coord::new(0, 1)]
            })
        );
        assert_eq!(
            parse("TEAM_NAME_IS The Krakens"),
            Ok(ClientMessage::TeamNameIs("The_Krakens".to_owned()))
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(
            "FIRE 1 2".parse::<ClientMessage>(),
            Err(ProtocolError::UnknownCommand("FIRE".to_owned()))
        );
        assert_eq!(
            "SHOT 1".parse::<ClientMessage>(),
            Err(ProtocolError::Usage("SHOT <row> <col>"))
        );
        assert_eq!(
            "SHOT 1 2 3".parse::<ClientMessage>(),
            Err(ProtocolError::Usage("SHOT <row> <col>"))
        );
        assert!("PLACE_SHIP Destroyer 2 0 0 D"
            .parse::<ClientMessage>()
            .is_err());
        assert!("ATTACK P9 0 0".parse::<ClientMessage>().is_err());
        assert!("TEAM_NAME_IS ;;".parse::<ClientMessage>().is_err());
        assert!("I_SUNK_MY_SHIP Destroyer".parse::<ClientMessage>().is_err());
    }

    #[test]
    fn client_lines_reparse() {
        let messages = [
            ClientMessage::JoinGame {
                session_id: 5.into(),
                mode: Mode::Teams,
                name: Some("Ahab".to_owned()),
            },
            ClientMessage::ISunkMyShip {
                name: "Cruiser".to_owned(),
                cells: vec![Coord::new(3, 3), Coord::new(4, 3), Coord::new(5, 3)],
            },
            ClientMessage::Result {
                at: Coord::new(9, 0),
                hit: true,
            },
        ];
        for message in messages {
            assert_eq!(parse(&message.to_string()), Ok(message));
        }
    }

    #[test]
    fn server_lines() {
        let summaries = vec![
            SessionSummary {
                display_name: "Ann".to_owned(),
                session_id: 1.into(),
                current_seats: 1,
                max_seats: 2,
            },
            SessionSummary {
                display_name: "Bo".to_owned(),
                session_id: 2.into(),
                current_seats: 3,
                max_seats: 4,
            },
        ];
        assert_eq!(
            ServerMessage::GamesList(summaries).to_string(),
            "GAMES_LIST Ann|1|1|2;Bo|2|3|4"
        );
        assert_eq!(ServerMessage::GamesList(vec![]).to_string(), "GAMES_LIST");
        assert_eq!(
            ServerMessage::Update {
                target: None,
                at: Coord::new(0, 1),
                hit: true
            }
            .to_string(),
            "UPDATE 0 1 H"
        );
        assert_eq!(
            ServerMessage::OpponentShipSunk {
                target: Some(SeatId::P2),
                name: "Destroyer".to_owned(),
                cells: vec![Coord::new(0, 0), Coord::new(0, 1)],
            }
            .to_string(),
            "OPPONENT_SHIP_SUNK P2 Destroyer 0,0 0,1"
        );
        assert_eq!(
            ServerMessage::TeamsInfoFinal {
                mine: "Sharks".to_owned(),
                theirs: "Jets".to_owned(),
                opponents: vec![SeatId::P3, SeatId::P4],
            }
            .to_string(),
            "TEAMS_INFO_FINAL Sharks Jets P3 P4"
        );
        assert_eq!(
            ServerMessage::GameOver(Verdict::Win).to_string(),
            "GAME_OVER WIN"
        );
    }
}
