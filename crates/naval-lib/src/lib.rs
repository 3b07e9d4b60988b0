use std::{
    borrow::Borrow,
    fmt::{Debug, Display},
    str::FromStr,
};

pub mod board;
pub mod lobby;
pub mod net;

pub const GRID_SIZE: u8 = 10;
pub const MAX_NAME_LEN: usize = 24;

/// Ships every fleet is made of, as `(name, size)`.
pub const FLEET: [(&str, u8); 5] = [
    ("Carrier", 5),
    ("Battleship", 4),
    ("Cruiser", 3),
    ("Submarine", 3),
    ("Destroyer", 2),
];

pub const FLEET_CELLS: usize = {
    let mut total = 0;
    let mut i = 0;
    while i < FLEET.len() {
        total += FLEET[i].1 as usize;
        i += 1;
    }
    total
};

/// Size of the ship called `name` in [`FLEET`].
pub fn fleet_ship_size(name: &str) -> Option<u8> {
    FLEET.iter().find(|(n, _)| *n == name).map(|&(_, s)| s)
}

// Setup Newtype pattern for IDs
macro_rules! decl_id {
    ($name:ident) => {
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                <Self as Display>::fmt(self, f)
            }
        }
        impl Display for $name {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                // Decimal, since this is what goes over the wire
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(v: u32) -> Self {
                Self(v)
            }
        }
        impl From<$name> for u32 {
            #[inline]
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl Borrow<u32> for $name {
            #[inline]
            fn borrow(&self) -> &u32 {
                &self.0
            }
        }
        impl PartialEq<u32> for $name {
            #[inline]
            fn eq(&self, other: &u32) -> bool {
                self.0 == *other
            }
        }
    };
}

decl_id!(SessionId);

/// A participant's slot within a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeatId {
    P1,
    P2,
    P3,
    P4,
}

impl SeatId {
    pub const ALL: [SeatId; 4] = [SeatId::P1, SeatId::P2, SeatId::P3, SeatId::P4];

    pub fn as_str(self) -> &'static str {
        match self {
            SeatId::P1 => "P1",
            SeatId::P2 => "P2",
            SeatId::P3 => "P3",
            SeatId::P4 => "P4",
        }
    }
}

impl Display for SeatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SeatId::ALL
            .into_iter()
            .find(|seat| seat.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TeamId {
    A,
    B,
}

impl TeamId {
    pub fn opponent(self) -> TeamId {
        match self {
            TeamId::A => TeamId::B,
            TeamId::B => TeamId::A,
        }
    }
}

impl Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamId::A => f.write_str("A"),
            TeamId::B => f.write_str("B"),
        }
    }
}

/// How many seats a session has and how they are grouped.
///
/// Both modes are modelled as two teams. With [`Mode::Pairs`] each team is a single seat that
/// is also its own captain, so all team logic degenerates to the one-on-one case.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Pairs,
    Teams,
}

impl Mode {
    pub fn capacity(self) -> usize {
        match self {
            Mode::Pairs => 2,
            Mode::Teams => 4,
        }
    }

    pub fn seats(self) -> &'static [SeatId] {
        &SeatId::ALL[..self.capacity()]
    }

    pub fn members(self, team: TeamId) -> &'static [SeatId] {
        match (self, team) {
            (Mode::Pairs, TeamId::A) => &[SeatId::P1],
            (Mode::Pairs, TeamId::B) => &[SeatId::P2],
            (Mode::Teams, TeamId::A) => &[SeatId::P1, SeatId::P2],
            (Mode::Teams, TeamId::B) => &[SeatId::P3, SeatId::P4],
        }
    }

    pub fn team_of(self, seat: SeatId) -> TeamId {
        if self.members(TeamId::A).contains(&seat) {
            TeamId::A
        } else {
            TeamId::B
        }
    }

    /// Seat that places the fleet and names the team when the session starts.
    pub fn default_captain(self, team: TeamId) -> SeatId {
        self.members(team)[0]
    }

    /// Teams only need a name when they have more than one member.
    pub fn named_teams(self) -> bool {
        self == Mode::Teams
    }

    /// Fixed attack rotation, alternating between the teams.
    pub fn turn_order(self) -> &'static [SeatId] {
        match self {
            Mode::Pairs => &[SeatId::P1, SeatId::P2],
            Mode::Teams => &[SeatId::P1, SeatId::P3, SeatId::P2, SeatId::P4],
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.capacity())
    }
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2" => Ok(Mode::Pairs),
            "4" => Ok(Mode::Teams),
            _ => Err(()),
        }
    }
}

/// Normalize a user supplied display or team name so it survives the line protocol.
///
/// Whitespace runs become `_`, protocol separators are dropped and the result is capped at
/// [`MAX_NAME_LEN`] characters. Returns `None` when nothing usable is left.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let name = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| !matches!(c, '|' | ';' | ':' | ','))
        .take(MAX_NAME_LEN)
        .collect::<String>();
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fleet_total() {
        assert_eq!(FLEET_CELLS, 17);
        assert_eq!(fleet_ship_size("Cruiser"), Some(3));
        assert_eq!(fleet_ship_size("Rowboat"), None);
    }

    #[test]
    fn teams_partition_seats() {
        for mode in [Mode::Pairs, Mode::Teams] {
            let mut seats = mode.members(TeamId::A).to_vec();
            seats.extend_from_slice(mode.members(TeamId::B));
            seats.sort();
            assert_eq!(seats, mode.seats());
            for &seat in mode.seats() {
                assert!(mode.members(mode.team_of(seat)).contains(&seat));
            }
        }
        assert_eq!(Mode::Teams.team_of(SeatId::P2), TeamId::A);
        assert_eq!(Mode::Teams.default_captain(TeamId::B), SeatId::P3);
    }

    #[test]
    fn seat_ids_parse() {
        assert_eq!("P3".parse::<SeatId>(), Ok(SeatId::P3));
        assert_eq!("p1".parse::<SeatId>(), Ok(SeatId::P1));
        assert!("P5".parse::<SeatId>().is_err());
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("  Sea  Dogs "), Some("Sea_Dogs".to_owned()));
        assert_eq!(sanitize_name("a|b;c:d,e"), Some("abcde".to_owned()));
        assert_eq!(sanitize_name(" ;| "), None);
        assert_eq!(sanitize_name(&"x".repeat(40)).unwrap().len(), MAX_NAME_LEN);
    }
}
