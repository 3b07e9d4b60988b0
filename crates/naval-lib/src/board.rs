use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

use crate::{fleet_ship_size, FLEET_CELLS, GRID_SIZE};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub row: u8,
    pub col: u8,
}

impl Coord {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(self) -> bool {
        self.row < GRID_SIZE && self.col < GRID_SIZE
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

impl FromStr for Coord {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (row, col) = s.split_once(',').ok_or(())?;
        Ok(Self {
            row: row.trim().parse().map_err(|_| ())?,
            col: col.trim().parse().map_err(|_| ())?,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl FromStr for Orientation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "H" | "h" => Ok(Self::Horizontal),
            "V" | "v" => Ok(Self::Vertical),
            _ => Err(()),
        }
    }
}

impl Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Horizontal => f.write_str("H"),
            Orientation::Vertical => f.write_str("V"),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Cell {
    #[default]
    Empty,
    Ship,
    Hit,
    Miss,
    Sunk,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ship {
    pub name: String,
    pub cells: Vec<Coord>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("{0} is not part of the fleet")]
    UnknownShip(String),
    #[error("{name} must be {expected} cells long")]
    SizeMismatch { name: String, expected: u8 },
    #[error("{0} has already been placed")]
    AlreadyPlaced(String),
    #[error("Ship size must be at least 1")]
    EmptyShip,
    #[error("Ship would extend off the board")]
    OutOfBounds,
    #[error("Ship would overlap another ship")]
    Overlap,
    #[error("Fleet is already complete")]
    FleetComplete,
}

/// Result of a single shot at a board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Miss,
    Hit,
    Sunk { name: String, cells: Vec<Coord> },
}

impl Outcome {
    /// Sunk counts as a hit as far as the wire and turn rotation are concerned.
    pub fn is_hit(&self) -> bool {
        !matches!(self, Outcome::Miss)
    }
}

/// A fleet layout, in placement order. Travels over the wire as `TEAM_BOARD`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fleet(pub Vec<Ship>);

impl Display for Fleet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ship) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}:", ship.name)?;
            for (j, cell) in ship.cells.iter().enumerate() {
                if j > 0 {
                    f.write_str(";")?;
                }
                write!(f, "{cell}")?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Board {
    cells: [[Cell; GRID_SIZE as usize]; GRID_SIZE as usize],
    ships: Vec<Ship>,
}

impl Board {
    pub fn cell(&self, at: Coord) -> Option<Cell> {
        at.in_bounds()
            .then(|| self.cells[at.row as usize][at.col as usize])
    }

    fn cell_mut(&mut self, at: Coord) -> &mut Cell {
        &mut self.cells[at.row as usize][at.col as usize]
    }

    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    pub fn ship(&self, name: &str) -> Option<&Ship> {
        self.ships.iter().find(|s| s.name == name)
    }

    pub fn fleet(&self) -> Fleet {
        Fleet(self.ships.clone())
    }

    /// Number of cells occupied by placed ships, whatever their damage.
    pub fn occupied_cells(&self) -> usize {
        self.ships.iter().map(|s| s.cells.len()).sum()
    }

    /// Number of placed ships that are not yet sunk.
    pub fn afloat(&self) -> usize {
        self.ships
            .iter()
            .filter(|ship| !ship.cells.iter().all(|&c| self.cell(c) == Some(Cell::Sunk)))
            .count()
    }

    /// True once every ship of the configured fleet is on the board.
    pub fn fleet_complete(&self) -> bool {
        self.occupied_cells() == FLEET_CELLS
            && crate::FLEET
                .iter()
                .all(|(name, _)| self.ship(name).is_some())
    }

    /// Validate a ship against the configured fleet before placing it.
    pub fn place_fleet_ship(
        &mut self,
        name: &str,
        size: u8,
        origin: Coord,
        orientation: Orientation,
    ) -> Result<Vec<Coord>, PlacementError> {
        let expected = fleet_ship_size(name)
            .ok_or_else(|| PlacementError::UnknownShip(name.to_owned()))?;
        if expected != size {
            return Err(PlacementError::SizeMismatch {
                name: name.to_owned(),
                expected,
            });
        }
        self.place_ship(name, size, origin, orientation)
    }

    /// Place `size` contiguous cells extending right (horizontal) or down (vertical) from
    /// `origin` and record them under `name`. The board is left untouched on error.
    pub fn place_ship(
        &mut self,
        name: &str,
        size: u8,
        origin: Coord,
        orientation: Orientation,
    ) -> Result<Vec<Coord>, PlacementError> {
        if size == 0 {
            return Err(PlacementError::EmptyShip);
        }
        if self.ship(name).is_some() {
            return Err(PlacementError::AlreadyPlaced(name.to_owned()));
        }
        if self.occupied_cells() + usize::from(size) > FLEET_CELLS {
            return Err(PlacementError::FleetComplete);
        }

        let mut coords = Vec::with_capacity(size.into());
        for i in 0..size {
            let at = match orientation {
                Orientation::Horizontal => {
                    origin.col.checked_add(i).map(|c| Coord::new(origin.row, c))
                }
                Orientation::Vertical => {
                    origin.row.checked_add(i).map(|r| Coord::new(r, origin.col))
                }
            }
            .filter(|at| at.in_bounds())
            .ok_or(PlacementError::OutOfBounds)?;

            if self.cell(at) != Some(Cell::Empty) {
                return Err(PlacementError::Overlap);
            }
            coords.push(at);
        }

        for &at in &coords {
            *self.cell_mut(at) = Cell::Ship;
        }
        self.ships.push(Ship {
            name: name.to_owned(),
            cells: coords.clone(),
        });
        Ok(coords)
    }

    /// Resolve a shot. Callers are expected to have bounds-checked `at`.
    pub fn receive_attack(&mut self, at: Coord) -> Outcome {
        match self.cell(at) {
            Some(Cell::Ship) => {}
            Some(Cell::Empty) => {
                *self.cell_mut(at) = Cell::Miss;
                return Outcome::Miss;
            }
            // Repeat shots and off-grid coordinates change nothing
            _ => return Outcome::Miss,
        }

        *self.cell_mut(at) = Cell::Hit;
        let Some(ship) = self.ships.iter().find(|s| s.cells.contains(&at)) else {
            return Outcome::Hit;
        };
        if !ship.cells.iter().all(|&c| self.cell(c) == Some(Cell::Hit)) {
            return Outcome::Hit;
        }

        let (name, cells) = (ship.name.clone(), ship.cells.clone());
        for &c in &cells {
            *self.cell_mut(c) = Cell::Sunk;
        }
        Outcome::Sunk { name, cells }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::FLEET;

    fn full_board() -> Board {
        let mut board = Board::default();
        for (row, (name, size)) in FLEET.iter().enumerate() {
            let origin = Coord::new(row as u8 * 2, 0);
            board
                .place_fleet_ship(name, *size, origin, Orientation::Horizontal)
                .unwrap();
        }
        board
    }

    #[test]
    fn place_ship_horizontal_and_vertical() {
        let mut board = Board::default();
        let h = board
            .place_ship("Destroyer", 2, Coord::new(0, 0), Orientation::Horizontal)
            .unwrap();
        assert_eq!(h, vec![Coord::new(0, 0), Coord::new(0, 1)]);

        let v = board
            .place_ship("Cruiser", 3, Coord::new(2, 9), Orientation::Vertical)
            .unwrap();
        assert_eq!(v, vec![Coord::new(2, 9), Coord::new(3, 9), Coord::new(4, 9)]);
        assert_eq!(board.cell(Coord::new(3, 9)), Some(Cell::Ship));
        assert_eq!(board.afloat(), 2);
    }

    #[test]
    fn rejected_placements_leave_board_untouched() {
        let mut board = Board::default();
        board
            .place_ship("Battleship", 4, Coord::new(5, 5), Orientation::Vertical)
            .unwrap();
        let before = board.clone();

        assert_eq!(
            board.place_ship("Carrier", 5, Coord::new(0, 6), Orientation::Horizontal),
            Err(PlacementError::OutOfBounds)
        );
        assert_eq!(
            board.place_ship("Carrier", 5, Coord::new(7, 3), Orientation::Horizontal),
            Err(PlacementError::Overlap)
        );
        assert_eq!(
            board.place_ship("Battleship", 4, Coord::new(0, 0), Orientation::Horizontal),
            Err(PlacementError::AlreadyPlaced("Battleship".to_owned()))
        );
        assert_eq!(
            board.place_ship("Raft", 0, Coord::new(0, 0), Orientation::Horizontal),
            Err(PlacementError::EmptyShip)
        );
        assert_eq!(board, before);
    }

    #[test]
    fn fleet_rules() {
        let mut board = Board::default();
        assert_eq!(
            board.place_fleet_ship("Canoe", 2, Coord::new(0, 0), Orientation::Horizontal),
            Err(PlacementError::UnknownShip("Canoe".to_owned()))
        );
        assert_eq!(
            board.place_fleet_ship("Carrier", 3, Coord::new(0, 0), Orientation::Horizontal),
            Err(PlacementError::SizeMismatch {
                name: "Carrier".to_owned(),
                expected: 5
            })
        );

        let board = full_board();
        assert!(board.fleet_complete());
        assert_eq!(board.occupied_cells(), FLEET_CELLS);
        let ship_cells = board
            .cells
            .iter()
            .flatten()
            .filter(|&&c| c == Cell::Ship)
            .count();
        assert_eq!(ship_cells, FLEET_CELLS);
    }

    #[test]
    fn total_cells_are_capped() {
        let mut board = full_board();
        assert_eq!(
            board.place_ship("Extra", 1, Coord::new(9, 9), Orientation::Horizontal),
            Err(PlacementError::FleetComplete)
        );
    }

    #[test]
    fn sunk_exactly_when_every_cell_is_hit() {
        let mut board = full_board();
        let cruiser = board.ship("Cruiser").unwrap().cells.clone();
        assert_eq!(board.afloat(), 5);

        assert_eq!(board.receive_attack(cruiser[0]), Outcome::Hit);
        assert_eq!(board.receive_attack(cruiser[2]), Outcome::Hit);
        // Shooting the same cell twice does not count twice
        assert_eq!(board.receive_attack(cruiser[2]), Outcome::Miss);
        assert_eq!(board.afloat(), 5);

        assert_eq!(
            board.receive_attack(cruiser[1]),
            Outcome::Sunk {
                name: "Cruiser".to_owned(),
                cells: cruiser.clone()
            }
        );
        assert!(cruiser.iter().all(|&c| board.cell(c) == Some(Cell::Sunk)));
        assert_eq!(board.afloat(), 4);
    }

    #[test]
    fn miss_marks_water() {
        let mut board = full_board();
        let at = Coord::new(9, 9);
        assert_eq!(board.receive_attack(at), Outcome::Miss);
        assert_eq!(board.cell(at), Some(Cell::Miss));
        assert_eq!(board.receive_attack(at), Outcome::Miss);
    }

    #[test]
    fn fleet_wire_format() {
        let board = full_board();
        let text = board.fleet().to_string();
        assert!(text.starts_with("Carrier:0,0;0,1;0,2;0,3;0,4 Battleship:2,0;"));
    }
}
