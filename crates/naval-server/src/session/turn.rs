use naval_lib::{Mode, SeatId};

/// Tracks whose turn it is within a fixed rotation.
#[derive(Debug, Clone)]
pub struct TurnCoordinator {
    order: &'static [SeatId],
    index: usize,
}

impl TurnCoordinator {
    pub fn new(mode: Mode) -> Self {
        Self {
            order: mode.turn_order(),
            index: 0,
        }
    }

    pub fn current(&self) -> SeatId {
        self.order[self.index]
    }

    pub fn holds_turn(&self, seat: SeatId) -> bool {
        self.current() == seat
    }

    /// Pass the turn to the next seat in the rotation for which `playable` holds.
    ///
    /// Returns `None`, leaving the turn where it was, when no other seat is playable.
    pub fn advance(&mut self, playable: impl Fn(SeatId) -> bool) -> Option<SeatId> {
        let len = self.order.len();
        let next = (1..=len)
            .map(|step| (self.index + step) % len)
            .find(|&i| playable(self.order[i]))?;
        self.index = next;
        Some(self.current())
    }

    /// Apply the turn policy after an attack: a hit keeps the turn, a miss passes it on.
    pub fn after_attack(&mut self, hit: bool, playable: impl Fn(SeatId) -> bool) -> SeatId {
        if !hit {
            self.advance(playable);
        }
        self.current()
    }
}

#[cfg(test)]
mod test {
    use naval_lib::{Mode, SeatId};

    use super::TurnCoordinator;

    #[test]
    fn pairs_alternate_on_miss() {
        let mut turn = TurnCoordinator::new(Mode::Pairs);
        assert_eq!(turn.current(), SeatId::P1);

        assert_eq!(turn.after_attack(true, |_| true), SeatId::P1);
        assert_eq!(turn.after_attack(false, |_| true), SeatId::P2);
        assert_eq!(turn.after_attack(true, |_| true), SeatId::P2);
        assert_eq!(turn.after_attack(false, |_| true), SeatId::P1);
    }

    #[test]
    fn teams_rotate_between_sides() {
        let mut turn = TurnCoordinator::new(Mode::Teams);
        let mut seen = vec![turn.current()];
        for _ in 0..4 {
            seen.push(turn.after_attack(false, |_| true));
        }
        assert_eq!(
            seen,
            [SeatId::P1, SeatId::P3, SeatId::P2, SeatId::P4, SeatId::P1]
        );
    }

    #[test]
    fn advance_skips_unplayable_seats() {
        let mut turn = TurnCoordinator::new(Mode::Teams);
        let gone = [SeatId::P3];
        let playable = |s: SeatId| !gone.contains(&s);

        assert_eq!(turn.after_attack(false, playable), SeatId::P2);
        assert_eq!(turn.after_attack(false, playable), SeatId::P4);
        assert_eq!(turn.after_attack(false, playable), SeatId::P1);
        assert!(turn.holds_turn(SeatId::P1));
    }

    #[test]
    fn advance_without_candidates_keeps_turn() {
        let mut turn = TurnCoordinator::new(Mode::Pairs);
        assert_eq!(turn.advance(|_| false), None);
        assert_eq!(turn.current(), SeatId::P1);
    }
}
