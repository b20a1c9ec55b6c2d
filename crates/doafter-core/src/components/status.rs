//! Status components read by the interruption checks.

use serde::{Deserialize, Serialize};

/// A spatial region actors stand on. Paused grids freeze every action of
/// every actor positioned on them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Grid {
    pub name: String,
    pub paused: bool,
}

impl Grid {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paused: false,
        }
    }
}

/// Marker component: the entity is stunned and cannot keep working.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stunned;

/// Manipulators an entity has, how many are occupied and which one is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hands {
    pub count: u8,
    pub held: u8,
    pub active: u8,
}

impl Hands {
    pub fn new(count: u8) -> Self {
        Self {
            count,
            held: 0,
            active: 0,
        }
    }

    pub fn has_free(&self) -> bool {
        self.held < self.count
    }

    /// Occupy one hand. Returns false if all hands are full.
    pub fn pick_up(&mut self) -> bool {
        if self.has_free() {
            self.held += 1;
            true
        } else {
            false
        }
    }

    pub fn drop_one(&mut self) {
        self.held = self.held.saturating_sub(1);
    }

    /// Switch the active hand. Out-of-range indices are ignored.
    pub fn select(&mut self, hand: u8) {
        if hand < self.count {
            self.active = hand;
        }
    }
}

impl Default for Hands {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hands() {
        let mut hands = Hands::new(1);
        assert!(hands.has_free());
        assert!(hands.pick_up());
        assert!(!hands.has_free());
        assert!(!hands.pick_up());
        hands.drop_one();
        hands.drop_one();
        assert_eq!(hands.held, 0);
    }

    #[test]
    fn test_select_hand() {
        let mut hands = Hands::new(2);
        hands.select(1);
        assert_eq!(hands.active, 1);
        hands.select(5);
        assert_eq!(hands.active, 1);
    }
}
