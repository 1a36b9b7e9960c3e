//! Position evaluation

use crate::board::Topology;
use crate::game::GameState;
use crate::units::Player;

/// Material balance from player one's point of view.
///
/// Each living unit is worth its health times the strongest hit it can
/// deal; player two's units count negative.
pub fn evaluate<T: Topology>(state: &GameState<T>) -> f64 {
    let catalog = state.catalog();
    state
        .units()
        .filter(|unit| unit.is_alive())
        .map(|unit| {
            let worth = f64::from(unit.health) * f64::from(catalog.peak_damage(&unit.archetype));
            match unit.owner {
                Player::One => worth,
                Player::Two => -worth,
            }
        })
        .sum()
}
