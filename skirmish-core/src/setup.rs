//! Army deployment and turn order

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{Point, Topology};
use crate::game::{GameError, GameState};
use crate::units::{Catalog, Player, UnitId};

/// Columns between neighboring units on a back row
pub const DEPLOY_SPACING: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("{0:?} has no units")]
    EmptyArmy(Player),
    #[error("{player:?} needs {needed} columns but the grid is {width} wide")]
    ArmyTooWide { player: Player, needed: i32, width: i32 },
    #[error("grid needs at least two rows, got {0}")]
    GridTooShort(i32),
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Archetype names for each side, in deployment order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmySetup {
    pub player_one: Vec<String>,
    pub player_two: Vec<String>,
}

impl ArmySetup {
    pub fn new<S: Into<String>>(player_one: impl IntoIterator<Item = S>, player_two: impl IntoIterator<Item = S>) -> Self {
        Self {
            player_one: player_one.into_iter().map(Into::into).collect(),
            player_two: player_two.into_iter().map(Into::into).collect(),
        }
    }

    /// Same army on both sides
    pub fn mirrored<S: Into<String>>(army: impl IntoIterator<Item = S>) -> Self {
        let army: Vec<String> = army.into_iter().map(Into::into).collect();
        Self {
            player_one: army.clone(),
            player_two: army,
        }
    }

    /// Deploy both armies and shuffle the turn order.
    ///
    /// Player one holds odd ids on row 0, player two even ids on the last row.
    pub fn build<T, R>(&self, width: u32, height: u32, catalog: Arc<Catalog>, rng: &mut R) -> Result<GameState<T>, SetupError>
    where
        T: Topology,
        R: Rng + ?Sized,
    {
        let rows = i32::try_from(height).unwrap_or(i32::MAX);
        if rows < 2 {
            return Err(SetupError::GridTooShort(rows));
        }
        let columns = i32::try_from(width).unwrap_or(i32::MAX);

        let mut placements: Vec<(UnitId, Player, &str, Point)> = Vec::new();
        let armies = [
            (Player::One, &self.player_one, 1, 0),
            (Player::Two, &self.player_two, 2, rows - 1),
        ];
        for (player, army, first_id, row) in armies {
            let columns_used = back_row_columns(player, army.len(), columns)?;
            for (i, (name, x)) in army.iter().zip(columns_used).enumerate() {
                let id = first_id + 2 * UnitId::try_from(i).unwrap_or(UnitId::MAX / 2);
                placements.push((id, player, name.as_str(), Point::new(x, row)));
            }
        }

        let mut turn_order: Vec<UnitId> = placements.iter().map(|p| p.0).collect();
        turn_order.shuffle(rng);

        let state = GameState::new(width, height, catalog, &placements, turn_order)?;
        tracing::info!(
            "Deployed {} vs {} units on {}x{} {} grid",
            self.player_one.len(),
            self.player_two.len(),
            width,
            height,
            T::NAME
        );
        Ok(state)
    }
}

/// Columns for an army centred on its back row
fn back_row_columns(player: Player, count: usize, width: i32) -> Result<impl Iterator<Item = i32>, SetupError> {
    if count == 0 {
        return Err(SetupError::EmptyArmy(player));
    }
    let count = i32::try_from(count).unwrap_or(i32::MAX / DEPLOY_SPACING);
    let needed = DEPLOY_SPACING * (count - 1) + 1;
    if needed > width {
        return Err(SetupError::ArmyTooWide { player, needed, width });
    }
    let start = (width - needed) / 2;
    Ok((0..count).map(move |i| start + DEPLOY_SPACING * i))
}
