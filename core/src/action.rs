use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{Coord2, Tile, TileValue, ToNdIndex};

/// One atomic grid mutation. A closed set by design: every consumer
/// (renderer, tests) matches exhaustively on the three cases.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// `to` goes from empty to `value`.
    Add { to: Coord2, value: TileValue },
    /// The value at `from` relocates to `to`; `from` becomes empty.
    Move { from: Coord2, to: Coord2 },
    /// Equal values at `from` and `to` combine into `value` at `to`.
    /// A full-column insertion is logged with `from == to`: the incoming
    /// tile has no cell of its own, so the merge doubles `to` in place.
    Merge {
        from: Coord2,
        to: Coord2,
        value: TileValue,
    },
}

impl Action {
    /// The cell whose content changed last, i.e. the one worth
    /// re-examining in the next cascade pass.
    pub const fn target(&self) -> Coord2 {
        match *self {
            Self::Add { to, .. } | Self::Move { from: _, to } | Self::Merge { to, .. } => to,
        }
    }

    /// The single replay rule. The engine mutates its own grid through
    /// this same function, so a log replayed in order over the
    /// pre-insertion grid reproduces the post-insertion grid exactly.
    pub fn apply(&self, tiles: &mut Array2<Tile>) {
        match *self {
            Self::Add { to, value } => tiles[to.to_nd_index()] = Tile::new(value),
            Self::Move { from, to } => {
                tiles[to.to_nd_index()] = tiles[from.to_nd_index()];
                tiles[from.to_nd_index()] = Tile::default();
            }
            Self::Merge { from, to, value } => {
                // source first, so the synthetic self-merge keeps the
                // doubled value instead of clearing it
                tiles[from.to_nd_index()] = Tile::default();
                tiles[to.to_nd_index()] = Tile::new(value);
            }
        }
    }
}

/// Ordered, disposable record of one insertion call. Consumers must
/// process it strictly in order; later actions may reference cells
/// vacated by earlier ones.
pub type ActionLog = SmallVec<[Action; 8]>;

/// Replays a log over a grid copy, in order.
pub fn replay(log: &[Action], tiles: &mut Array2<Tile>) {
    for action in log {
        action.apply(tiles);
    }
}
