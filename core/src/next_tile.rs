use core::cell::RefCell;

use rand::Rng;
use rand::RngExt;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::{BOARD_KEY, NEXT_TILE_KEY, StateStore, Subscription, TileValue, Value};

/// Picks the value of the next tile to drop: always a positive power of
/// two, drawn from a window that widens logarithmically with the highest
/// tile on the board, so big boards keep seeing small tiles more often
/// than their own top value.
pub fn next_tile_value(highest: TileValue, rng: &mut impl Rng) -> TileValue {
    let exponent: u32 = if highest < 4 {
        1
    } else if highest < 32 {
        rng.random_range(1..=2)
    } else {
        let span = highest.ilog2() - 4;
        rng.random_range(1..=span)
    };
    (1 as TileValue) << exponent
}

fn highest_in_snapshot(snapshot: &Value) -> TileValue {
    let Some(rows) = snapshot.as_array() else {
        return 0;
    };
    rows.iter()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_i64)
        .max()
        .unwrap_or(0)
}

/// Keeps [`NEXT_TILE_KEY`] populated: seeds it immediately and refreshes
/// it whenever the board snapshot under [`BOARD_KEY`] changes.
pub struct NextTilePicker;

impl NextTilePicker {
    pub fn attach(store: &StateStore, seed: u64) -> Subscription {
        let rng = RefCell::new(SmallRng::seed_from_u64(seed));
        let weak = store.downgrade();
        let refresh = move |board_snapshot: &Value| {
            let Some(store) = weak.upgrade() else {
                return;
            };
            let highest = highest_in_snapshot(board_snapshot);
            let next = next_tile_value(highest, &mut *rng.borrow_mut());
            log::debug!("next tile: {next} (highest on board: {highest})");
            store.set(NEXT_TILE_KEY, next.into());
        };

        refresh(&store.get(BOARD_KEY).unwrap_or(Value::Null));
        store.subscribe(BOARD_KEY, move |value, _prev| refresh(value))
    }
}
