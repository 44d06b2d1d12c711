use alloc::collections::{BTreeSet, VecDeque};
use alloc::vec::Vec;
use hashbrown::HashSet;
use ndarray::Array2;

use crate::{
    Action, ActionLog, BOARD_KEY, Coord, Coord2, GameError, GridConfig, NeighborIterExt, Result,
    StateStore, Tile, TileValue, ToNdIndex, is_valid_cell,
};

/// Safety net for the cascade loop, in passes per grid cell. The fixed
/// point is reached long before this in practice; overruns are logged
/// and cut short rather than looping forever.
const PASS_LIMIT_FACTOR: usize = 4;

/// Per-insertion working state: the log under construction and the
/// worklist of cells to re-examine in the next cascade pass.
#[derive(Default)]
struct Cascade {
    log: ActionLog,
    dirty: VecDeque<Coord2>,
}

/// The board engine. Owns the grid and turns each insertion into an
/// ordered, replayable [`ActionLog`] via gravity placement plus a
/// cascading merge/compaction fixed point.
///
/// Orientation: the stack in each column grows from row 0 downward and
/// gravity pulls tiles toward row 0, so a settled column has all of its
/// tiles packed against the top with no gaps.
pub struct Board {
    tiles: Array2<Tile>,
    store: Option<StateStore>,
}

impl Board {
    pub fn new(config: GridConfig) -> Self {
        Self {
            tiles: Array2::default((config.rows, config.cols)),
            store: None,
        }
    }

    /// Builds a board wired to `store`: if a prior snapshot exists under
    /// [`BOARD_KEY`] the grid is restored from it (shape and cell values
    /// are validated strictly, per the power-of-two invariant), and every
    /// settled mutation is written back.
    pub fn with_store(config: GridConfig, store: StateStore) -> Result<Self> {
        let mut board = Self::new(config);
        if let Some(snapshot) = store.get(BOARD_KEY) {
            board.tiles = decode_snapshot(&snapshot, config)?;
        }
        board.store = Some(store);
        Ok(board)
    }

    pub fn rows(&self) -> usize {
        self.tiles.dim().0
    }

    pub fn cols(&self) -> usize {
        self.tiles.dim().1
    }

    /// Read-only grid view for collaborators.
    pub fn tiles(&self) -> &Array2<Tile> {
        &self.tiles
    }

    pub fn tile_at(&self, coord: Coord2) -> Tile {
        self.tiles[coord.to_nd_index()]
    }

    /// Plain snapshot of the grid values, row by row.
    pub fn values(&self) -> Vec<Vec<TileValue>> {
        self.tiles
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|tile| tile.value()).collect())
            .collect()
    }

    /// Highest value on the board, 0 when empty.
    pub fn highest_value(&self) -> TileValue {
        self.tiles.iter().map(|tile| tile.value()).max().unwrap_or(0)
    }

    /// Clears every cell; dimensions are untouched. Idempotent.
    pub fn reset(&mut self) {
        self.tiles.fill(Tile::default());
        self.persist();
    }

    /// Drops `value` into the column of `coord` and runs the cascade to
    /// its fixed point, returning the ordered log of every sub-step.
    ///
    /// The log may legitimately be empty: a full column absorbs a
    /// mismatched tile with no board change. Preconditions are checked
    /// before any grid write, so a failed call mutates nothing.
    pub fn insert(&mut self, coord: Coord2, value: TileValue) -> Result<ActionLog> {
        let (_, col) = self.validate_coords(coord)?;
        if value < 0 {
            return Err(GameError::NegativeValue);
        }

        let mut run = Cascade::default();
        let rows = self.rows();
        match self.lowest_filled_row(col as usize) {
            // column empty: the tile rests at the top
            None => self.apply(&mut run, Action::Add { to: (0, col), value }),
            // column full: merge with the resting tile or absorb silently
            Some(last) if last == rows - 1 => {
                let resting = (last as Coord, col);
                if self.tile_at(resting).value() == value {
                    self.apply(
                        &mut run,
                        Action::Merge {
                            from: resting,
                            to: resting,
                            value: value * 2,
                        },
                    );
                } else {
                    log::debug!("column {col} is full, inserted {value} absorbed without effect");
                }
            }
            // otherwise: rest directly below the deepest filled cell
            Some(last) => self.apply(
                &mut run,
                Action::Add {
                    to: (last as Coord + 1, col),
                    value,
                },
            ),
        }

        self.settle(&mut run);
        if !run.log.is_empty() {
            self.persist();
        }
        Ok(run.log)
    }

    fn validate_coords(&self, coord: Coord2) -> Result<Coord2> {
        let (row, col) = coord;
        if row >= 0 && (row as usize) < self.rows() && col >= 0 && (col as usize) < self.cols() {
            Ok(coord)
        } else {
            Err(GameError::OutOfBounds)
        }
    }

    /// Deepest filled cell of `col`, i.e. the end of its stack.
    fn lowest_filled_row(&self, col: usize) -> Option<usize> {
        (0..self.rows())
            .rev()
            .find(|&row| !self.tiles[[row, col]].is_empty())
    }

    /// Applies `action` to the grid, logs it, and marks its target for
    /// the next cascade pass.
    fn apply(&mut self, run: &mut Cascade, action: Action) {
        log::trace!("apply {action:?}");
        action.apply(&mut self.tiles);
        run.dirty.push_back(action.target());
        run.log.push(action);
    }

    /// Runs merge passes and column compaction until a full pass changes
    /// nothing.
    ///
    /// Per pass: every dirty cell merges with at most its first
    /// equal-valued neighbor in up/left/right/down priority order, and no
    /// cell takes part in two merges within the same pass. Afterwards
    /// each column that lost a tile is compacted to its own fixed point
    /// before the next merge pass begins, so every gap a merge opens is
    /// fully closed before the cells above it are re-examined.
    fn settle(&mut self, run: &mut Cascade) {
        let pass_limit = self.tiles.len() * PASS_LIMIT_FACTOR + 4;
        let mut passes = 0;

        while !run.dirty.is_empty() {
            passes += 1;
            if passes > pass_limit {
                log::warn!("cascade did not settle after {pass_limit} passes, stopping early");
                break;
            }

            let batch: Vec<Coord2> = run.dirty.drain(..).collect();
            log::trace!("cascade pass {passes}: {} candidate cell(s)", batch.len());

            let mut consumed: HashSet<Coord2> = HashSet::new();
            let mut cols_to_compact: BTreeSet<Coord> = BTreeSet::new();
            for coord in batch {
                let value = self.tile_at(coord).value();
                if value == 0 || consumed.contains(&coord) {
                    continue;
                }
                for neighbor in self.tiles.iter_neighbors(coord) {
                    if consumed.contains(&neighbor) {
                        continue;
                    }
                    if self.tile_at(neighbor).value() == value {
                        self.apply(
                            run,
                            Action::Merge {
                                from: coord,
                                to: neighbor,
                                value: value * 2,
                            },
                        );
                        consumed.insert(coord);
                        consumed.insert(neighbor);
                        // the vacated cell leaves a gap in its own column
                        cols_to_compact.insert(coord.1);
                        break;
                    }
                }
            }

            for col in cols_to_compact {
                self.compact_column(run, col);
            }
        }
    }

    /// Closes every gap in `col` by repeated one-row upward shifts, each
    /// logged as a `Move`, until a sweep moves nothing. Move destinations
    /// become merge candidates for the next pass.
    fn compact_column(&mut self, run: &mut Cascade, col: Coord) {
        loop {
            let mut moved = false;
            for row in 1..self.rows() as Coord {
                let from = (row, col);
                let to = (row - 1, col);
                if self.tile_at(from).is_empty() || !self.tile_at(to).is_empty() {
                    continue;
                }
                self.apply(run, Action::Move { from, to });
                moved = true;
            }
            if !moved {
                break;
            }
        }
    }

    /// Writes the settled grid to the store, if one is attached.
    fn persist(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        match serde_json::to_value(self.values()) {
            Ok(snapshot) => store.set(BOARD_KEY, snapshot),
            Err(err) => log::error!("failed to encode board snapshot: {err}"),
        }
    }
}

fn decode_snapshot(snapshot: &serde_json::Value, config: GridConfig) -> Result<Array2<Tile>> {
    let cells: Vec<Vec<TileValue>> =
        serde_json::from_value(snapshot.clone()).map_err(|_| GameError::BadSnapshot)?;
    if cells.len() != config.rows || cells.iter().any(|row| row.len() != config.cols) {
        return Err(GameError::BadSnapshot);
    }
    if cells.iter().flatten().any(|&value| !is_valid_cell(value)) {
        return Err(GameError::BadSnapshot);
    }
    let flat: Vec<Tile> = cells.into_iter().flatten().map(Tile::new).collect();
    Array2::from_shape_vec((config.rows, config.cols), flat).map_err(|_| GameError::BadSnapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay;
    use serde_json::json;

    fn board(rows: usize, cols: usize) -> Board {
        Board::new(GridConfig::new(rows, cols))
    }

    /// Board preloaded with `cells` through the snapshot path.
    fn board_from(cells: serde_json::Value) -> Board {
        let rows = cells.as_array().unwrap().len();
        let cols = cells[0].as_array().unwrap().len();
        let store = StateStore::new();
        store.set(BOARD_KEY, cells);
        Board::with_store(GridConfig::new(rows, cols), store).unwrap()
    }

    fn no_column_has_gaps(board: &Board) {
        for col in 0..board.cols() {
            let mut seen_empty = false;
            for row in 0..board.rows() {
                let empty = board.tiles[[row, col]].is_empty();
                assert!(
                    !(seen_empty && !empty),
                    "column {col} has a gap: {:?}",
                    board.values()
                );
                seen_empty |= empty;
            }
        }
    }

    #[test]
    fn starts_empty_with_fixed_dimensions() {
        let board = board(5, 4);
        assert_eq!(board.rows(), 5);
        assert_eq!(board.cols(), 4);
        assert!(board.tiles().iter().all(|tile| tile.is_empty()));
        assert_eq!(board.highest_value(), 0);
    }

    #[test]
    fn insert_into_empty_column_adds_at_the_top() {
        // scenario A: a single Add, nothing else
        let mut board = board(4, 4);
        let log = board.insert((0, 0), 2).unwrap();
        assert_eq!(&log[..], [Action::Add { to: (0, 0), value: 2 }]);
        assert_eq!(board.values()[0], [2, 0, 0, 0]);
    }

    #[test]
    fn insert_rests_below_the_deepest_filled_cell() {
        let mut board = board(4, 4);
        board.insert((0, 0), 2).unwrap();
        // the requested row is only bounds-checked; gravity decides
        board.insert((3, 0), 4).unwrap();
        let values = board.values();
        assert_eq!(values[0][0], 2);
        assert_eq!(values[1][0], 4);
        assert_eq!(values[2][0], 0);
    }

    #[test]
    fn out_of_bounds_insertion_fails_without_mutation() {
        let mut board = board(4, 4);
        board.insert((0, 0), 2).unwrap();
        let before = board.values();

        for coord in [(-1, 0), (4, 0), (0, -1), (0, 4)] {
            assert_eq!(board.insert(coord, 2), Err(GameError::OutOfBounds));
        }
        assert_eq!(board.values(), before);
    }

    #[test]
    fn negative_value_insertion_fails_without_mutation() {
        let mut board = board(4, 4);
        assert_eq!(board.insert((0, 0), -2), Err(GameError::NegativeValue));
        assert!(board.tiles().iter().all(|tile| tile.is_empty()));
    }

    #[test]
    fn reset_clears_every_cell_and_is_idempotent() {
        let mut board = board(4, 4);
        board.insert((0, 0), 2).unwrap();
        board.insert((0, 1), 4).unwrap();

        board.reset();
        assert!(board.tiles().iter().all(|tile| tile.is_empty()));
        assert_eq!(board.rows(), 4);
        assert_eq!(board.cols(), 4);

        board.reset();
        assert!(board.tiles().iter().all(|tile| tile.is_empty()));
    }

    #[test]
    fn equal_tile_below_merges_upward() {
        // scenario B: Add below the stack, then a Merge into row 0
        let mut board = board(4, 4);
        board.insert((0, 0), 2).unwrap();
        let log = board.insert((0, 0), 2).unwrap();

        assert_eq!(
            &log[..],
            [
                Action::Add { to: (1, 0), value: 2 },
                Action::Merge { from: (1, 0), to: (0, 0), value: 4 },
            ]
        );
        assert_eq!(board.values()[0][0], 4);
        assert_eq!(board.values()[1][0], 0);
    }

    #[test]
    fn equal_tile_to_the_left_merges() {
        let mut board = board(4, 4);
        board.insert((0, 0), 2).unwrap();
        board.insert((0, 1), 2).unwrap();
        assert_eq!(board.values()[0], [4, 0, 0, 0]);
    }

    #[test]
    fn equal_tile_to_the_right_merges() {
        let mut board = board(4, 4);
        board.insert((0, 1), 2).unwrap();
        board.insert((0, 2), 2).unwrap();
        let values = board.values();
        assert_eq!(values[0][1], 4);
        assert_eq!(values[0][2], 0);
    }

    #[test]
    fn merges_cascade_recursively() {
        // scenario C: 4 . . -> insert 2, 2 -> everything collapses into 8
        let mut board = board(4, 4);
        board.insert((0, 0), 4).unwrap();
        board.insert((0, 1), 2).unwrap();
        board.insert((0, 2), 2).unwrap();
        assert_eq!(board.values()[0], [8, 0, 0, 0]);
    }

    #[test]
    fn different_values_do_not_merge() {
        let mut board = board(4, 4);
        board.insert((0, 0), 2).unwrap();
        board.insert((0, 0), 4).unwrap();
        assert_eq!(board.values()[0][0], 2);
        assert_eq!(board.values()[1][0], 4);
    }

    #[test]
    fn full_column_with_matching_tile_merges_in_place() {
        let mut board = board(2, 2);
        board.insert((0, 0), 2).unwrap();
        board.insert((0, 0), 4).unwrap(); // column now full: [2, 4]

        let log = board.insert((0, 0), 4).unwrap();
        assert_eq!(
            &log[..],
            [Action::Merge { from: (1, 0), to: (1, 0), value: 8 }]
        );
        assert_eq!(board.values(), [[2, 0], [8, 0]]);
    }

    #[test]
    fn full_column_with_mismatched_tile_is_a_silent_no_op() {
        let mut board = board(2, 2);
        board.insert((0, 0), 2).unwrap();
        board.insert((0, 0), 4).unwrap();
        let before = board.values();

        let log = board.insert((0, 0), 2).unwrap();
        assert!(log.is_empty());
        assert_eq!(board.values(), before);
    }

    #[test]
    fn compaction_settles_a_multi_gap_column() {
        // the §known edge case shape: a merge elsewhere left this column
        // as [2, 4, _, _, 4]; compaction must close both gaps, not skip
        // the nearer one for the farther one
        let mut board = board(5, 1);
        for (row, value) in [(0, 2), (1, 4), (4, 4)] {
            board.tiles[[row, 0]] = Tile::new(value);
        }

        let mut run = Cascade::default();
        board.compact_column(&mut run, 0);

        assert_eq!(board.values(), [[2], [4], [4], [0], [0]]);
        assert_eq!(
            &run.log[..],
            [
                Action::Move { from: (4, 0), to: (3, 0) },
                Action::Move { from: (3, 0), to: (2, 0) },
            ]
        );
    }

    #[test]
    fn cascade_with_mid_column_vacancy_settles_and_replays() {
        // a horizontal merge feeds a downward merge that vacates a cell
        // with occupied cells below it, forcing multi-step compaction
        let mut board = board_from(json!([
            [2, 2],
            [4, 0],
            [8, 0],
            [8, 0],
            [8, 0],
        ]));
        let before = board.tiles().clone();

        let log = board.insert((0, 1), 4).unwrap();

        assert_eq!(
            &log[..],
            [
                Action::Add { to: (1, 1), value: 4 },
                Action::Merge { from: (1, 1), to: (1, 0), value: 8 },
                Action::Merge { from: (1, 0), to: (2, 0), value: 16 },
                Action::Move { from: (2, 0), to: (1, 0) },
                Action::Move { from: (3, 0), to: (2, 0) },
                Action::Move { from: (4, 0), to: (3, 0) },
                Action::Merge { from: (2, 0), to: (3, 0), value: 16 },
                Action::Move { from: (3, 0), to: (2, 0) },
                Action::Merge { from: (2, 0), to: (1, 0), value: 32 },
            ]
        );
        assert_eq!(
            board.values(),
            [[2, 2], [32, 0], [0, 0], [0, 0], [0, 0]]
        );
        no_column_has_gaps(&board);

        // replay equivalence: the log over the pre-insertion grid
        // reproduces the engine's grid exactly
        let mut replayed = before;
        replay(&log, &mut replayed);
        assert_eq!(&replayed, board.tiles());
    }

    #[test]
    fn merges_conserve_value_and_shrink_the_tile_count() {
        let mut board = board_from(json!([
            [2, 2],
            [4, 0],
            [8, 0],
            [8, 0],
            [8, 0],
        ]));
        let mut shadow = board.tiles().clone();

        let log = board.insert((0, 1), 4).unwrap();

        for action in &log {
            if let Action::Merge { from, to, value } = *action {
                let from_value = shadow[from.to_nd_index()].value();
                let to_value = shadow[to.to_nd_index()].value();
                assert_eq!(from_value, to_value);
                assert_eq!(value, from_value * 2);
                let count_before = shadow.iter().filter(|t| !t.is_empty()).count();
                action.apply(&mut shadow);
                let count_after = shadow.iter().filter(|t| !t.is_empty()).count();
                if from != to {
                    assert_eq!(count_after, count_before - 1);
                }
            } else {
                action.apply(&mut shadow);
            }
        }
        assert_eq!(&shadow, board.tiles());
    }

    #[test]
    fn snapshot_restores_the_grid() {
        let board = board_from(json!([
            [2, 0, 0, 0],
            [0, 2, 0, 0],
            [0, 0, 2, 0],
            [0, 0, 0, 2],
        ]));
        for i in 0..4 {
            assert_eq!(board.tiles[[i, i]].value(), 2);
        }
        assert_eq!(board.highest_value(), 2);
    }

    #[test]
    fn snapshot_with_wrong_shape_is_rejected() {
        let store = StateStore::new();
        store.set(BOARD_KEY, json!([[2, 0], [0, 0]]));
        let result = Board::with_store(GridConfig::new(4, 4), store);
        assert_eq!(result.err(), Some(GameError::BadSnapshot));
    }

    #[test]
    fn snapshot_with_invalid_cells_is_rejected() {
        for cells in [json!([[3, 0], [0, 0]]), json!([[-2, 0], [0, 0]]), json!([["x", 0], [0, 0]])] {
            let store = StateStore::new();
            store.set(BOARD_KEY, cells);
            let result = Board::with_store(GridConfig::new(2, 2), store);
            assert_eq!(result.err(), Some(GameError::BadSnapshot));
        }
    }

    #[test]
    fn settled_insertions_are_written_back_to_the_store() {
        let store = StateStore::new();
        let mut board = Board::with_store(GridConfig::new(2, 2), store.clone()).unwrap();

        board.insert((0, 0), 2).unwrap();
        assert_eq!(store.get(BOARD_KEY), Some(json!([[2, 0], [0, 0]])));

        board.insert((0, 1), 2).unwrap();
        assert_eq!(store.get(BOARD_KEY), Some(json!([[4, 0], [0, 0]])));

        board.reset();
        assert_eq!(store.get(BOARD_KEY), Some(json!([[0, 0], [0, 0]])));
    }

    #[test]
    fn no_op_insertion_does_not_touch_the_store() {
        let store = StateStore::new();
        store.set(BOARD_KEY, json!([[2], [4]]));
        let mut board = Board::with_store(GridConfig::new(2, 1), store.clone()).unwrap();

        let writes = alloc::rc::Rc::new(core::cell::RefCell::new(0));
        let sink = alloc::rc::Rc::clone(&writes);
        let _sub = store.subscribe(BOARD_KEY, move |_, _| *sink.borrow_mut() += 1);

        let log = board.insert((0, 0), 2).unwrap();
        assert!(log.is_empty());
        assert_eq!(*writes.borrow(), 0);
        assert_eq!(store.get(BOARD_KEY), Some(json!([[2], [4]])));
    }

    #[test]
    fn replay_matches_across_a_batch_of_random_style_insertions() {
        let mut board = board(5, 4);
        let drops = [
            (0, 2),
            (0, 2),
            (1, 4),
            (1, 4),
            (2, 2),
            (0, 8),
            (3, 2),
            (2, 2),
            (1, 8),
            (0, 2),
        ];
        for (col, value) in drops {
            let before = board.tiles().clone();
            let log = board.insert((0, col), value).unwrap();
            let mut replayed = before;
            replay(&log, &mut replayed);
            assert_eq!(&replayed, board.tiles());
            no_column_has_gaps(&board);
            assert!(board.tiles().iter().all(|t| is_valid_cell(t.value())));
        }
    }

    #[test]
    fn compaction_keeps_no_gap_between_merged_stacks() {
        // scenario D flavor: a tall stack keeps its survivors packed
        // against row 0 after a ripple of merges
        let mut board = board_from(json!([
            [16, 0],
            [8, 0],
            [0, 0],
            [0, 0],
            [0, 0],
        ]));
        board.insert((0, 0), 8).unwrap();
        assert_eq!(
            board.values(),
            [[32, 0], [0, 0], [0, 0], [0, 0], [0, 0]]
        );
        no_column_has_gaps(&board);
    }
}
