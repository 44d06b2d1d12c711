use ndarray::Array2;

/// Cell magnitude. `0` means empty; the engine only ever stores positive
/// powers of two, but the type is signed so a negative insertion request
/// can be rejected at runtime instead of wrapping.
pub type TileValue = i64;

/// Single coordinate axis. Signed for the same reason as [`TileValue`]:
/// out-of-bounds requests from an input source must be representable.
pub type Coord = i32;

/// Two-dimensional coordinates `(row, col)`, row 0 at the top.
pub type Coord2 = (Coord, Coord);

/// True iff `value` is something a settled grid cell may hold.
pub const fn is_valid_cell(value: TileValue) -> bool {
    value == 0 || (value > 0 && value & (value - 1) == 0)
}

pub trait ToNdIndex {
    type Output;
    fn to_nd_index(self) -> Self::Output;
}

impl ToNdIndex for Coord2 {
    type Output = [usize; 2];

    /// Callers validate bounds first; negative components would wrap.
    fn to_nd_index(self) -> Self::Output {
        [self.0 as usize, self.1 as usize]
    }
}

pub trait NeighborIterExt {
    fn iter_neighbors(&self, index: Coord2) -> NeighborIter;
}

impl<T> NeighborIterExt for Array2<T> {
    fn iter_neighbors(&self, index: Coord2) -> NeighborIter {
        let dim = self.dim();
        NeighborIter::new(index, (dim.0 as Coord, dim.1 as Coord))
    }
}

/// Merge priority order: up, left, right, down. First match wins, so the
/// iteration order here is load-bearing for the cascade semantics.
const DISPLACEMENTS: [(Coord, Coord); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];

/// Applies `delta` to `coords`, returning a value only when it remains in bounds.
fn apply_delta(coords: Coord2, delta: (Coord, Coord), bounds: Coord2) -> Option<Coord2> {
    let next = (coords.0 + delta.0, coords.1 + delta.1);
    (next.0 >= 0 && next.0 < bounds.0 && next.1 >= 0 && next.1 < bounds.1).then_some(next)
}

#[derive(Debug)]
pub struct NeighborIter {
    center: Coord2,
    bounds: Coord2,
    index: u8,
}

impl NeighborIter {
    fn new(center: Coord2, bounds: Coord2) -> Self {
        Self {
            center,
            bounds,
            index: 0,
        }
    }
}

impl Iterator for NeighborIter {
    type Item = Coord2;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if usize::from(self.index) >= DISPLACEMENTS.len() {
                return None;
            }

            let next_item =
                apply_delta(self.center, DISPLACEMENTS[self.index as usize], self.bounds);
            self.index += 1;

            if next_item.is_some() {
                return next_item;
            }
        }
    }
}
