//! Coordinate-based block iterator. Deliberately carries no reference to
//! chunk memory: a `BlockIterator` is just `(chunk coords, local index)`,
//! and every consumer re-resolves the actual chunk through the owning
//! index before touching memory. This avoids the raw-pointer-plus-
//! double-check pattern the original engine used across worker
//! boundaries.

use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z};

/// One of the six axis-aligned neighbour directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    East,
    West,
    North,
    South,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::East,
        Direction::West,
        Direction::North,
        Direction::South,
        Direction::Up,
        Direction::Down,
    ];

    fn delta(self) -> (i32, i32, i32) {
        match self {
            Direction::East => (1, 0, 0),
            Direction::West => (-1, 0, 0),
            Direction::North => (0, 1, 0),
            Direction::South => (0, -1, 0),
            Direction::Up => (0, 0, 1),
            Direction::Down => (0, 0, -1),
        }
    }

    /// The direction a ray exits through when it crosses this axis in the
    /// negative/positive sense; used to derive hit normals from DDA steps.
    pub fn from_axis_step(axis: usize, step_positive: bool) -> Direction {
        match (axis, step_positive) {
            (0, true) => Direction::East,
            (0, false) => Direction::West,
            (1, true) => Direction::North,
            (1, false) => Direction::South,
            (2, true) => Direction::Up,
            (2, false) => Direction::Down,
            _ => unreachable!("axis must be 0..3"),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// `(chunk_x, chunk_y, local_index)`. `local_index` is the z-major index
/// documented in `chunk::index_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockIterator {
    pub chunk_x: i32,
    pub chunk_y: i32,
    pub index: usize,
}

impl BlockIterator {
    pub fn new(chunk_x: i32, chunk_y: i32, index: usize) -> Self {
        Self {
            chunk_x,
            chunk_y,
            index,
        }
    }

    pub fn from_local(chunk_x: i32, chunk_y: i32, x: usize, y: usize, z: usize) -> Self {
        Self {
            chunk_x,
            chunk_y,
            index: super::index_of(x, y, z),
        }
    }

    pub fn local_coords(&self) -> (usize, usize, usize) {
        super::coords_of(self.index)
    }

    /// Compute the neighbour iterator one step in `dir`. Returns `None`
    /// only when stepping past the world's fixed vertical extent (there is
    /// no chunk above/below to cross into); stepping past a horizontal
    /// chunk edge instead yields an iterator in the adjacent chunk, which
    /// may or may not currently be resident.
    pub fn neighbour(&self, dir: Direction) -> Option<BlockIterator> {
        let (x, y, z) = self.local_coords();
        let (dx, dy, dz) = dir.delta();

        let nz = z as i32 + dz;
        if nz < 0 || nz >= CHUNK_SIZE_Z as i32 {
            return None;
        }

        let mut nx = x as i32 + dx;
        let mut ny = y as i32 + dy;
        let mut chunk_x = self.chunk_x;
        let mut chunk_y = self.chunk_y;

        if nx < 0 {
            nx += CHUNK_SIZE_X as i32;
            chunk_x -= 1;
        } else if nx >= CHUNK_SIZE_X as i32 {
            nx -= CHUNK_SIZE_X as i32;
            chunk_x += 1;
        }

        if ny < 0 {
            ny += CHUNK_SIZE_Y as i32;
            chunk_y -= 1;
        } else if ny >= CHUNK_SIZE_Y as i32 {
            ny -= CHUNK_SIZE_Y as i32;
            chunk_y += 1;
        }

        Some(BlockIterator::from_local(
            chunk_x,
            chunk_y,
            nx as usize,
            ny as usize,
            nz as usize,
        ))
    }

    pub fn neighbours(&self) -> impl Iterator<Item = (Direction, BlockIterator)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(move |dir| self.neighbour(dir).map(|it| (dir, it)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intra_chunk_step_stays_in_chunk() {
        let it = BlockIterator::from_local(0, 0, 5, 5, 5);
        let east = it.neighbour(Direction::East).unwrap();
        assert_eq!((east.chunk_x, east.chunk_y), (0, 0));
        assert_eq!(east.local_coords(), (6, 5, 5));
    }

    #[test]
    fn crossing_east_edge_enters_next_chunk() {
        let it = BlockIterator::from_local(0, 0, 15, 5, 5);
        let east = it.neighbour(Direction::East).unwrap();
        assert_eq!((east.chunk_x, east.chunk_y), (1, 0));
        assert_eq!(east.local_coords(), (0, 5, 5));
    }

    #[test]
    fn crossing_west_edge_at_negative_chunk() {
        let it = BlockIterator::from_local(-1, 0, 0, 5, 5);
        let west = it.neighbour(Direction::West).unwrap();
        assert_eq!((west.chunk_x, west.chunk_y), (-2, 0));
        assert_eq!(west.local_coords(), (15, 5, 5));
    }

    #[test]
    fn vertical_bounds_have_no_neighbour() {
        let top = BlockIterator::from_local(0, 0, 0, 0, CHUNK_SIZE_Z - 1);
        assert!(top.neighbour(Direction::Up).is_none());
        let bottom = BlockIterator::from_local(0, 0, 0, 0, 0);
        assert!(bottom.neighbour(Direction::Down).is_none());
    }

    #[test]
    fn opposite_direction_returns_to_origin() {
        let it = BlockIterator::from_local(3, -2, 8, 8, 64);
        for dir in Direction::ALL {
            if let Some(n) = it.neighbour(dir) {
                let back = n.neighbour(dir.opposite()).unwrap();
                assert_eq!(back, it);
            }
        }
    }
}
