//! Tile coordinate type definitions

use std::fmt;

/// Number of cube faces in a panoramic image pyramid.
pub const FACE_COUNT: u8 = 6;

/// Coarsest pyramid level.
pub const MIN_LEVEL: u8 = 0;

/// Finest pyramid level supported by the engine.
pub const MAX_LEVEL: u8 = 20;

/// Address of one quadtree cell in a panoramic image pyramid.
///
/// Each cube face carries its own quadtree. Level 0 is the coarsest
/// resolution (one tile per face); each level doubles the tile count
/// along both axes. Two coordinates are equal iff all four fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Cube face index (0-5)
    pub face: u8,
    /// X position within the face at this level, 0 at the left edge
    pub x: u32,
    /// Y position within the face at this level, 0 at the top edge
    pub y: u32,
    /// Pyramid level; 0 is coarsest
    pub level: u8,
}

impl TileCoord {
    /// Creates a coordinate after validating all four fields.
    pub fn new(face: u8, x: u32, y: u32, level: u8) -> Result<Self, CoordError> {
        if face >= FACE_COUNT {
            return Err(CoordError::InvalidFace(face));
        }
        if level > MAX_LEVEL {
            return Err(CoordError::InvalidLevel(level));
        }
        let extent = tiles_per_axis(level);
        if x >= extent || y >= extent {
            return Err(CoordError::OutOfRange { x, y, level });
        }
        Ok(Self { face, x, y, level })
    }

    /// Returns the coordinate of the parent cell one level coarser.
    ///
    /// Returns `None` at the pyramid root (level 0).
    #[inline]
    pub fn parent(&self) -> Option<TileCoord> {
        if self.level == MIN_LEVEL {
            return None;
        }
        Some(TileCoord {
            face: self.face,
            x: self.x / 2,
            y: self.y / 2,
            level: self.level - 1,
        })
    }

    /// Returns the ancestor covering this cell at the given coarser level.
    ///
    /// Returns `None` if `level` is finer than this coordinate's level.
    pub fn ancestor_at(&self, level: u8) -> Option<TileCoord> {
        if level > self.level {
            return None;
        }
        let shift = self.level - level;
        Some(TileCoord {
            face: self.face,
            x: self.x >> shift,
            y: self.y >> shift,
            level,
        })
    }

    /// Returns the four child coordinates one level finer.
    ///
    /// Children are yielded in row-major order. Returns an empty vector
    /// at `MAX_LEVEL`.
    pub fn children(&self) -> Vec<TileCoord> {
        if self.level >= MAX_LEVEL {
            return Vec::new();
        }
        let (x, y) = (self.x * 2, self.y * 2);
        let level = self.level + 1;
        [(0u32, 0u32), (1, 0), (0, 1), (1, 1)]
            .into_iter()
            .map(|(dx, dy)| TileCoord {
                face: self.face,
                x: x + dx,
                y: y + dy,
                level,
            })
            .collect()
    }

    /// Checks whether this cell covers `other` (i.e. is an ancestor of it
    /// or the same cell).
    pub fn covers(&self, other: &TileCoord) -> bool {
        other.ancestor_at(self.level) == Some(*self)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}/{}/{}x{}", self.face, self.level, self.x, self.y)
    }
}

/// Number of tiles along one axis of a face at the given level.
#[inline]
pub fn tiles_per_axis(level: u8) -> u32 {
    1u32 << level.min(MAX_LEVEL)
}

/// Errors that can occur constructing a tile coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordError {
    /// Face index outside 0-5
    InvalidFace(u8),
    /// Level finer than MAX_LEVEL
    InvalidLevel(u8),
    /// X or Y outside the face extent at this level
    OutOfRange { x: u32, y: u32, level: u8 },
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::InvalidFace(face) => {
                write!(f, "Invalid face: {} (must be below {})", face, FACE_COUNT)
            }
            CoordError::InvalidLevel(level) => {
                write!(f, "Invalid level: {} (must be at most {})", level, MAX_LEVEL)
            }
            CoordError::OutOfRange { x, y, level } => {
                write!(
                    f,
                    "Position ({}, {}) outside face extent {} at level {}",
                    x,
                    y,
                    tiles_per_axis(*level),
                    level
                )
            }
        }
    }
}

impl std::error::Error for CoordError {}
