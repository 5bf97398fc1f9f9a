//! Tile coordinates for the panoramic image pyramid.
//!
//! A panorama is modeled as six cube faces, each carrying a quadtree of
//! image tiles. Level 0 holds one tile per face; every finer level doubles
//! the resolution. Coordinates are plain value types; ancestor links are
//! always recomputed from the coordinate rather than stored, so evicting a
//! tile can never leave a dangling reference.

mod types;


pub use types::{tiles_per_axis, CoordError, TileCoord, FACE_COUNT, MAX_LEVEL, MIN_LEVEL};
