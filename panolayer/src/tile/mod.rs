//! Tile lifecycle state.

mod node;

pub use node::{TileNode, TileState};
