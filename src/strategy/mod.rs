//! Walking strategy
//!
//! The pruning walker consumes source events, keeps the live frontier in
//! the arena and hands matching elements to the bound handler.

pub mod walker;

pub use walker::{PruningWalker, WalkState, WalkStats};
