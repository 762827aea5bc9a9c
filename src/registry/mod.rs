//! File registry and placement.
//!
//! [`files::FileRegistry`] maps file names to the file server that owns
//! them; [`placement`] holds the strategies that choose an owner for a new
//! file.

pub mod files;
pub mod placement;

pub use files::{FileRecord, FileRegistry, Load};
pub use placement::{Candidate, PlacementPolicy};
