#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod flow_utils;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod measure;
pub mod parser;
pub mod scheduler;
pub mod viewport;
pub mod xstate;

#[cfg(feature = "cli")]
pub use cli::run;
pub use error::{LayoutError, Result};
pub use layout::{LayeredSolver, LayoutSolver, PositionMap, PositionedItemId, Size, SizeMap, compute_layout};
pub use scheduler::{LayoutScheduler, LayoutSnapshot};
