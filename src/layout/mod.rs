//! Hierarchical flow layout: request building, solving, and flattening.

pub mod builder;
pub mod flatten;
pub mod graph;
pub mod options;
mod ranking;
mod routing;
pub mod solver;
pub mod types;

pub use builder::build_graph;
pub use flatten::flatten;
pub use graph::{EdgeData, EdgeSection, LayoutEdge, LayoutLabel, LayoutNode, LayoutOptions, LayoutPort};
pub use solver::{LayeredSolver, LayoutEngine, LayoutSolver};
pub use types::{
    Connector, Padding, Point, PositionInfo, PositionMap, PositionedItemId, PositionedItemKind, Size,
    SizeMap,
};

use crate::config::LayoutConfig;
use crate::error::LayoutError;
use crate::flow_utils::materialize_default;
use crate::ir::Flow;

/// Materializes `flow` and builds the solver request for it.
pub fn build_layout_request(flow: &Flow, sizes: &SizeMap, config: &LayoutConfig) -> LayoutNode {
    let full = materialize_default(flow);
    build_graph(sizes, &full, config.direction, config)
}

/// Runs the whole pipeline synchronously with the built-in solver.
pub fn compute_layout(
    flow: &Flow,
    sizes: &SizeMap,
    config: &LayoutConfig,
) -> Result<PositionMap, LayoutError> {
    let request = build_layout_request(flow, sizes, config);
    let solved = LayeredSolver::new(config.clone()).solve(request)?;
    Ok(flatten(sizes, &solved))
}
