//! The layout solver seam and the built-in layered implementation.
//!
//! `LayeredSolver` places each container's direct children with dagre, packs
//! the result inside the container's padding, and works outward until the
//! root is sized. Unlike ELK it answers in a single coordinate frame: every
//! node, label, and route point it returns is absolute.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};

use async_trait::async_trait;
use dagre_rust::{GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode};
use graphlib_rust::{Graph as DagreGraph, GraphOption};
use serde::{Deserialize, Serialize};

use super::graph::{EdgeSection, LayoutEdge, LayoutNode};
use super::options::{self, PADDING, PORT_BORDER_OFFSET, PRIORITY_DIRECTION, SPACING_BASE};
use super::ranking::place_ranked;
use super::routing::{self, PortRole, Rect};
use super::types::{Padding, Point, PositionedItemId};
use crate::config::LayoutConfig;
use crate::error::LayoutError;
use crate::ir::Direction;

/// Anything that can turn a layout request into a solved tree of the same
/// shape. Implementations must fill in `x`/`y`/`width`/`height` on every node,
/// `sections` on every edge, and a frame on every edge label.
#[async_trait]
pub trait LayoutSolver: Send + Sync {
    async fn layout(&self, graph: LayoutNode) -> Result<LayoutNode, LayoutError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum LayoutEngine {
    /// dagre per container, falling back to ranked placement on failure.
    #[default]
    Dagre,
    Ranked,
}

#[derive(Debug, Clone, Default)]
pub struct LayeredSolver {
    config: LayoutConfig,
    engine: LayoutEngine,
}

/// Placement is CPU-bound, so it runs on the blocking pool and the calling
/// task only waits for it.
#[async_trait]
impl LayoutSolver for LayeredSolver {
    async fn layout(&self, graph: LayoutNode) -> Result<LayoutNode, LayoutError> {
        let solver = self.clone();
        tokio::task::spawn_blocking(move || solver.solve(graph))
            .await
            .map_err(|err| LayoutError::Solver(format!("layout task failed: {err}")))?
    }
}

impl LayeredSolver {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            engine: LayoutEngine::Dagre,
        }
    }

    pub fn with_engine(mut self, engine: LayoutEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn solve(&self, mut graph: LayoutNode) -> Result<LayoutNode, LayoutError> {
        let root_direction =
            options::parse_direction(&graph.layout_options).unwrap_or(self.config.direction);
        let solved = {
            let index = GraphIndex::new(&graph)?;
            let mut pass = Placement::new(self, &index);
            pass.measure(&graph, root_direction)?;
            pass.place(&graph, Point::default());
            pass.finish(&graph, root_direction)?
        };
        apply(&mut graph, &solved);
        Ok(graph)
    }
}

/// Lookup tables over the request tree.
struct GraphIndex<'g> {
    nodes: HashMap<&'g str, &'g LayoutNode>,
    parent: HashMap<&'g str, &'g str>,
    port_owner: HashMap<&'g str, &'g str>,
}

impl<'g> GraphIndex<'g> {
    fn new(root: &'g LayoutNode) -> Result<Self, LayoutError> {
        let mut index = Self {
            nodes: HashMap::new(),
            parent: HashMap::new(),
            port_owner: HashMap::new(),
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if index.nodes.insert(node.id.as_str(), node).is_some() {
                return Err(LayoutError::InvalidGraph(format!("duplicate node id {}", node.id)));
            }
            for port in &node.ports {
                if index.port_owner.insert(port.id.as_str(), node.id.as_str()).is_some() {
                    return Err(LayoutError::InvalidGraph(format!("duplicate port id {}", port.id)));
                }
            }
            for child in &node.children {
                index.parent.insert(child.id.as_str(), node.id.as_str());
                stack.push(child);
            }
        }
        Ok(index)
    }

    /// Node owning a port reference, or the node itself when the reference
    /// names one directly.
    fn owner(&self, reference: &str) -> Result<&'g str, LayoutError> {
        if let Some(owner) = self.port_owner.get(reference) {
            return Ok(*owner);
        }
        match self.nodes.get_key_value(reference) {
            Some((id, _)) => Ok(*id),
            None => Err(LayoutError::InvalidGraph(format!(
                "edge references unknown port or node {reference}"
            ))),
        }
    }

    fn endpoints(&self, edge: &LayoutEdge) -> Result<(&'g str, &'g str), LayoutError> {
        let source = edge
            .sources
            .first()
            .ok_or_else(|| LayoutError::InvalidGraph(format!("edge {} has no source", edge.id)))?;
        let target = edge
            .targets
            .first()
            .ok_or_else(|| LayoutError::InvalidGraph(format!("edge {} has no target", edge.id)))?;
        Ok((self.owner(source)?, self.owner(target)?))
    }

    /// The direct child of `container` on the path to `node`.
    fn child_ancestor_of(&self, node: &'g str, container: &str) -> Option<&'g str> {
        let mut current = node;
        while let Some(parent) = self.parent.get(current) {
            if *parent == container {
                return Some(current);
            }
            current = *parent;
        }
        None
    }

    fn is_strict_descendant(&self, node: &str, ancestor: &str) -> bool {
        let mut current = node;
        while let Some(parent) = self.parent.get(current) {
            if *parent == ancestor {
                return true;
            }
            current = *parent;
        }
        false
    }
}

struct SelfLoop<'g> {
    edge: &'g PositionedItemId,
    label: (f32, f32),
}

/// Solved geometry keyed by node, port, and edge id.
#[derive(Default)]
struct Solved {
    frames: HashMap<String, Rect>,
    ports: HashMap<String, Point>,
    edges: HashMap<String, (EdgeSection, Vec<Rect>)>,
}

struct Placement<'s, 'g> {
    solver: &'s LayeredSolver,
    index: &'s GraphIndex<'g>,
    sizes: HashMap<&'g str, (f32, f32)>,
    /// Child top-left relative to its parent's top-left.
    offsets: HashMap<&'g str, Point>,
    frames: HashMap<&'g str, Rect>,
    /// Direction of the container a node is laid out in.
    placed_in: HashMap<&'g str, Direction>,
    self_loops: HashMap<&'g str, Vec<SelfLoop<'g>>>,
}

impl<'s, 'g> Placement<'s, 'g> {
    fn new(solver: &'s LayeredSolver, index: &'s GraphIndex<'g>) -> Self {
        Self {
            solver,
            index,
            sizes: HashMap::new(),
            offsets: HashMap::new(),
            frames: HashMap::new(),
            placed_in: HashMap::new(),
            self_loops: HashMap::new(),
        }
    }

    fn loop_spacing(&self) -> f32 {
        self.solver.config.self_loop_spacing
    }

    /// Post-order sizing; records each child's offset inside its container.
    fn measure(&mut self, node: &'g LayoutNode, placed_in: Direction) -> Result<(f32, f32), LayoutError> {
        let id = node.id.as_str();
        self.placed_in.insert(id, placed_in);
        let requested = (node.width.unwrap_or(0.0), node.height.unwrap_or(0.0));
        if node.children.is_empty() {
            self.sizes.insert(id, requested);
            return Ok(requested);
        }

        let direction = options::parse_direction(&node.layout_options).unwrap_or(placed_in);
        let mut child_sizes = Vec::with_capacity(node.children.len());
        for child in &node.children {
            child_sizes.push(self.measure(child, direction)?);
        }

        let slot: HashMap<&str, usize> = node
            .children
            .iter()
            .enumerate()
            .map(|(idx, child)| (child.id.as_str(), idx))
            .collect();
        let mut links: Vec<(usize, usize, f32)> = Vec::new();
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for edge in &node.edges {
            let (source, target) = self.index.endpoints(edge)?;
            if source == target {
                self.self_loops.entry(source).or_default().push(SelfLoop {
                    edge: &edge.id,
                    label: edge
                        .labels
                        .first()
                        .map(|l| (l.width.unwrap_or(0.0), l.height.unwrap_or(0.0)))
                        .unwrap_or((0.0, 0.0)),
                });
                continue;
            }
            let from = self.index.child_ancestor_of(source, id).and_then(|c| slot.get(c));
            let to = self.index.child_ancestor_of(target, id).and_then(|c| slot.get(c));
            let (Some(&from), Some(&to)) = (from, to) else {
                continue;
            };
            if from != to && seen.insert((from, to)) {
                let weight = match edge.layout_options.get(PRIORITY_DIRECTION).map(String::as_str) {
                    Some("1") => 2.0,
                    _ => 1.0,
                };
                links.push((from, to, weight));
            }
        }

        let spacing = options::parse_f32(&node.layout_options, SPACING_BASE)
            .unwrap_or(self.solver.config.spacing_base);
        let boxes: Vec<(f32, f32)> = node
            .children
            .iter()
            .zip(&child_sizes)
            .map(|(child, &(w, h))| {
                let labels: Vec<(f32, f32)> = self
                    .self_loops
                    .get(child.id.as_str())
                    .map(|loops| loops.iter().map(|l| l.label).collect())
                    .unwrap_or_default();
                let (extra_w, extra_h) =
                    routing::self_loop_reserve(w, h, direction, &labels, self.loop_spacing());
                (w + extra_w, h + extra_h)
            })
            .collect();

        let corners = self.arrange(&node.id, &boxes, &links, direction, spacing);

        let min_x = corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let min_y = corners.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_x = corners
            .iter()
            .zip(&boxes)
            .map(|(p, b)| p.x + b.0)
            .fold(f32::NEG_INFINITY, f32::max);
        let max_y = corners
            .iter()
            .zip(&boxes)
            .map(|(p, b)| p.y + b.1)
            .fold(f32::NEG_INFINITY, f32::max);

        let padding = node
            .layout_options
            .get(PADDING)
            .and_then(|raw| options::parse_padding(raw))
            .unwrap_or_else(|| Padding::uniform(self.solver.config.container_padding));
        let content_w = (max_x - min_x) + padding.left + padding.right;
        let content_h = (max_y - min_y) + padding.top + padding.bottom;
        let width = requested.0.max(content_w);
        let height = requested.1.max(content_h);
        let shift = match direction {
            Direction::Vertical => Point::new((width - content_w) / 2.0, 0.0),
            Direction::Horizontal => Point::new(0.0, (height - content_h) / 2.0),
        };

        for (child, corner) in node.children.iter().zip(&corners) {
            self.offsets.insert(
                child.id.as_str(),
                Point::new(
                    corner.x - min_x + padding.left + shift.x,
                    corner.y - min_y + padding.top + shift.y,
                ),
            );
        }
        self.sizes.insert(id, (width, height));
        Ok((width, height))
    }

    /// Top-left corners for the children boxes in an arbitrary frame.
    fn arrange(
        &self,
        container: &PositionedItemId,
        boxes: &[(f32, f32)],
        links: &[(usize, usize, f32)],
        direction: Direction,
        spacing: f32,
    ) -> Vec<Point> {
        let rank_spacing = spacing * self.solver.config.rank_spacing_factor;
        if self.solver.engine == LayoutEngine::Dagre && boxes.len() > 1 {
            match run_dagre(boxes, links, direction, spacing, rank_spacing) {
                Some(corners) => return corners,
                None => tracing::debug!(
                    container = %container,
                    "dagre could not place container, using ranked placement"
                ),
            }
        }
        let edges: Vec<(usize, usize)> = links.iter().map(|&(from, to, _)| (from, to)).collect();
        place_ranked(boxes, &edges, direction, spacing, rank_spacing)
    }

    /// Top-down pass turning relative offsets into absolute frames.
    fn place(&mut self, node: &'g LayoutNode, origin: Point) {
        let id = node.id.as_str();
        let (width, height) = self.sizes.get(id).copied().unwrap_or((0.0, 0.0));
        self.frames.insert(
            id,
            Rect {
                x: origin.x,
                y: origin.y,
                width,
                height,
            },
        );
        for child in &node.children {
            let offset = self.offsets.get(child.id.as_str()).copied().unwrap_or_default();
            self.place(child, Point::new(origin.x + offset.x, origin.y + offset.y));
        }
    }

    fn finish(&self, root: &'g LayoutNode, root_direction: Direction) -> Result<Solved, LayoutError> {
        let mut solved = Solved::default();
        for (id, frame) in &self.frames {
            solved.frames.insert((*id).to_string(), *frame);
        }

        let roles = self.port_roles(root)?;
        for (id, node) in &self.index.nodes {
            let frame = self.frames.get(id).copied().unwrap_or_default();
            let direction = self.placed_in.get(id).copied().unwrap_or(root_direction);
            let node_roles: Vec<PortRole> = node
                .ports
                .iter()
                .map(|port| roles.get(port.id.as_str()).copied().unwrap_or(PortRole::Incoming))
                .collect();
            let points = routing::place_ports(frame.width, frame.height, direction, &node_roles);
            for (port, point) in node.ports.iter().zip(points) {
                solved.ports.insert(port.id.clone(), point);
            }
        }

        for &node in self.index.nodes.values() {
            for edge in &node.edges {
                let routed = self.route(edge, &solved, root_direction)?;
                solved.edges.insert(edge.id.as_str().to_string(), routed);
            }
        }
        Ok(solved)
    }

    fn port_roles(&self, root: &'g LayoutNode) -> Result<HashMap<&'g str, PortRole>, LayoutError> {
        let mut roles = HashMap::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            stack.extend(node.children.iter());
            for edge in &node.edges {
                let (source, target) = self.index.endpoints(edge)?;
                let (Some(source_ref), Some(target_ref)) = (edge.sources.first(), edge.targets.first())
                else {
                    continue;
                };
                if source == target {
                    let loops = self.self_loops.get(source).map(Vec::as_slice).unwrap_or(&[]);
                    let index = loops.iter().position(|l| l.edge == &edge.id).unwrap_or(0);
                    let count = loops.len().max(1);
                    roles.insert(source_ref.as_str(), PortRole::LoopOut { index, count });
                    roles.insert(target_ref.as_str(), PortRole::LoopIn { index, count });
                    continue;
                }
                let source_role = if self.index.is_strict_descendant(target, source) {
                    let depth = self
                        .index
                        .nodes
                        .get(source)
                        .and_then(|owner| owner.ports.iter().find(|p| &p.id == source_ref))
                        .and_then(|port| options::parse_f32(&port.layout_options, PORT_BORDER_OFFSET))
                        .map_or(0.0, |offset| -offset);
                    PortRole::Interior { depth }
                } else {
                    PortRole::Outgoing
                };
                roles.entry(source_ref.as_str()).or_insert(source_role);
                roles.entry(target_ref.as_str()).or_insert(PortRole::Incoming);
            }
        }
        Ok(roles)
    }

    fn anchor(&self, reference: &str, owner: &str, solved: &Solved) -> Point {
        let frame = self.frames.get(owner).copied().unwrap_or_default();
        match solved.ports.get(reference) {
            Some(rel) => Point::new(frame.x + rel.x, frame.y + rel.y),
            None => Point::new(frame.x + frame.width / 2.0, frame.y + frame.height / 2.0),
        }
    }

    fn route(
        &self,
        edge: &'g LayoutEdge,
        solved: &Solved,
        root_direction: Direction,
    ) -> Result<(EdgeSection, Vec<Rect>), LayoutError> {
        let (source, target) = self.index.endpoints(edge)?;
        let start = self.anchor(&edge.sources[0], source, solved);
        let end = self.anchor(&edge.targets[0], target, solved);
        let direction = self.placed_in.get(source).copied().unwrap_or(root_direction);
        let label_sizes: Vec<(f32, f32)> = edge
            .labels
            .iter()
            .map(|l| (l.width.unwrap_or(0.0), l.height.unwrap_or(0.0)))
            .collect();

        let (bend_points, labels) = if source == target {
            let frame = self.frames.get(source).copied().unwrap_or_default();
            let loops = self.self_loops.get(source).map(Vec::as_slice).unwrap_or(&[]);
            let index = loops.iter().position(|l| l.edge == &edge.id).unwrap_or(0);
            let stacked: Vec<(f32, f32)> = loops.iter().map(|l| l.label).collect();
            let bends =
                routing::self_loop_bends(&frame, direction, start, end, index, self.loop_spacing());
            let origin = if stacked.is_empty() {
                routing::route_midpoint(start, &bends, end)
            } else {
                routing::self_loop_label_origin(&frame, direction, &stacked, index, self.loop_spacing())
            };
            let labels = label_sizes
                .iter()
                .map(|&(width, height)| Rect {
                    x: origin.x,
                    y: origin.y,
                    width,
                    height,
                })
                .collect();
            (bends, labels)
        } else {
            let bends = routing::elbow_bends(start, end, direction);
            let mid = routing::route_midpoint(start, &bends, end);
            let labels = label_sizes
                .iter()
                .map(|&(width, height)| Rect {
                    x: mid.x - width / 2.0,
                    y: mid.y - height / 2.0,
                    width,
                    height,
                })
                .collect();
            (bends, labels)
        };

        Ok((
            EdgeSection {
                id: format!("{}_s0", edge.id),
                start_point: start,
                bend_points,
                end_point: end,
            },
            labels,
        ))
    }
}

fn dagre_rankdir(direction: Direction) -> &'static str {
    match direction {
        Direction::Vertical => "tb",
        Direction::Horizontal => "lr",
    }
}

/// Runs dagre over one container's children. `None` when dagre panics or
/// reports positions that are not finite.
fn run_dagre(
    boxes: &[(f32, f32)],
    links: &[(usize, usize, f32)],
    direction: Direction,
    node_spacing: f32,
    rank_spacing: f32,
) -> Option<Vec<Point>> {
    let ids: Vec<String> = (0..boxes.len()).map(|idx| format!("n{idx}")).collect();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> =
            DagreGraph::new(Some(GraphOption {
                directed: Some(true),
                multigraph: Some(false),
                compound: Some(false),
            }));

        let mut graph_config = DagreConfig::default();
        graph_config.rankdir = Some(dagre_rankdir(direction).to_string());
        graph_config.nodesep = Some(node_spacing);
        graph_config.edgesep = Some(node_spacing / 2.0);
        graph_config.ranksep = Some(rank_spacing);
        graph_config.marginx = Some(0.0);
        graph_config.marginy = Some(0.0);
        dagre_graph.set_graph(graph_config);

        for (id, &(width, height)) in ids.iter().zip(boxes) {
            let mut node = DagreNode::default();
            node.width = width;
            node.height = height;
            dagre_graph.set_node(id.clone(), Some(node));
        }
        for &(from, to, weight) in links {
            let mut edge_label = DagreEdge::default();
            edge_label.minlen = Some(1.0);
            edge_label.weight = Some(weight);
            let _ = dagre_graph.set_edge(&ids[from], &ids[to], Some(edge_label), None);
        }

        dagre_rust::layout::layout(&mut dagre_graph);

        ids.iter()
            .zip(boxes)
            .map(|(id, &(width, height))| {
                dagre_graph
                    .node(id)
                    .map(|n| Point::new(n.x - width / 2.0, n.y - height / 2.0))
            })
            .collect::<Option<Vec<Point>>>()
    }));

    match result {
        Ok(Some(corners)) if corners.iter().all(|p| p.x.is_finite() && p.y.is_finite()) => Some(corners),
        _ => None,
    }
}

fn apply(node: &mut LayoutNode, solved: &Solved) {
    if let Some(frame) = solved.frames.get(node.id.as_str()) {
        node.x = Some(frame.x);
        node.y = Some(frame.y);
        node.width = Some(frame.width);
        node.height = Some(frame.height);
    }
    for port in &mut node.ports {
        if let Some(point) = solved.ports.get(&port.id) {
            port.x = Some(point.x);
            port.y = Some(point.y);
        }
    }
    for edge in &mut node.edges {
        if let Some((section, labels)) = solved.edges.get(edge.id.as_str()) {
            edge.sections = vec![section.clone()];
            for (label, frame) in edge.labels.iter_mut().zip(labels) {
                label.x = Some(frame.x);
                label.y = Some(frame.y);
                label.width = Some(frame.width);
                label.height = Some(frame.height);
            }
        }
    }
    for label in &mut node.labels {
        label.x.get_or_insert(0.0);
        label.y.get_or_insert(0.0);
    }
    for child in &mut node.children {
        apply(child, solved);
    }
}
