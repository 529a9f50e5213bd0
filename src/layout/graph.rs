//! Request/response tree exchanged with a layered-graph solver.
//!
//! Field names follow the ELK JSON graph format so a request can be handed to
//! an ELK instance unchanged; the same shape comes back with `x`/`y` filled in
//! on nodes and ports, `sections` on edges, and solved label frames.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{Point, PositionedItemId};
use crate::ir::StateId;

pub type LayoutOptions = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutLabel {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layout_options: LayoutOptions,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPort {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layout_options: LayoutOptions,
}

impl LayoutPort {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSection {
    #[serde(default)]
    pub id: String,
    pub start_point: Point,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bend_points: Vec<Point>,
    pub end_point: Point,
}

impl EdgeSection {
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        std::iter::once(self.start_point)
            .chain(self.bend_points.iter().copied())
            .chain(std::iter::once(self.end_point))
    }
}

/// Bookkeeping the builder attaches to each edge. ELK passes unknown fields
/// through untouched, so it survives a round trip through an external solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    pub transition_id: PositionedItemId,
    pub source: StateId,
    pub target: StateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<StateId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEdge {
    pub id: PositionedItemId,
    pub sources: Vec<String>,
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LayoutLabel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<EdgeSection>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layout_options: LayoutOptions,
    pub data: EdgeData,
}

impl LayoutEdge {
    pub fn is_self_loop(&self) -> bool {
        self.data.source == self.data.target
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutNode {
    pub id: PositionedItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LayoutNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<LayoutPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<LayoutEdge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LayoutLabel>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layout_options: LayoutOptions,
}

impl LayoutNode {
    pub fn new(id: PositionedItemId) -> Self {
        Self {
            id,
            x: None,
            y: None,
            width: None,
            height: None,
            children: Vec::new(),
            ports: Vec::new(),
            edges: Vec::new(),
            labels: Vec::new(),
            layout_options: LayoutOptions::new(),
        }
    }

    /// Depth-first search for a node by id, `self` included.
    pub fn find(&self, id: &PositionedItemId) -> Option<&LayoutNode> {
        if &self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Id of the node whose edge list holds `edge_id`.
    pub fn edge_container(&self, edge_id: &PositionedItemId) -> Option<&PositionedItemId> {
        if self.edges.iter().any(|edge| &edge.id == edge_id) {
            return Some(&self.id);
        }
        self.children
            .iter()
            .find_map(|child| child.edge_container(edge_id))
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(LayoutNode::node_count).sum::<usize>()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len() + self.children.iter().map(LayoutNode::edge_count).sum::<usize>()
    }
}
