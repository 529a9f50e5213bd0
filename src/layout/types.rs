use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::StateId;

/// Port and node references starting with this prefix belong to a synthetic
/// transition node.
pub const SYNTHETIC_PREFIX: &str = "synth:";

/// Stable identity joining "what to lay out" with "where it ended up".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionedItemId(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionedItemKind {
    State,
    Transition,
    Connector,
    Other,
}

impl PositionedItemId {
    pub fn state(state: &StateId) -> Self {
        Self(format!("state:{state}"))
    }

    pub fn transition(source: &StateId, index: usize, target: Option<&StateId>) -> Self {
        let target = target.unwrap_or(source);
        Self(format!("transition:{source}:{index}:{target}"))
    }

    pub(crate) fn incoming_edge(transition: &PositionedItemId) -> Self {
        Self(format!("edge:in:{transition}"))
    }

    pub(crate) fn outgoing_edge(transition: &PositionedItemId) -> Self {
        Self(format!("edge:out:{transition}"))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> PositionedItemKind {
        if self.0.starts_with("state:") {
            PositionedItemKind::State
        } else if self.0.starts_with("transition:") {
            PositionedItemKind::Transition
        } else if self.0.starts_with("edge:") {
            PositionedItemKind::Connector
        } else {
            PositionedItemKind::Other
        }
    }

    /// State id for `state:` ids.
    pub fn state_id(&self) -> Option<StateId> {
        self.0.strip_prefix("state:").map(StateId::new)
    }
}

impl fmt::Display for PositionedItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn target_port_id(transition: &PositionedItemId) -> String {
    format!("port:{transition}")
}

pub(crate) fn source_port_id(transition: &PositionedItemId) -> String {
    format!("port:source:{transition}")
}

pub(crate) fn synthetic_target_port_id(transition: &PositionedItemId) -> String {
    format!("{SYNTHETIC_PREFIX}target:{transition}")
}

pub(crate) fn synthetic_source_port_id(transition: &PositionedItemId) -> String {
    format!("{SYNTHETIC_PREFIX}source:{transition}")
}

pub fn is_synthetic_ref(reference: &str) -> bool {
    reference.starts_with(SYNTHETIC_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Padding {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl Padding {
    pub fn uniform(value: f32) -> Self {
        Self {
            top: value,
            bottom: value,
            left: value,
            right: value,
        }
    }
}

/// Measured size of a rendered element. Padding reserves interior space for a
/// container's own header before children are packed inside it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<Padding>,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            padding: None,
        }
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = Some(padding);
        self
    }
}

pub type SizeMap = HashMap<PositionedItemId, Size>;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub transition_id: PositionedItemId,
    pub container: Option<StateId>,
    pub source_is_event: bool,
    pub target_is_event: bool,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionInfo {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<Connector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<Padding>,
}

impl PositionInfo {
    pub fn contains(&self, other: &PositionInfo) -> bool {
        const EPS: f32 = 0.01;
        other.x + EPS >= self.x
            && other.y + EPS >= self.y
            && other.x + other.width <= self.x + self.width + EPS
            && other.y + other.height <= self.y + self.height + EPS
    }
}

pub type PositionMap = HashMap<PositionedItemId, PositionInfo>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_id_defaults_target_to_source() {
        let s = StateId::new("s1");
        assert_eq!(
            PositionedItemId::transition(&s, 2, None).as_str(),
            "transition:s1:2:s1"
        );
        assert_eq!(
            PositionedItemId::transition(&s, 0, Some(&StateId::new("s2"))).as_str(),
            "transition:s1:0:s2"
        );
    }

    #[test]
    fn classifies_ids() {
        let t = PositionedItemId::transition(&StateId::new("a"), 0, None);
        assert_eq!(t.kind(), PositionedItemKind::Transition);
        assert_eq!(
            PositionedItemId::incoming_edge(&t).kind(),
            PositionedItemKind::Connector
        );
        let s = PositionedItemId::state(&StateId::new("a"));
        assert_eq!(s.kind(), PositionedItemKind::State);
        assert_eq!(s.state_id(), Some(StateId::new("a")));
        assert!(is_synthetic_ref(&synthetic_source_port_id(&t)));
        assert!(!is_synthetic_ref(&source_port_id(&t)));
    }
}
