use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Direction {
    Horizontal,
    #[default]
    Vertical,
}

impl Direction {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "horizontal" | "LR" | "RIGHT" => Some(Self::Horizontal),
            "vertical" | "TD" | "TB" | "DOWN" => Some(Self::Vertical),
            _ => None,
        }
    }
}

macro_rules! string_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub String);

            impl $name {
                pub fn new(id: impl Into<String>) -> Self {
                    Self(id.into())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(id: &str) -> Self {
                    Self(id.to_string())
                }
            }
        )*
    };
}

string_id!(FlowId, StateId, EventId, ConditionId, ActionId, AssertionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    #[default]
    Atomic,
    Compound,
    Parallel,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollateralType {
    #[serde(rename = "FIGMA_FRAME")]
    FigmaFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collateral {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CollateralType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figma_frame_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figma_file_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figma_file_key: Option<String>,
}

/// Display name plus attached collateral for an event, condition, action or assertion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowItemMetadata {
    pub name: String,
    #[serde(default)]
    pub collateral: Vec<Collateral>,
}

impl FlowItemMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collateral: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub events: BTreeMap<EventId, FlowItemMetadata>,
    #[serde(default)]
    pub conditions: BTreeMap<ConditionId, FlowItemMetadata>,
    #[serde(default)]
    pub actions: BTreeMap<ActionId, FlowItemMetadata>,
    #[serde(default)]
    pub assertions: BTreeMap<AssertionId, FlowItemMetadata>,
}

/// A transition owned by a state. No `event` means an "always" transition,
/// taken on entry as long as its condition holds. No `target` means self.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<StateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionId>,
    #[serde(default)]
    pub actions: Vec<ActionId>,
    #[serde(default)]
    pub assertions: Vec<AssertionId>,
}

impl Transition {
    pub fn is_always(&self) -> bool {
        self.event.is_none()
    }

    /// Target state, treating an absent target as the source.
    pub fn effective_target<'a>(&'a self, source: &'a StateId) -> &'a StateId {
        self.target.as_ref().unwrap_or(source)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: StateType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<StateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<StateId>,
    #[serde(default)]
    pub entry_actions: Vec<ActionId>,
    #[serde(default)]
    pub exit_actions: Vec<ActionId>,
    #[serde(default)]
    pub assertions: Vec<AssertionId>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub collateral: Vec<Collateral>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// The hierarchical statechart. `states` keeps declaration order, which is the
/// sibling order used for layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: FlowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub states: IndexMap<StateId, State>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub assertions: Vec<AssertionId>,
    #[serde(default)]
    pub entry_actions: Vec<ActionId>,
    #[serde(default)]
    pub exit_actions: Vec<ActionId>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<StateId>,
}

impl Flow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: FlowId::new(id),
            name: None,
            states: IndexMap::new(),
            metadata: Metadata::default(),
            assertions: Vec::new(),
            entry_actions: Vec::new(),
            exit_actions: Vec::new(),
            transitions: Vec::new(),
            initial_state: None,
        }
    }

    pub fn ensure_state(&mut self, id: &str, parent: Option<&str>) -> &mut State {
        let entry = self
            .states
            .entry(StateId::new(id))
            .or_insert_with(|| State::new(id));
        if let Some(parent) = parent {
            entry.parent = Some(StateId::new(parent));
        }
        entry
    }

    pub fn children_of<'a>(&'a self, parent: &'a StateId) -> impl Iterator<Item = &'a StateId> + 'a {
        self.states
            .iter()
            .filter(move |(_, state)| state.parent.as_ref() == Some(parent))
            .map(|(id, _)| id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowItemType {
    State,
    Event,
    Condition,
    Action,
    EntryAction,
    ExitAction,
    Assertion,
}

/// Typed reference to anything that can be selected in a flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "flowItemType", content = "flowItemId", rename_all = "kebab-case")]
pub enum FlowItemRef {
    State(StateId),
    Event(EventId),
    Condition(ConditionId),
    Action(ActionId),
    EntryAction(ActionId),
    ExitAction(ActionId),
    Assertion(AssertionId),
}

impl FlowItemRef {
    pub fn item_type(&self) -> FlowItemType {
        match self {
            Self::State(_) => FlowItemType::State,
            Self::Event(_) => FlowItemType::Event,
            Self::Condition(_) => FlowItemType::Condition,
            Self::Action(_) => FlowItemType::Action,
            Self::EntryAction(_) => FlowItemType::EntryAction,
            Self::ExitAction(_) => FlowItemType::ExitAction,
            Self::Assertion(_) => FlowItemType::Assertion,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::State(id) => id.as_str(),
            Self::Event(id) => id.as_str(),
            Self::Condition(id) => id.as_str(),
            Self::Action(id) | Self::EntryAction(id) | Self::ExitAction(id) => id.as_str(),
            Self::Assertion(id) => id.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowItem {
    #[serde(flatten)]
    pub item: FlowItemRef,
    pub flow_item_name: String,
}
