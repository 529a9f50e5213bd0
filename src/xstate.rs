//! Conversion of serialized XState machine definitions into flows.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{LayoutError, Result};
use crate::ir::{
    ActionId, ConditionId, EventId, Flow, FlowItemMetadata, State, StateId, StateType,
    Transition,
};
use crate::parser::normalize_flow;

static STATE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[:.]").unwrap());
static DONE_INVOKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^done\.invoke\.(.*)$").unwrap());
static ERROR_PLATFORM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^error\.platform\.(.*)$").unwrap());

const SEND_ACTION: &str = "xstate.send";
const CANCEL_ACTION: &str = "xstate.cancel";

#[derive(Debug, Clone, Deserialize)]
pub struct StateNodeDefinition {
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub initial: Option<Value>,
    #[serde(default)]
    pub states: IndexMap<String, StateNodeDefinition>,
    #[serde(default)]
    pub transitions: Vec<TransitionDefinition>,
    #[serde(default)]
    pub entry: Vec<ActionObject>,
    #[serde(default)]
    pub exit: Vec<ActionObject>,
    #[serde(default)]
    pub invoke: Vec<InvokeDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub delay: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Guard {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDefinition {
    #[serde(default)]
    pub target: Option<Vec<TargetRef>>,
    #[serde(default)]
    pub actions: Vec<ActionObject>,
    #[serde(default)]
    pub cond: Option<Guard>,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub delay: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvokeDefinition {
    pub id: String,
}

pub fn to_state_id(raw: &str) -> StateId {
    StateId::new(STATE_ID_RE.replace_all(raw, "_"))
}

#[derive(Debug, Deserialize)]
struct SerializedMachine {
    definition: StateNodeDefinition,
}

/// Parses a serialized machine, either `{"definition": …}` or the bare
/// definition object.
pub fn machine_json_to_flow(input: &str) -> Result<Flow> {
    let definition = match serde_json::from_str::<SerializedMachine>(input) {
        Ok(machine) => machine.definition,
        Err(_) => serde_json::from_str::<StateNodeDefinition>(input)
            .map_err(|err| LayoutError::Parse(err.to_string()))?,
    };
    Ok(normalize_flow(machine_definition_to_flow(&definition)))
}

pub fn machine_definition_to_flow(definition: &StateNodeDefinition) -> Flow {
    let mut states = Vec::new();
    collect_states(None, definition, &mut states);
    let mut states = states.into_iter();
    let Some((root_id, root)) = states.next() else {
        return Flow::new(to_state_id(&definition.id).as_str());
    };

    let mut flow = Flow::new(root_id.as_str());
    flow.name = Some(root.name.clone());
    flow.entry_actions = root.entry_actions.clone();
    flow.exit_actions = root.exit_actions.clone();
    flow.transitions = root.transitions.clone();
    flow.initial_state = root.initial_state.clone();

    register_metadata(&mut flow, &root);
    for (state_id, mut state) in states {
        register_metadata(&mut flow, &state);
        if state.parent.as_ref() == Some(&root_id) {
            state.parent = None;
        }
        flow.states.insert(state_id, state);
    }
    flow
}

fn register_metadata(flow: &mut Flow, state: &State) {
    let actions = state
        .entry_actions
        .iter()
        .chain(state.exit_actions.iter())
        .chain(state.transitions.iter().flat_map(|t| t.actions.iter()));
    for action in actions {
        flow.metadata
            .actions
            .insert(action.clone(), FlowItemMetadata::named(action.as_str()));
    }
    for transition in &state.transitions {
        if let Some(condition) = &transition.condition {
            flow.metadata
                .conditions
                .insert(condition.clone(), FlowItemMetadata::named(condition.as_str()));
        }
        if let Some(event) = &transition.event {
            flow.metadata
                .events
                .insert(event.clone(), FlowItemMetadata::named(event.as_str()));
        }
    }
}

/// Pre-order walk: each node is emitted before its children.
fn collect_states(
    parent: Option<&StateId>,
    definition: &StateNodeDefinition,
    out: &mut Vec<(StateId, State)>,
) {
    let state_id = to_state_id(&definition.id);
    let initial_state = definition.initial.as_ref().and_then(|initial| match initial {
        Value::String(key) => Some(to_state_id(&format!("{}.{key}", definition.id))),
        Value::Number(key) => Some(to_state_id(&format!("{}.{key}", definition.id))),
        _ => None,
    });

    let state = State {
        name: definition.key.clone(),
        kind: state_type(definition.kind.as_deref()),
        parent: parent.cloned(),
        initial_state,
        entry_actions: definition
            .entry
            .iter()
            .filter(|action| action.kind != SEND_ACTION || action.delay.is_none())
            .map(|action| ActionId::new(action.kind.as_str()))
            .chain(definition.invoke.iter().map(|invoke| ActionId::new(invoke.id.as_str())))
            .collect(),
        exit_actions: definition
            .exit
            .iter()
            .filter(|action| action.kind != CANCEL_ACTION)
            .map(|action| ActionId::new(action.kind.as_str()))
            .collect(),
        assertions: Vec::new(),
        transitions: definition.transitions.iter().map(convert_transition).collect(),
        collateral: Vec::new(),
    };
    out.push((state_id.clone(), state));

    for child in definition.states.values() {
        collect_states(Some(&state_id), child, out);
    }
}

fn state_type(kind: Option<&str>) -> StateType {
    match kind {
        Some("compound") => StateType::Compound,
        Some("parallel") => StateType::Parallel,
        Some("final") => StateType::Final,
        Some("atomic") | None => StateType::Atomic,
        Some(other) => {
            tracing::debug!(kind = other, "unsupported state type, treating as atomic");
            StateType::Atomic
        }
    }
}

fn event_label(transition: &TransitionDefinition) -> String {
    match &transition.delay {
        Some(Value::Number(delay)) => return format!("After {delay}ms"),
        Some(Value::String(delay)) => return format!("After '{delay}'"),
        _ => {}
    }
    if let Some(caps) = DONE_INVOKE_RE.captures(&transition.event_type) {
        return format!("\"{}\" succeeded", &caps[1]);
    }
    if let Some(caps) = ERROR_PLATFORM_RE.captures(&transition.event_type) {
        return format!("\"{}\" failed", &caps[1]);
    }
    transition.event_type.clone()
}

fn convert_transition(transition: &TransitionDefinition) -> Transition {
    let event = event_label(transition);
    Transition {
        event: (!event.is_empty()).then(|| EventId::new(event)),
        target: transition
            .target
            .as_ref()
            .and_then(|targets| targets.first())
            .map(|target| to_state_id(&target.id)),
        condition: transition
            .cond
            .as_ref()
            .map(|guard| ConditionId::new(guard.name.clone().unwrap_or_else(|| guard.kind.clone()))),
        actions: transition
            .actions
            .iter()
            .map(|action| ActionId::new(action.kind.as_str()))
            .collect(),
        assertions: Vec::new(),
    }
}
