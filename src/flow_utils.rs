use crate::ir::{Flow, FlowItemRef, State, StateId, StateType, Transition};
use std::collections::HashSet;

/// Id of the synthetic root container every layout hangs off.
pub const ROOT_STATE_ID: &str = "root";
/// Id of the wrapper state holding the flow's own transitions and actions.
pub const FLOW_STATE_ID: &str = "flow";

/// Number of transitions in the flow, top-level ones included.
pub fn transition_count(flow: &Flow) -> usize {
    flow.transitions.len()
        + flow
            .states
            .values()
            .map(|state| state.transitions.len())
            .sum::<usize>()
}

/// A flow whose top-level transitions and actions live on a wrapper state, and
/// where every state has a parent chain ending at the synthetic root.
#[derive(Debug, Clone, PartialEq)]
pub struct FullFlow {
    pub root: StateId,
    pub flow_state: StateId,
    pub flow: Flow,
}

impl FullFlow {
    pub fn states(&self) -> &indexmap::IndexMap<StateId, State> {
        &self.flow.states
    }
}

/// `base`, or the first of `base_1`, `base_2`, ... that names neither a
/// state of `flow` nor `reserved`.
pub fn unused_state_id(flow: &Flow, base: &StateId, reserved: Option<&StateId>) -> StateId {
    let free = |id: &StateId| !flow.states.contains_key(id) && Some(id) != reserved;
    if free(base) {
        return base.clone();
    }
    (1..)
        .map(|n| StateId::new(format!("{base}_{n}")))
        .find(|id| free(id))
        .unwrap_or_else(|| base.clone())
}

/// Id the synthetic root gets when `flow` is materialized with the defaults.
pub fn root_state_id(flow: &Flow) -> StateId {
    unused_state_id(flow, &StateId::new(ROOT_STATE_ID), None)
}

/// Builds the fully materialized flow. A requested `root` or `flow_state` id
/// that a user state already uses is replaced by a fresh one, so the
/// synthetic states never shadow or adopt user states.
pub fn materialize(root: &StateId, flow_state: &StateId, flow: &Flow) -> FullFlow {
    let root = &unused_state_id(flow, root, None);
    let flow_state = &unused_state_id(flow, flow_state, Some(root));
    if root.as_str() != ROOT_STATE_ID || flow_state.as_str() != FLOW_STATE_ID {
        tracing::debug!(root = %root, flow_state = %flow_state, "synthetic state ids renamed to avoid user states");
    }

    let mut states = flow.states.clone();
    for (state_id, parent) in unresolved_parents(flow) {
        if let Some(parent) = parent {
            tracing::warn!(
                state = %state_id,
                parent = %parent,
                "state parent does not resolve to the flow root, attaching to top level"
            );
        }
        if let Some(state) = states.get_mut(&state_id) {
            state.parent = Some(flow_state.clone());
        }
    }

    states.insert(
        flow_state.clone(),
        State {
            name: flow.name.clone().unwrap_or_else(|| "Flow".to_string()),
            kind: StateType::Compound,
            parent: Some(root.clone()),
            initial_state: flow.initial_state.clone(),
            entry_actions: flow.entry_actions.clone(),
            exit_actions: flow.exit_actions.clone(),
            assertions: flow.assertions.clone(),
            transitions: flow.transitions.clone(),
            collateral: Vec::new(),
        },
    );

    FullFlow {
        root: root.clone(),
        flow_state: flow_state.clone(),
        flow: Flow {
            id: flow.id.clone(),
            name: flow.name.clone(),
            states,
            metadata: flow.metadata.clone(),
            assertions: Vec::new(),
            entry_actions: Vec::new(),
            exit_actions: Vec::new(),
            transitions: Vec::new(),
            initial_state: Some(flow_state.clone()),
        },
    }
}

pub fn materialize_default(flow: &Flow) -> FullFlow {
    materialize(
        &StateId::new(ROOT_STATE_ID),
        &StateId::new(FLOW_STATE_ID),
        flow,
    )
}

/// States whose parent link is absent, dangling, or part of a cycle, paired
/// with the parent they declared.
fn unresolved_parents(flow: &Flow) -> Vec<(StateId, Option<StateId>)> {
    let mut resolved: HashSet<&StateId> = HashSet::new();
    let mut cut: HashSet<&StateId> = HashSet::new();
    let mut out = Vec::new();

    for start in flow.states.keys() {
        let mut path: Vec<&StateId> = Vec::new();
        let mut current = start;
        loop {
            if resolved.contains(current) {
                break;
            }
            path.push(current);
            let parent = if cut.contains(current) {
                None
            } else {
                flow.states.get(current).and_then(|s| s.parent.as_ref())
            };
            match parent {
                None => {
                    if !cut.contains(current) {
                        out.push((current.clone(), None));
                        cut.insert(current);
                    }
                    break;
                }
                Some(parent) if !flow.states.contains_key(parent) || path.contains(&parent) => {
                    out.push((current.clone(), Some(parent.clone())));
                    cut.insert(current);
                    break;
                }
                Some(parent) => current = parent,
            }
        }
        resolved.extend(path);
    }

    out
}

/// Display name for a flow item. Missing metadata resolves to an empty name.
pub fn display_name<'a>(flow: &'a Flow, item: &FlowItemRef) -> &'a str {
    let name = match item {
        FlowItemRef::Action(id) | FlowItemRef::EntryAction(id) | FlowItemRef::ExitAction(id) => {
            flow.metadata.actions.get(id).map(|m| m.name.as_str())
        }
        FlowItemRef::Assertion(id) => flow.metadata.assertions.get(id).map(|m| m.name.as_str()),
        FlowItemRef::Condition(id) => flow.metadata.conditions.get(id).map(|m| m.name.as_str()),
        FlowItemRef::Event(id) => flow.metadata.events.get(id).map(|m| m.name.as_str()),
        FlowItemRef::State(id) => flow.states.get(id).map(|s| s.name.as_str()),
    };
    name.unwrap_or("")
}

/// Text shown for a transition: its event's name, the raw event id when the
/// event has no metadata, or "Always" for event-less transitions.
pub fn transition_label<'a>(flow: &'a Flow, transition: &'a Transition) -> &'a str {
    match &transition.event {
        Some(event) => flow
            .metadata
            .events
            .get(event)
            .map(|m| m.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(event.as_str()),
        None => "Always",
    }
}

fn same_item(a: &FlowItemRef, b: &FlowItemRef) -> bool {
    a.item_type() == b.item_type() && a.id() == b.id()
}

pub fn contains_flow_item(items: &[FlowItemRef], item: &FlowItemRef) -> bool {
    items.iter().any(|candidate| same_item(candidate, item))
}

/// Whether `id` is selected, either directly or (for states) through one of
/// its assertions, entry/exit actions, or transition events.
pub fn relevant_to_flow_items(flow: &Flow, items: &[FlowItemRef], id: &FlowItemRef) -> bool {
    if contains_flow_item(items, id) {
        return true;
    }

    let FlowItemRef::State(state_id) = id else {
        return false;
    };
    let Some(state) = flow.states.get(state_id) else {
        return false;
    };

    let related = state
        .assertions
        .iter()
        .cloned()
        .map(FlowItemRef::Assertion)
        .chain(
            state
                .entry_actions
                .iter()
                .chain(state.exit_actions.iter())
                .cloned()
                .map(FlowItemRef::Action),
        )
        .chain(
            state
                .transitions
                .iter()
                .filter_map(|t| t.event.clone())
                .map(FlowItemRef::Event),
        );

    related.into_iter().any(|item| contains_flow_item(items, &item))
}

/// Whether a transition is selected. The most specific attribute decides:
/// event, then condition, then the source/target pair, then assertions, then actions.
pub fn transition_relevant_to_flow_items(
    items: &[FlowItemRef],
    source: &StateId,
    transition: &Transition,
) -> bool {
    if let Some(event) = &transition.event {
        return contains_flow_item(items, &FlowItemRef::Event(event.clone()));
    }
    if let Some(condition) = &transition.condition {
        return contains_flow_item(items, &FlowItemRef::Condition(condition.clone()));
    }
    if let Some(target) = &transition.target {
        return contains_flow_item(items, &FlowItemRef::State(source.clone()))
            && contains_flow_item(items, &FlowItemRef::State(target.clone()));
    }
    if !transition.assertions.is_empty() {
        return transition
            .assertions
            .iter()
            .any(|a| contains_flow_item(items, &FlowItemRef::Assertion(a.clone())));
    }
    transition
        .actions
        .iter()
        .any(|a| contains_flow_item(items, &FlowItemRef::Action(a.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{EventId, FlowItemMetadata};

    fn nested_flow() -> Flow {
        let mut flow = Flow::new("f1");
        flow.ensure_state("a", None);
        flow.ensure_state("b", Some("a"));
        flow.ensure_state("c", Some("b"));
        flow.ensure_state("orphan", Some("missing"));
        flow.states[&StateId::new("a")].transitions.push(Transition {
            target: Some(StateId::new("c")),
            ..Transition::default()
        });
        flow.transitions.push(Transition::default());
        flow
    }

    #[test]
    fn counts_top_level_and_nested_transitions() {
        assert_eq!(transition_count(&nested_flow()), 2);
    }

    #[test]
    fn materialize_wraps_top_level_states() {
        let full = materialize_default(&nested_flow());
        let wrapper = &full.states()[&StateId::new(FLOW_STATE_ID)];
        assert_eq!(wrapper.parent, Some(StateId::new(ROOT_STATE_ID)));
        assert_eq!(wrapper.kind, StateType::Compound);
        assert_eq!(wrapper.transitions.len(), 1);
        assert!(full.flow.transitions.is_empty());
        assert_eq!(
            full.states()[&StateId::new("a")].parent,
            Some(StateId::new(FLOW_STATE_ID))
        );
        assert_eq!(
            full.states()[&StateId::new("c")].parent,
            Some(StateId::new("b"))
        );
    }

    #[test]
    fn dangling_parent_is_attached_to_wrapper() {
        let full = materialize_default(&nested_flow());
        assert_eq!(
            full.states()[&StateId::new("orphan")].parent,
            Some(StateId::new(FLOW_STATE_ID))
        );
    }

    #[test]
    fn user_state_named_root_keeps_its_place() {
        let mut flow = Flow::new("f");
        flow.ensure_state("root", None).transitions.push(Transition {
            target: Some(StateId::new("a")),
            ..Transition::default()
        });
        flow.ensure_state("a", None);
        let full = materialize_default(&flow);

        assert_eq!(full.root, StateId::new("root_1"));
        assert_eq!(root_state_id(&flow), full.root);
        assert_eq!(full.states()[&full.flow_state].parent, Some(full.root.clone()));
        assert_eq!(
            full.states()[&StateId::new("root")].parent,
            Some(StateId::new(FLOW_STATE_ID))
        );
        assert!(!full.states().contains_key(&full.root));
    }

    #[test]
    fn user_state_named_flow_is_not_overwritten() {
        let mut flow = Flow::new("f");
        flow.ensure_state("flow", None).transitions.push(Transition::default());
        flow.ensure_state("flow_1", None);
        let full = materialize_default(&flow);

        assert_eq!(full.flow_state, StateId::new("flow_2"));
        assert_eq!(full.states().len(), 3);
        let user = &full.states()[&StateId::new("flow")];
        assert_eq!(user.transitions.len(), 1);
        assert_eq!(user.parent, Some(full.flow_state.clone()));
    }

    #[test]
    fn parent_cycle_is_broken() {
        let mut flow = Flow::new("cyclic");
        flow.ensure_state("x", Some("y"));
        flow.ensure_state("y", Some("x"));
        let full = materialize_default(&flow);
        let attached = ["x", "y"]
            .iter()
            .filter(|id| {
                full.states()[&StateId::new(**id)].parent == Some(StateId::new(FLOW_STATE_ID))
            })
            .count();
        assert_eq!(attached, 1);
    }

    #[test]
    fn missing_metadata_has_empty_name() {
        let flow = nested_flow();
        assert_eq!(
            display_name(&flow, &FlowItemRef::Event(EventId::new("nope"))),
            ""
        );
    }

    #[test]
    fn transition_label_prefers_metadata_name() {
        let mut flow = nested_flow();
        flow.metadata
            .events
            .insert(EventId::new("go"), FlowItemMetadata::named("Go!"));
        let named = Transition {
            event: Some(EventId::new("go")),
            ..Transition::default()
        };
        let raw = Transition {
            event: Some(EventId::new("raw")),
            ..Transition::default()
        };
        assert_eq!(transition_label(&flow, &named), "Go!");
        assert_eq!(transition_label(&flow, &raw), "raw");
        assert_eq!(transition_label(&flow, &Transition::default()), "Always");
    }

    #[test]
    fn state_is_relevant_through_its_transition_events() {
        let mut flow = nested_flow();
        flow.states[&StateId::new("b")].transitions.push(Transition {
            event: Some(EventId::new("tick")),
            ..Transition::default()
        });
        let selected = vec![FlowItemRef::Event(EventId::new("tick"))];
        assert!(relevant_to_flow_items(
            &flow,
            &selected,
            &FlowItemRef::State(StateId::new("b"))
        ));
        assert!(!relevant_to_flow_items(
            &flow,
            &selected,
            &FlowItemRef::State(StateId::new("c"))
        ));
    }

    #[test]
    fn targeted_transition_needs_both_endpoints_selected() {
        let transition = Transition {
            target: Some(StateId::new("c")),
            ..Transition::default()
        };
        let source = StateId::new("a");
        let only_source = vec![FlowItemRef::State(source.clone())];
        let both = vec![
            FlowItemRef::State(source.clone()),
            FlowItemRef::State(StateId::new("c")),
        ];
        assert!(!transition_relevant_to_flow_items(&only_source, &source, &transition));
        assert!(transition_relevant_to_flow_items(&both, &source, &transition));
    }
}
