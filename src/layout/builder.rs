//! Turns a materialized flow into a nested layered-graph request.
//!
//! The walk is post-order over the state tree. Every state returns its built
//! node, the transitions it could not place yet, and its descendant set. A
//! parent attaches a child's pending transition to that child once both
//! endpoints fall inside the child's descendant set, so each edge lands on the
//! lowest container holding both of its endpoints.

use std::collections::{HashMap, HashSet};

use super::graph::{EdgeData, LayoutEdge, LayoutLabel, LayoutNode, LayoutOptions, LayoutPort};
use super::options::{
    self, CENTER_LABEL_STRATEGY, EDGE_LABELS_INLINE, EDGE_LABELS_PLACEMENT, PADDING,
    PORT_BORDER_OFFSET, PRIORITY_DIRECTION,
};
use super::types::{
    PositionedItemId, SizeMap, source_port_id, synthetic_source_port_id,
    synthetic_target_port_id, target_port_id,
};
use crate::config::LayoutConfig;
use crate::flow_utils::{FullFlow, transition_label};
use crate::ir::{Direction, Flow, State, StateId, Transition};

/// Builds the solver request for `flow`, rooted at `flow.root`.
pub fn build_graph(
    sizes: &SizeMap,
    flow: &FullFlow,
    direction: Direction,
    config: &LayoutConfig,
) -> LayoutNode {
    let builder = GraphBuilder::new(sizes, flow, direction, config);
    let mut visited = HashSet::from([flow.root.clone()]);
    let built = builder.build(&flow.root, &mut visited);
    let mut root = built.node;
    // Whatever is still pending at the top belongs to the root itself.
    attach(&mut root, &flow.root, built.pending);
    root
}

/// A transition's edges plus its routing node, kept together until the
/// container that owns them is known.
struct PendingTransition {
    source: StateId,
    target: StateId,
    edges: Vec<LayoutEdge>,
    synthetic: Option<LayoutNode>,
}

struct Built {
    node: LayoutNode,
    pending: Vec<PendingTransition>,
    descendants: HashSet<StateId>,
}

struct GraphBuilder<'a> {
    sizes: &'a SizeMap,
    flow: &'a Flow,
    root: &'a StateId,
    children: HashMap<&'a StateId, Vec<&'a StateId>>,
    edges_by_target: HashMap<StateId, Vec<PositionedItemId>>,
    root_options: LayoutOptions,
    node_options: LayoutOptions,
    prioritize_initial_edges: bool,
}

impl<'a> GraphBuilder<'a> {
    fn new(
        sizes: &'a SizeMap,
        full: &'a FullFlow,
        direction: Direction,
        config: &LayoutConfig,
    ) -> Self {
        let flow = &full.flow;
        let mut children: HashMap<&StateId, Vec<&StateId>> = HashMap::new();
        for (id, state) in &flow.states {
            if let Some(parent) = &state.parent {
                children.entry(parent).or_default().push(id);
            }
        }

        Self {
            sizes,
            flow,
            root: &full.root,
            children,
            edges_by_target: edges_by_target(flow),
            root_options: options::root_profile(direction, config),
            node_options: options::node_profile(direction, config),
            prioritize_initial_edges: config.prioritize_initial_edges,
        }
    }

    fn profile(&self, state_id: &StateId) -> &LayoutOptions {
        if state_id == self.root {
            &self.root_options
        } else {
            &self.node_options
        }
    }

    fn build(&self, state_id: &StateId, visited: &mut HashSet<StateId>) -> Built {
        let position_id = PositionedItemId::state(state_id);
        let state = self.flow.states.get(state_id);
        let own = state
            .map(|state| self.transitions_from_state(state_id, state))
            .unwrap_or_default();
        let target_ports = self
            .edges_by_target
            .get(state_id)
            .into_iter()
            .flatten()
            .map(|tid| LayoutPort::new(target_port_id(tid)));

        let mut node = LayoutNode::new(position_id.clone());
        let size = self.sizes.get(&position_id);
        if let Some(size) = size {
            node.width = Some(size.width);
            node.height = Some(size.height);
        }
        node.layout_options = self.profile(state_id).clone();

        let child_ids = self.children.get(state_id).map(Vec::as_slice).unwrap_or(&[]);
        if child_ids.is_empty() {
            node.ports = target_ports
                .chain(own.iter().map(|pending| LayoutPort::new(source_ref(pending))))
                .collect();
            if let Some(state) = state {
                node.labels.push(LayoutLabel {
                    text: state.name.clone(),
                    ..LayoutLabel::default()
                });
            }
            return Built {
                node,
                pending: own,
                descendants: HashSet::new(),
            };
        }

        let mut descendants = HashSet::from([state_id.clone()]);
        let mut pending = Vec::new();
        let mut children = Vec::with_capacity(child_ids.len());
        for child_id in child_ids {
            if !visited.insert((*child_id).clone()) {
                tracing::warn!(state = %child_id, parent = %state_id, "state reached twice, parent links form a cycle");
                continue;
            }
            let built = self.build(child_id, visited);
            let (local, other): (Vec<_>, Vec<_>) = built.pending.into_iter().partition(|t| {
                let own_self_loop = t.source == t.target && &t.source == *child_id;
                built.descendants.contains(&t.source)
                    && built.descendants.contains(&t.target)
                    && !own_self_loop
            });
            let mut child = built.node;
            attach(&mut child, child_id, local);
            descendants.extend(built.descendants);
            descendants.insert((*child_id).clone());
            pending.extend(other);
            children.push(child);
        }

        if let Some(initial) = state.and_then(|s| s.initial_state.as_ref()) {
            let initial = PositionedItemId::state(initial);
            children.sort_by_key(|child| child.id != initial);
        }
        node.children = children;

        let padding = size.and_then(|size| size.padding);
        let border_offset = padding
            .filter(|padding| padding.top != 0.0)
            .map(|padding| options::format_number(-padding.top + padding.left));
        let source_ports = own.iter().map(|transition| {
            let mut port = LayoutPort::new(source_ref(transition));
            let interior =
                descendants.contains(&transition.target) && &transition.target != state_id;
            if let (true, Some(offset)) = (interior, &border_offset) {
                port.layout_options
                    .insert(PORT_BORDER_OFFSET.into(), offset.clone());
            }
            port
        });
        node.ports = target_ports.chain(source_ports).collect();

        if let Some(padding) = padding {
            node.layout_options
                .insert(PADDING.into(), options::format_padding(&padding));
        }

        pending.splice(0..0, own);
        Built {
            node,
            pending,
            descendants,
        }
    }

    fn transitions_from_state(&self, state_id: &StateId, state: &State) -> Vec<PendingTransition> {
        let from_initial = state
            .parent
            .as_ref()
            .and_then(|parent| self.flow.states.get(parent))
            .and_then(|parent| parent.initial_state.as_ref())
            == Some(state_id);

        let mut edge_options = LayoutOptions::new();
        if self.prioritize_initial_edges {
            let priority = if from_initial { "1" } else { "0" };
            edge_options.insert(PRIORITY_DIRECTION.into(), priority.into());
        }

        state
            .transitions
            .iter()
            .enumerate()
            .map(|(idx, transition)| {
                let tid = PositionedItemId::transition(state_id, idx, transition.target.as_ref());
                let target = resolve_target(self.flow, state_id, transition).clone();
                let data = EdgeData {
                    transition_id: tid.clone(),
                    source: state_id.clone(),
                    target: target.clone(),
                    container: None,
                };

                if &target == state_id {
                    let size = self.sizes.get(&tid);
                    let mut label_options = LayoutOptions::new();
                    label_options.insert(EDGE_LABELS_INLINE.into(), "false".into());
                    label_options.insert(EDGE_LABELS_PLACEMENT.into(), "CENTER".into());
                    label_options.insert(CENTER_LABEL_STRATEGY.into(), "TAIL_LAYER".into());
                    let edge = LayoutEdge {
                        id: tid.clone(),
                        sources: vec![source_port_id(&tid)],
                        targets: vec![target_port_id(&tid)],
                        labels: vec![LayoutLabel {
                            text: transition_label(self.flow, transition).to_string(),
                            width: size.map(|s| s.width),
                            height: size.map(|s| s.height),
                            layout_options: label_options,
                            ..LayoutLabel::default()
                        }],
                        sections: Vec::new(),
                        layout_options: edge_options.clone(),
                        data,
                    };
                    return PendingTransition {
                        source: state_id.clone(),
                        target,
                        edges: vec![edge],
                        synthetic: None,
                    };
                }

                let incoming = LayoutEdge {
                    id: PositionedItemId::incoming_edge(&tid),
                    sources: vec![source_port_id(&tid)],
                    targets: vec![synthetic_target_port_id(&tid)],
                    labels: vec![routing_label()],
                    sections: Vec::new(),
                    layout_options: edge_options.clone(),
                    data: data.clone(),
                };
                let outgoing = LayoutEdge {
                    id: PositionedItemId::outgoing_edge(&tid),
                    sources: vec![synthetic_source_port_id(&tid)],
                    targets: vec![target_port_id(&tid)],
                    labels: vec![routing_label()],
                    sections: Vec::new(),
                    layout_options: edge_options.clone(),
                    data,
                };

                let mut synthetic = LayoutNode::new(tid.clone());
                if let Some(size) = self.sizes.get(&tid) {
                    synthetic.width = Some(size.width);
                    synthetic.height = Some(size.height);
                }
                synthetic.layout_options = self.node_options.clone();
                synthetic.ports = vec![
                    LayoutPort::new(synthetic_target_port_id(&tid)),
                    LayoutPort::new(synthetic_source_port_id(&tid)),
                ];

                PendingTransition {
                    source: state_id.clone(),
                    target,
                    edges: vec![incoming, outgoing],
                    synthetic: Some(synthetic),
                }
            })
            .collect()
    }
}

fn routing_label() -> LayoutLabel {
    LayoutLabel {
        text: " ".to_string(),
        width: Some(0.0),
        height: Some(0.0),
        ..LayoutLabel::default()
    }
}

/// Port the transition leaves its source through.
fn source_ref(transition: &PendingTransition) -> String {
    transition
        .edges
        .first()
        .and_then(|edge| edge.sources.first())
        .cloned()
        .unwrap_or_default()
}

fn attach(node: &mut LayoutNode, container: &StateId, transitions: Vec<PendingTransition>) {
    for transition in transitions {
        node.edges.extend(transition.edges.into_iter().map(|mut edge| {
            edge.data.container = Some(container.clone());
            edge
        }));
        if let Some(synthetic) = transition.synthetic {
            node.children.push(synthetic);
        }
    }
}

/// Targets that name no state are drawn as self-loops of their source.
fn resolve_target<'a>(flow: &Flow, source: &'a StateId, transition: &'a Transition) -> &'a StateId {
    match &transition.target {
        Some(target) if flow.states.contains_key(target) => target,
        _ => source,
    }
}

fn edges_by_target(flow: &Flow) -> HashMap<StateId, Vec<PositionedItemId>> {
    let mut map: HashMap<StateId, Vec<PositionedItemId>> = HashMap::new();
    for (source, state) in &flow.states {
        for (idx, transition) in state.transitions.iter().enumerate() {
            if let Some(target) = &transition.target {
                if !flow.states.contains_key(target) {
                    tracing::warn!(
                        source = %source,
                        target = %target,
                        "transition targets an unknown state, drawing it as a self-loop"
                    );
                }
            }
            let tid = PositionedItemId::transition(source, idx, transition.target.as_ref());
            map.entry(resolve_target(flow, source, transition).clone())
                .or_default()
                .push(tid);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow_utils::materialize_default;
    use crate::ir::EventId;
    use crate::layout::types::{Padding, Size};

    fn go(target: &str) -> Transition {
        Transition {
            event: Some(EventId::new("go")),
            target: Some(StateId::new(target)),
            ..Transition::default()
        }
    }

    fn build(flow: &Flow, sizes: &SizeMap) -> LayoutNode {
        let full = materialize_default(flow);
        build_graph(sizes, &full, Direction::Vertical, &LayoutConfig::default())
    }

    fn id(raw: &str) -> PositionedItemId {
        PositionedItemId::from_raw(raw)
    }

    #[test]
    fn cyclic_parent_links_terminate() {
        let mut flow = Flow::new("f");
        flow.ensure_state("top", Some("wrap")).transitions.push(go("wrap"));
        flow.ensure_state("wrap", Some("top"));
        let full = FullFlow {
            root: StateId::new("top"),
            flow_state: StateId::new("wrap"),
            flow,
        };
        let graph = build_graph(&SizeMap::new(), &full, Direction::Vertical, &LayoutConfig::default());
        assert_eq!(graph.id, id("state:top"));
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn user_state_named_root_is_laid_out_once() {
        let mut flow = Flow::new("f");
        flow.ensure_state("root", None).transitions.push(go("a"));
        flow.ensure_state("a", None);
        let graph = build(&flow, &SizeMap::new());

        assert_eq!(graph.id, id("state:root_1"));
        let wrapper = graph.find(&id("state:flow")).unwrap();
        let children: Vec<_> = wrapper.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(children, ["state:root", "state:a", "transition:root:0:a"]);
        assert_eq!(graph.edge_container(&id("edge:in:transition:root:0:a")), Some(&id("state:flow")));
    }

    #[test]
    fn self_loop_emits_single_edge_without_routing_node() {
        let mut flow = Flow::new("f");
        flow.ensure_state("a", None).transitions.push(Transition::default());
        let graph = build(&flow, &SizeMap::new());

        assert_eq!(graph.edge_count(), 1);
        let tid = id("transition:a:0:a");
        let container = graph.edge_container(&tid).cloned();
        assert_eq!(container, Some(id("state:flow")));
        assert!(graph.find(&tid).is_none());
        let owner = graph.find(&id("state:flow")).unwrap();
        let edge = &owner.edges[0];
        assert_eq!(edge.labels[0].text, "Always");
        assert_eq!(
            edge.labels[0].layout_options.get(EDGE_LABELS_INLINE).map(String::as_str),
            Some("false")
        );
        let leaf = graph.find(&id("state:a")).unwrap();
        let ports: Vec<_> = leaf.ports.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ports,
            ["port:transition:a:0:a", "port:source:transition:a:0:a"]
        );
    }

    #[test]
    fn edge_between_cousins_lands_on_common_ancestor() {
        let mut flow = Flow::new("f");
        flow.ensure_state("A", None);
        flow.ensure_state("B", Some("A"));
        flow.ensure_state("C", Some("B")).transitions.push(go("E"));
        flow.ensure_state("D", Some("A"));
        flow.ensure_state("E", Some("D"));
        let graph = build(&flow, &SizeMap::new());

        for edge in ["edge:in:transition:C:0:E", "edge:out:transition:C:0:E"] {
            assert_eq!(graph.edge_container(&id(edge)), Some(&id("state:A")));
        }
        let a = graph.find(&id("state:A")).unwrap();
        assert!(a.children.iter().any(|c| c.id == id("transition:C:0:E")));
        assert!(a.edges.iter().all(|e| e.data.container == Some(StateId::new("A"))));
    }

    #[test]
    fn container_self_loop_attaches_to_parent() {
        let mut flow = Flow::new("f");
        flow.ensure_state("p", None).transitions.push(go("p"));
        flow.ensure_state("c", Some("p"));
        let graph = build(&flow, &SizeMap::new());
        assert_eq!(
            graph.edge_container(&id("transition:p:0:p")),
            Some(&id("state:flow"))
        );
    }

    #[test]
    fn initial_state_leads_siblings() {
        let mut flow = Flow::new("f");
        flow.ensure_state("p", None).initial_state = Some(StateId::new("c3"));
        flow.ensure_state("c1", Some("p"));
        flow.ensure_state("c2", Some("p"));
        flow.ensure_state("c3", Some("p"));
        let graph = build(&flow, &SizeMap::new());
        let p = graph.find(&id("state:p")).unwrap();
        let order: Vec<_> = p.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, ["state:c3", "state:c1", "state:c2"]);
    }

    #[test]
    fn padded_container_offsets_interior_ports() {
        let mut flow = Flow::new("f");
        flow.ensure_state("p", None).transitions.push(go("c"));
        flow.ensure_state("c", Some("p"));
        let mut sizes = SizeMap::new();
        sizes.insert(
            id("state:p"),
            Size::new(200.0, 100.0).with_padding(Padding {
                top: 40.0,
                bottom: 8.0,
                left: 8.0,
                right: 8.0,
            }),
        );
        let graph = build(&flow, &sizes);
        let p = graph.find(&id("state:p")).unwrap();
        assert_eq!(
            p.layout_options.get(PADDING).map(String::as_str),
            Some("[top=40, bottom=8, left=8, right=8]")
        );
        let port = p
            .ports
            .iter()
            .find(|port| port.id == "port:source:transition:p:0:c")
            .unwrap();
        assert_eq!(
            port.layout_options.get(PORT_BORDER_OFFSET).map(String::as_str),
            Some("-32")
        );
        assert_eq!(graph.edge_container(&id("edge:in:transition:p:0:c")), Some(&id("state:p")));
    }

    #[test]
    fn edges_from_initial_state_get_priority() {
        let mut flow = Flow::new("f");
        flow.initial_state = Some(StateId::new("a"));
        flow.ensure_state("a", None).transitions.push(go("b"));
        flow.ensure_state("b", None).transitions.push(go("a"));
        let graph = build(&flow, &SizeMap::new());
        let flow_node = graph.find(&id("state:flow")).unwrap();
        let priority = |edge_id: &str| {
            flow_node
                .edges
                .iter()
                .find(|e| e.id.as_str() == edge_id)
                .and_then(|e| e.layout_options.get(PRIORITY_DIRECTION))
                .cloned()
        };
        assert_eq!(priority("edge:in:transition:a:0:b").as_deref(), Some("1"));
        assert_eq!(priority("edge:in:transition:b:0:a").as_deref(), Some("0"));

        let config = LayoutConfig {
            prioritize_initial_edges: false,
            ..LayoutConfig::default()
        };
        let plain = build_graph(
            &SizeMap::new(),
            &materialize_default(&flow),
            Direction::Vertical,
            &config,
        );
        let flow_node = plain.find(&id("state:flow")).unwrap();
        assert!(flow_node
            .edges
            .iter()
            .all(|e| !e.layout_options.contains_key(PRIORITY_DIRECTION)));
    }

    #[test]
    fn unknown_target_becomes_self_loop() {
        let mut flow = Flow::new("f");
        flow.ensure_state("a", None).transitions.push(go("ghost"));
        let graph = build(&flow, &SizeMap::new());
        let tid = id("transition:a:0:ghost");
        assert!(graph.edge_container(&tid).is_some());
        assert!(graph.find(&tid).is_none());
        let leaf = graph.find(&id("state:a")).unwrap();
        assert!(leaf.ports.iter().any(|p| p.id == "port:transition:a:0:ghost"));
    }

    #[test]
    fn root_uses_hierarchy_profile() {
        let flow = Flow::new("empty");
        let graph = build(&flow, &SizeMap::new());
        assert_eq!(graph.id, id("state:root"));
        assert_eq!(
            graph.layout_options.get(options::HIERARCHY_HANDLING).map(String::as_str),
            Some("INCLUDE_CHILDREN")
        );
        let wrapper = &graph.children[0];
        assert_eq!(wrapper.id, id("state:flow"));
        assert!(wrapper.layout_options.get(options::HIERARCHY_HANDLING).is_none());
        assert_eq!(wrapper.labels[0].text, "Flow");
    }
}
