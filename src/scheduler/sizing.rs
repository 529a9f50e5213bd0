//! Holds layout back until every element has reported its natural size.

use crate::flow_utils::{root_state_id, transition_count};
use crate::ir::Flow;
use crate::layout::{PositionedItemId, SizeMap};

/// Reports needed before layout may run: one per user state and transition,
/// plus one for the root once it has reported at all.
pub fn required_measurements(flow: &Flow, root_measured: bool) -> usize {
    flow.states.len() + transition_count(flow) + usize::from(root_measured)
}

/// Position id of the synthetic root `flow` is laid out under.
pub fn root_position_id(flow: &Flow) -> PositionedItemId {
    PositionedItemId::state(&root_state_id(flow))
}

/// True while the flow is still in its sizing pass and layout must wait.
pub fn is_sizing_render(flow: &Flow, sizes: &SizeMap) -> bool {
    let root_measured = sizes.contains_key(&root_position_id(flow));
    sizes.len() < required_measurements(flow, root_measured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{StateId, Transition};
    use crate::layout::Size;

    fn three_states_two_transitions() -> Flow {
        let mut flow = Flow::new("f");
        flow.ensure_state("a", None).transitions.push(Transition {
            target: Some(StateId::new("b")),
            ..Transition::default()
        });
        flow.ensure_state("b", None);
        flow.ensure_state("c", None);
        flow.transitions.push(Transition::default());
        flow
    }

    #[test]
    fn gate_opens_at_the_fifth_report() {
        let flow = three_states_two_transitions();
        let ids = ["state:a", "state:b", "state:c", "transition:a:0:b", "transition:flow:0:flow"];
        let mut sizes = SizeMap::new();
        for id in &ids[..4] {
            sizes.insert(PositionedItemId::from_raw(*id), Size::new(10.0, 10.0));
        }
        assert!(is_sizing_render(&flow, &sizes));
        sizes.insert(PositionedItemId::from_raw(ids[4]), Size::new(10.0, 10.0));
        assert!(!is_sizing_render(&flow, &sizes));
    }

    #[test]
    fn measured_root_raises_the_bar_by_itself() {
        let flow = three_states_two_transitions();
        assert_eq!(required_measurements(&flow, false), 5);
        assert_eq!(required_measurements(&flow, true), 6);

        let mut sizes = SizeMap::new();
        sizes.insert(root_position_id(&flow), Size::new(1.0, 1.0));
        for id in ["state:a", "state:b", "state:c", "transition:a:0:b"] {
            sizes.insert(PositionedItemId::from_raw(id), Size::new(10.0, 10.0));
        }
        assert!(is_sizing_render(&flow, &sizes));
    }

    #[test]
    fn root_report_follows_renamed_root() {
        let mut flow = three_states_two_transitions();
        flow.ensure_state("root", None);
        assert_eq!(root_position_id(&flow), PositionedItemId::from_raw("state:root_1"));

        let mut sizes = SizeMap::new();
        sizes.insert(PositionedItemId::from_raw("state:root"), Size::new(1.0, 1.0));
        for id in ["state:a", "state:b", "state:c", "transition:a:0:b", "transition:flow:0:flow"] {
            sizes.insert(PositionedItemId::from_raw(id), Size::new(10.0, 10.0));
        }
        assert!(!is_sizing_render(&flow, &sizes));
        sizes.remove(&PositionedItemId::from_raw("state:a"));
        sizes.insert(root_position_id(&flow), Size::new(1.0, 1.0));
        assert!(is_sizing_render(&flow, &sizes));
    }
}
