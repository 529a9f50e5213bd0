use std::sync::Arc;

use crate::ir::FlowId;
use crate::layout::PositionMap;

/// What the scheduler currently displays.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LayoutState {
    #[default]
    Uninitialized,
    Ready {
        layout: Arc<PositionMap>,
        layout_id: u64,
        flow_id: FlowId,
    },
}

impl LayoutState {
    pub fn layout_id(&self) -> Option<u64> {
        match self {
            Self::Uninitialized => None,
            Self::Ready { layout_id, .. } => Some(*layout_id),
        }
    }

    pub fn flow_id(&self) -> Option<&FlowId> {
        match self {
            Self::Uninitialized => None,
            Self::Ready { flow_id, .. } => Some(flow_id),
        }
    }

    /// Positions, but only when they belong to `flow_id`.
    pub fn positions_for(&self, flow_id: &FlowId) -> Option<&Arc<PositionMap>> {
        match self {
            Self::Ready {
                layout,
                flow_id: current,
                ..
            } if current == flow_id => Some(layout),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutAction {
    ReceivedLayout {
        flow_id: FlowId,
        layout_id: u64,
        layout: Arc<PositionMap>,
    },
    Reset,
}

/// Applies `action` for the flow currently of interest. A received layout
/// replaces the state only when it is for `current_flow` and newer than what
/// is stored; anything else leaves the state untouched.
pub fn reduce(state: LayoutState, action: LayoutAction, current_flow: &FlowId) -> LayoutState {
    match action {
        LayoutAction::Reset => LayoutState::Uninitialized,
        LayoutAction::ReceivedLayout {
            flow_id,
            layout_id,
            layout,
        } => {
            let newer = state.layout_id().is_none_or(|stored| layout_id > stored);
            if &flow_id == current_flow && newer {
                LayoutState::Ready {
                    layout,
                    layout_id,
                    flow_id,
                }
            } else {
                tracing::debug!(
                    flow = %flow_id,
                    layout_id,
                    stored = ?state.layout_id(),
                    "discarding stale layout"
                );
                state
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(flow: &str, layout_id: u64) -> LayoutAction {
        LayoutAction::ReceivedLayout {
            flow_id: FlowId::new(flow),
            layout_id,
            layout: Arc::new(PositionMap::new()),
        }
    }

    #[test]
    fn out_of_order_results_keep_the_newest() {
        let flow = FlowId::new("f");
        let state = [1, 3, 2]
            .into_iter()
            .fold(LayoutState::default(), |state, id| reduce(state, received("f", id), &flow));
        assert_eq!(state.layout_id(), Some(3));
    }

    #[test]
    fn foreign_flow_never_replaces_state() {
        let flow = FlowId::new("f");
        let state = reduce(LayoutState::default(), received("f", 1), &flow);
        let state = reduce(state, received("other", 99), &flow);
        assert_eq!(state.layout_id(), Some(1));
        assert_eq!(state.flow_id(), Some(&flow));

        let untouched = reduce(LayoutState::default(), received("other", 5), &flow);
        assert_eq!(untouched, LayoutState::Uninitialized);
    }

    #[test]
    fn reset_clears_and_accepts_layout_zero() {
        let flow = FlowId::new("f");
        let state = reduce(LayoutState::default(), received("f", 4), &flow);
        let state = reduce(state, LayoutAction::Reset, &flow);
        assert_eq!(state, LayoutState::Uninitialized);
        let state = reduce(state, received("f", 0), &flow);
        assert_eq!(state.layout_id(), Some(0));
    }

    #[test]
    fn equal_layout_id_is_stale() {
        let flow = FlowId::new("f");
        let state = reduce(LayoutState::default(), received("f", 2), &flow);
        let before = state.clone();
        let state = reduce(state, received("f", 2), &flow);
        assert_eq!(state, before);
        assert!(state.positions_for(&FlowId::new("g")).is_none());
    }
}
