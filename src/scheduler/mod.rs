//! Decides when the layout pipeline runs and which of its results are shown.
//!
//! Size reports accumulate in the scheduler. Once every element of the
//! current flow has reported, changes trigger a debounced run: build the
//! request, solve it on a spawned task, and publish the flattened positions
//! if no newer run for the same flow has been accepted in the meantime.

pub mod debounce;
pub mod probe;
pub mod sizing;
pub mod state;

pub use debounce::{DebounceWindow, DebounceWithLimit, IdempotentDebounce};
pub use probe::SizeProbe;
pub use sizing::{is_sizing_render, required_measurements, root_position_id};
pub use state::{LayoutAction, LayoutState, reduce};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::{LayoutConfig, SchedulerConfig};
use crate::flow_utils::materialize_default;
use crate::ir::{Flow, FlowId};
use crate::layout::{
    LayoutNode, LayoutSolver, PositionMap, PositionedItemId, Size, SizeMap, build_graph, flatten,
};
use probe::SizeSink;

/// An accepted layout, tagged so consumers can tell which flow it is for.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSnapshot {
    pub flow_id: FlowId,
    pub layout_id: u64,
    pub positions: Arc<PositionMap>,
}

struct Session {
    flow: Option<Arc<Flow>>,
    sizes: SizeMap,
    state: LayoutState,
}

struct Shared {
    solver: Arc<dyn LayoutSolver>,
    layout: LayoutConfig,
    probe_trailing: Duration,
    next_layout_id: AtomicU64,
    disposed: AtomicBool,
    session: Mutex<Session>,
    trigger: DebounceWithLimit,
    snapshots: watch::Sender<Option<LayoutSnapshot>>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct LayoutScheduler {
    shared: Arc<Shared>,
}

impl LayoutScheduler {
    pub fn new(solver: Arc<dyn LayoutSolver>, layout: LayoutConfig, scheduler: SchedulerConfig) -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                solver,
                layout,
                probe_trailing: Duration::from_millis(scheduler.probe_trailing_ms),
                next_layout_id: AtomicU64::new(1),
                disposed: AtomicBool::new(false),
                session: Mutex::new(Session {
                    flow: None,
                    sizes: SizeMap::new(),
                    state: LayoutState::Uninitialized,
                }),
                trigger: DebounceWithLimit::new(
                    Duration::from_millis(scheduler.debounce_ms),
                    Duration::from_millis(scheduler.max_wait_ms),
                ),
                snapshots,
            }),
        }
    }

    /// Switches to `flow`. A different flow id starts over with no layout and
    /// no sizes; the same id with new content keeps sizes and re-lays out.
    pub fn set_flow(&self, flow: Flow) {
        if self.is_disposed() {
            return;
        }
        let mut session = self.shared.session();
        let same_identity = session.flow.as_ref().is_some_and(|current| current.id == flow.id);
        if same_identity {
            if session.flow.as_deref() == Some(&flow) {
                return;
            }
            session.flow = Some(Arc::new(flow));
            drop(session);
            tracing::debug!("flow content changed, scheduling layout");
            self.schedule();
            return;
        }

        tracing::debug!(flow = %flow.id, "flow identity changed, resetting layout");
        self.shared.trigger.cancel();
        session.state = reduce(std::mem::take(&mut session.state), LayoutAction::Reset, &flow.id);
        session.sizes.clear();
        session.flow = Some(Arc::new(flow));
        drop(session);
        self.shared.snapshots.send_replace(None);
    }

    pub fn flow_id(&self) -> Option<FlowId> {
        self.shared.session().flow.as_ref().map(|flow| flow.id.clone())
    }

    /// Records a measured size and schedules a run if it differs from the
    /// previous report for `id`.
    pub fn report_size(&self, id: PositionedItemId, size: Size) {
        if self.is_disposed() {
            return;
        }
        let changed = {
            let mut session = self.shared.session();
            session.sizes.insert(id, size) != Some(size)
        };
        if changed {
            self.schedule();
        }
    }

    pub fn probe(&self, id: PositionedItemId) -> SizeProbe {
        let shared = Arc::downgrade(&self.shared);
        let sink: SizeSink = Arc::new(move |id: &PositionedItemId, size: Size| {
            if let Some(shared) = shared.upgrade() {
                LayoutScheduler { shared }.report_size(id.clone(), size);
            }
        });
        SizeProbe::new(id, sink, self.shared.probe_trailing)
    }

    pub fn measured_count(&self) -> usize {
        self.shared.session().sizes.len()
    }

    pub fn sizes(&self) -> SizeMap {
        self.shared.session().sizes.clone()
    }

    pub fn state(&self) -> LayoutState {
        self.shared.session().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LayoutSnapshot>> {
        self.shared.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> Option<LayoutSnapshot> {
        self.shared.snapshots.borrow().clone()
    }

    /// Runs the pipeline right away instead of waiting for the debounce.
    /// Returns whether a run was started.
    pub fn layout_now(&self) -> bool {
        self.shared.trigger.cancel();
        match self.flow_id() {
            Some(flow_id) => start_run(&self.shared, &flow_id),
            None => false,
        }
    }

    /// Stops all timers. Results still in flight are dropped when they land.
    pub fn dispose(&self) {
        self.shared.disposed.store(true, Ordering::SeqCst);
        self.shared.trigger.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    fn schedule(&self) {
        let Some(flow_id) = self.flow_id() else {
            return;
        };
        let shared = Arc::downgrade(&self.shared);
        self.shared.trigger.schedule(move || {
            if let Some(shared) = shared.upgrade() {
                start_run(&shared, &flow_id);
            }
        });
    }
}

fn start_run(shared: &Arc<Shared>, flow_id: &FlowId) -> bool {
    if shared.disposed.load(Ordering::SeqCst) {
        return false;
    }

    let (layout_id, request) = {
        let session = shared.session();
        let Some(flow) = session.flow.as_ref().filter(|flow| &flow.id == flow_id) else {
            return false;
        };
        if is_sizing_render(flow, &session.sizes) {
            tracing::debug!(
                flow = %flow_id,
                measured = session.sizes.len(),
                "waiting for size reports before layout"
            );
            return false;
        }
        let layout_id = shared.next_layout_id.fetch_add(1, Ordering::SeqCst);
        let full = materialize_default(flow);
        let request = build_graph(&session.sizes, &full, shared.layout.direction, &shared.layout);
        (layout_id, request)
    };

    let Ok(handle) = Handle::try_current() else {
        tracing::warn!("layout requested outside a tokio runtime");
        return false;
    };

    tracing::debug!(flow = %flow_id, layout_id, "starting layout run");
    let solver = shared.solver.clone();
    let weak = Arc::downgrade(shared);
    let flow_id = flow_id.clone();
    handle.spawn(async move {
        match solver.layout(request).await {
            Ok(solved) => {
                if let Some(shared) = weak.upgrade() {
                    accept(&shared, flow_id, layout_id, &solved);
                }
            }
            Err(err) => {
                tracing::warn!(flow = %flow_id, layout_id, error = %err, "layout run failed, keeping previous layout");
            }
        }
    });
    true
}

fn accept(shared: &Shared, flow_id: FlowId, layout_id: u64, solved: &LayoutNode) {
    if shared.disposed.load(Ordering::SeqCst) {
        tracing::debug!(flow = %flow_id, layout_id, "scheduler disposed, dropping layout");
        return;
    }

    let snapshot = {
        let mut session = shared.session();
        let Some(current) = session.flow.as_ref().map(|flow| flow.id.clone()) else {
            return;
        };
        let positions = Arc::new(flatten(&session.sizes, solved));
        let action = LayoutAction::ReceivedLayout {
            flow_id: flow_id.clone(),
            layout_id,
            layout: positions.clone(),
        };
        session.state = reduce(std::mem::take(&mut session.state), action, &current);
        if session.state.layout_id() != Some(layout_id) || current != flow_id {
            return;
        }
        LayoutSnapshot {
            flow_id,
            layout_id,
            positions,
        }
    };
    shared.snapshots.send_replace(Some(snapshot));
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.trigger.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayeredSolver;

    fn scheduler() -> LayoutScheduler {
        let layout = LayoutConfig::default();
        LayoutScheduler::new(
            Arc::new(LayeredSolver::new(layout.clone())),
            layout,
            SchedulerConfig::default(),
        )
    }

    #[test]
    fn identity_change_clears_sizes() {
        let scheduler = scheduler();
        scheduler.set_flow(Flow::new("a"));
        scheduler.report_size(PositionedItemId::from_raw("state:x"), Size::new(1.0, 1.0));
        scheduler.set_flow(Flow::new("a"));
        assert_eq!(scheduler.measured_count(), 1);
        scheduler.set_flow(Flow::new("b"));
        assert_eq!(scheduler.measured_count(), 0);
        assert_eq!(scheduler.flow_id(), Some(FlowId::new("b")));
    }

    #[test]
    fn disposed_scheduler_ignores_reports() {
        let scheduler = scheduler();
        scheduler.set_flow(Flow::new("a"));
        scheduler.dispose();
        scheduler.report_size(PositionedItemId::from_raw("state:x"), Size::new(1.0, 1.0));
        assert_eq!(scheduler.measured_count(), 0);
        assert!(!scheduler.layout_now());
    }
}
