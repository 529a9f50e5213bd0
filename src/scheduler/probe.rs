use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::debounce::IdempotentDebounce;
use crate::layout::{PositionedItemId, Size};

pub(crate) type SizeSink = Arc<dyn Fn(&PositionedItemId, Size) + Send + Sync>;

/// Size reporter bound to one element.
///
/// Every observation is forwarded at once, and the latest observed size is
/// reported again shortly afterwards, because the first observation of a
/// resize is not always the final one.
#[derive(Clone)]
pub struct SizeProbe {
    id: PositionedItemId,
    sink: SizeSink,
    latest: Arc<Mutex<Option<Size>>>,
    trailing: IdempotentDebounce,
}

impl SizeProbe {
    pub(crate) fn new(id: PositionedItemId, sink: SizeSink, trailing: Duration) -> Self {
        Self {
            id,
            sink,
            latest: Arc::new(Mutex::new(None)),
            trailing: IdempotentDebounce::new(trailing),
        }
    }

    pub fn id(&self) -> &PositionedItemId {
        &self.id
    }

    pub fn observe(&self, size: Size) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(size);
        (self.sink)(&self.id, size);

        let id = self.id.clone();
        let sink = self.sink.clone();
        let latest = Arc::downgrade(&self.latest);
        self.trailing.schedule(move || {
            let Some(latest) = latest.upgrade() else {
                return;
            };
            let size = *latest.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(size) = size {
                sink(&id, size);
            }
        });
    }

    /// Stops the trailing report, e.g. when the element goes away.
    pub fn disconnect(&self) {
        self.trailing.cancel();
    }
}
