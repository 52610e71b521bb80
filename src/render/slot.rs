use std::sync::Arc;
use arc_swap::ArcSwapOption;

use crate::device::types::SensorSample;

/// Single-value handoff between the connection task and the render thread.
///
/// Writes overwrite whatever is stored; reads never block and may see a
/// sample that is one update old.
#[derive(Clone, Default)]
pub struct SampleSlot {
    latest: Arc<ArcSwapOption<SensorSample>>,
}

impl SampleSlot {
    pub fn new() -> Self {
        SampleSlot::default()
    }

    pub fn publish(&self, sample: SensorSample) {
        self.latest.store(Some(Arc::new(sample)));
    }

    pub fn latest(&self) -> Option<SensorSample> {
        self.latest.load().as_deref().copied()
    }

    pub fn clear(&self) {
        self.latest.store(None);
    }
}
