pub mod bus;
pub mod scheduler;

pub use bus::EventBus;
pub use scheduler::{Scheduler, SerialLane};

use std::sync::Arc;

/// Scheduler and event bus shared by every connection in the process.
///
/// Cheap to clone; pass it to each component at construction.
#[derive(Clone, Debug)]
pub struct Runtime {
    pub scheduler: Arc<Scheduler>,
    pub bus: Arc<EventBus>,
}

impl Runtime {
    pub fn new() -> Self {
        let scheduler = Arc::new(Scheduler::new());
        let bus = Arc::new(EventBus::new(scheduler.clone()));
        Self { scheduler, bus }
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
