//! Pipeline events for external listeners (progress UI, index finalization).

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A chunk artifact and its index entry were written.
    ChunkWritten {
        bucket: String,
        chunk_index: u32,
        item_count: u32,
    },
    /// The cleanup job of a generation run has executed.
    BatchProcessComplete,
    /// The queue drained after a dispatch.
    GenerationComplete,
}

type Listener = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Synchronous fan-out of pipeline events.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    pub fn emit(&self, event: PipelineEvent) {
        debug!("Pipeline event: {:?}", event);
        // Listeners may subscribe from inside a callback
        let listeners: Vec<Listener> = self.listeners.read().clone();
        for listener in listeners {
            listener(&event);
        }
    }
}
