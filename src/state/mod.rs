pub mod message_id;

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

pub use message_id::MessageIdGenerator;

use crate::stream::CancelHandle;

struct StreamEntry {
    cancel: CancelHandle,
    request_id: Option<Arc<str>>,
}

/// Live streams keyed by local message id.
///
/// Lets a caller cancel a stream by its local id or by the request id the
/// backend announced, from any thread.
pub struct StreamRegistry {
    ids: MessageIdGenerator,
    streams: RwLock<FxHashMap<Arc<str>, StreamEntry>>,
}

impl StreamRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: MessageIdGenerator::new(),
            streams: RwLock::new(FxHashMap::default()),
        }
    }

    /// Track a new stream and return its local message id.
    pub fn register(&self, cancel: CancelHandle) -> Arc<str> {
        let message_id: Arc<str> = Arc::from(self.ids.next_id());
        self.streams.write().insert(
            Arc::clone(&message_id),
            StreamEntry {
                cancel,
                request_id: None,
            },
        );
        debug!(message_id = %message_id, "stream registered");
        message_id
    }

    /// Attach the backend request id. The first announcement wins.
    pub fn announce_request_id(&self, message_id: &str, request_id: &str) -> bool {
        let mut streams = self.streams.write();
        let Some(entry) = streams.get_mut(message_id) else {
            return false;
        };
        if entry.request_id.is_some() {
            return false;
        }
        entry.request_id = Some(Arc::from(request_id));
        debug!(message_id, request_id, "request id announced");
        true
    }

    #[must_use]
    pub fn request_id(&self, message_id: &str) -> Option<Arc<str>> {
        self.streams
            .read()
            .get(message_id)
            .and_then(|entry| entry.request_id.clone())
    }

    #[must_use]
    pub fn find_by_request_id(&self, request_id: &str) -> Option<Arc<str>> {
        self.streams
            .read()
            .iter()
            .find(|(_, entry)| entry.request_id.as_deref() == Some(request_id))
            .map(|(message_id, _)| Arc::clone(message_id))
    }

    /// Signal cancellation. The pipeline observes it before its next delta.
    pub fn cancel(&self, message_id: &str) -> bool {
        let streams = self.streams.read();
        let Some(entry) = streams.get(message_id) else {
            return false;
        };
        entry.cancel.cancel();
        true
    }

    pub fn cancel_by_request_id(&self, request_id: &str) -> bool {
        self.find_by_request_id(request_id)
            .is_some_and(|message_id| self.cancel(&message_id))
    }

    pub fn remove(&self, message_id: &str) -> bool {
        self.streams.write().remove(message_id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
