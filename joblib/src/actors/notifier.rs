mod actor;

use crate::events::CompletionEvent;
use crate::registry::JobRegistry;
use crate::store::ExecutionStore;
use actor::Actor;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The single consumer of completion events.
///
/// This struct is an actor handle. The actor spawned by `NotifierHandle::spawn` is the
/// only writer of terminal job state and the only remover of registry entries. Events
/// are handled strictly one at a time; the actor exits once every sender is dropped.
#[derive(Clone)]
pub struct NotifierHandle {
    sender: mpsc::UnboundedSender<CompletionEvent>,
}

impl NotifierHandle {
    pub fn spawn(store: Arc<dyn ExecutionStore>, registry: Arc<JobRegistry>) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(inbox, store, registry);
        Self { sender }
    }

    /// A sender for a process runner to report its job's outcome on.
    pub fn sender(&self) -> mpsc::UnboundedSender<CompletionEvent> {
        self.sender.clone()
    }
}
