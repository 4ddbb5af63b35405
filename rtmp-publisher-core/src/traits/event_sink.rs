use crate::models::event::SessionEvent;

/// Subscriber on a session's event channel.
///
/// Called on the session owner thread only.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

impl<F> EventSink for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}
