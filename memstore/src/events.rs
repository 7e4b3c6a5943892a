use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Fan-out of values to every live receiver. Receivers that went away are
/// dropped on the next publish.
pub struct EventBus<T> {
    subscribers: Vec<UnboundedSender<T>>,
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Subscribe, returning a receiver for every later publish.
    pub fn subscribe(&mut self) -> UnboundedReceiver<T> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Subscribe and queue `initial` ahead of later publishes.
    pub fn subscribe_with(&mut self, initial: T) -> UnboundedReceiver<T> {
        let (tx, rx) = unbounded_channel();
        if tx.send(initial).is_ok() {
            self.subscribers.push(tx);
        }
        rx
    }

    pub fn publish(&mut self, payload: T) {
        self.subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
