use midilib_types::{FileEvent, Message};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// 文件事件总线
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Message>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }

    pub fn publish(&self, message: Message) -> Result<usize, broadcast::error::SendError<Message>> {
        self.sender.send(message)
    }

    /// 发布事件；事件只是通知，没有订阅者时直接丢弃
    pub fn emit(&self, event: FileEvent) {
        let topic = event.topic();
        if self.publish(Message::new(event)).is_err() {
            trace!(topic = topic, "No subscribers for event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

pub type SharedEventBus = Arc<EventBus>;
