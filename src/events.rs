use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the service layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),

    // User events
    UserRegistered(Uuid),
    UserProfileUpdated(Uuid),

    // Issue events
    IssueSubmitted(Uuid),
    IssueResolved(Uuid),
}

/// Handle for publishing events to the processing task.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, returning an error if the channel is closed.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing if the channel is closed.
    /// Event delivery is advisory; business operations never fail on it.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(error = %e, ?event, "Dropping event");
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Runs until every sender
/// is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(id) => info!(order_id = %id, "Order created"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "Order status changed"),
            Event::PaymentStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "Payment status changed"),
            Event::ProductCreated(id) => info!(product_id = %id, "Product created"),
            Event::ProductUpdated(id) => info!(product_id = %id, "Product updated"),
            Event::ProductDeleted(id) => info!(product_id = %id, "Product deleted"),
            Event::UserRegistered(id) => info!(user_id = %id, "User registered"),
            Event::UserProfileUpdated(id) => info!(user_id = %id, "User profile updated"),
            Event::IssueSubmitted(id) => info!(issue_id = %id, "Issue submitted"),
            Event::IssueResolved(id) => info!(issue_id = %id, "Issue resolved"),
        }
    }
}
