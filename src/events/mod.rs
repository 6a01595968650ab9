use crate::entities::stock_movement::MovementKind;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Publishing half of the in-process domain event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs a failure instead of returning it.
    ///
    /// Events are published after the owning transaction commits, so a closed
    /// channel must not turn a committed write into an error.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Dropping domain event");
            counter!("storefront_events.dropped", 1);
        }
    }
}

/// Domain events published after a committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    StockMovementRecorded {
        movement_id: Uuid,
        product_id: Uuid,
        kind: MovementKind,
        quantity: i32,
    },
    StockMovementRevised {
        movement_id: Uuid,
        product_id: Uuid,
        kind: MovementKind,
        quantity: i32,
    },
    StockMovementRemoved {
        movement_id: Uuid,
        product_id: Uuid,
        counters_reversed: bool,
    },
    /// Available stock reached zero after an outbound movement
    StockDepleted { product_id: Uuid },

    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    VendorCreated(Uuid),
}

impl Event {
    /// Short, stable name used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Event::StockMovementRecorded { .. } => "stock_movement_recorded",
            Event::StockMovementRevised { .. } => "stock_movement_revised",
            Event::StockMovementRemoved { .. } => "stock_movement_removed",
            Event::StockDepleted { .. } => "stock_depleted",
            Event::ProductCreated(_) => "product_created",
            Event::ProductUpdated(_) => "product_updated",
            Event::VendorCreated(_) => "vendor_created",
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

// Drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("storefront_events.processed", 1, "event" => event.name());

        match &event {
            Event::StockMovementRecorded {
                movement_id,
                product_id,
                kind,
                quantity,
            } => info!(
                movement_id = %movement_id,
                product_id = %product_id,
                kind = %kind,
                quantity,
                "Stock movement recorded"
            ),
            Event::StockMovementRevised {
                movement_id,
                product_id,
                kind,
                quantity,
            } => info!(
                movement_id = %movement_id,
                product_id = %product_id,
                kind = %kind,
                quantity,
                "Stock movement revised"
            ),
            Event::StockMovementRemoved {
                movement_id,
                product_id,
                counters_reversed,
            } => info!(
                movement_id = %movement_id,
                product_id = %product_id,
                counters_reversed,
                "Stock movement removed"
            ),
            Event::StockDepleted { product_id } => {
                warn!(product_id = %product_id, "Product is out of stock")
            }
            other => info!(event = other.name(), "Received event: {:?}", other),
        }
    }

    info!("Event processing loop stopped");
}
