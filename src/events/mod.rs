use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the order and payment flows. Consumed by a background
/// task; senders never block the request path on handler work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    PaymentInitiated {
        order_id: Uuid,
        order_number: String,
    },
    PaymentSucceeded {
        order_id: Uuid,
        order_number: String,
    },
    PaymentFailed {
        order_id: Uuid,
        order_number: String,
        reason: Option<String>,
    },

    CartCleared(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel. Runs for the lifetime of the process; ends when
/// every sender has been dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated(order_id) => {
                info!("Order created: {}", order_id);
            }
            Event::OrderCancelled(order_id) => {
                info!("Order cancelled: {}", order_id);
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    "Order {} status changed: {} -> {}",
                    order_id, old_status, new_status
                );
            }
            Event::PaymentInitiated {
                order_id,
                order_number,
            } => {
                info!(
                    "Payment initiated: order_id={}, order_number={}",
                    order_id, order_number
                );
            }
            Event::PaymentSucceeded {
                order_id,
                order_number,
            } => {
                info!(
                    "Payment succeeded: order_id={}, order_number={}",
                    order_id, order_number
                );
            }
            Event::PaymentFailed {
                order_id,
                order_number,
                reason,
            } => {
                warn!(
                    "Payment failed: order_id={}, order_number={}, reason={:?}",
                    order_id, order_number, reason
                );
            }
            Event::CartCleared(cart_id) => {
                info!("Cart cleared: {}", cart_id);
            }
        }
    }

    warn!("Event processing loop has ended");
}
