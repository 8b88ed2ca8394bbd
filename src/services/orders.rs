use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::order_item;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::pending_payments::PendingPaymentKind;

/// Order plus its line items, as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub advance_amount: Decimal,
    pub remaining_amount: Decimal,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub items: Vec<order_item::Model>,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Input for creating an order, assembled by checkout from the cart snapshot.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub order_number: String,
    pub currency: String,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub advance_amount: Decimal,
    pub remaining_amount: Decimal,
    pub delivery_address: String,
    pub delivery_latitude: Option<Decimal>,
    pub delivery_longitude: Option<Decimal>,
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub shop_id: Uuid,
    pub farmer_id: Uuid,
    pub name: String,
    pub unit_label: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn send_event(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                error!("Failed to send event: {}", e);
            }
        }
    }

    /// Creates the order and its items in one transaction.
    #[instrument(skip(self, new_order), fields(order_number = %new_order.order_number))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<OrderResponse, ServiceError> {
        if new_order.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(new_order.order_number.clone()),
            customer_id: Set(new_order.customer_id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(new_order.total_amount),
            currency: Set(new_order.currency.clone()),
            payment_method: Set(new_order.payment_method),
            payment_status: Set(new_order.payment_status),
            advance_amount: Set(new_order.advance_amount),
            remaining_amount: Set(new_order.remaining_amount),
            delivery_address: Set(new_order.delivery_address.clone()),
            delivery_latitude: Set(new_order.delivery_latitude),
            delivery_longitude: Set(new_order.delivery_longitude),
            notes: Set(new_order.notes.clone()),
            gateway_response: Set(None),
            payment_completed_at: Set(None),
            payment_failed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        };

        let items: Vec<order_item::ActiveModel> = new_order
            .items
            .iter()
            .map(|item| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                shop_id: Set(item.shop_id),
                farmer_id: Set(item.farmer_id),
                name: Set(item.name.clone()),
                unit_label: Set(item.unit_label.clone()),
                unit_price: Set(item.unit_price),
                quantity: Set(item.quantity),
                line_total: Set(item.line_total),
                created_at: Set(now),
            })
            .collect();

        let txn = self.db.begin().await?;
        let saved = order_model.insert(&txn).await?;
        order_item::Entity::insert_many(items).exec(&txn).await?;
        txn.commit().await?;

        info!("Created order {} ({})", saved.order_number, saved.id);
        self.send_event(Event::OrderCreated(saved.id)).await;

        self.to_response(saved).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let model = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        self.to_response(model).await
    }

    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let model = self.find_by_number(order_number).await?;
        self.to_response(model).await
    }

    async fn find_by_number(&self, order_number: &str) -> Result<order::Model, ServiceError> {
        order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))
    }

    #[instrument(skip(self))]
    pub async fn list_orders_for_customer(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let paginator = order::Entity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page - 1).await?;

        let mut orders = Vec::with_capacity(models.len());
        for model in models {
            orders.push(self.to_response(model).await?);
        }

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Settles an order after the gateway confirmed payment. Only payment
    /// fields are touched; item lines and totals stay as placed. Re-applying
    /// to an already settled order is a no-op, so redirect and IPN can race.
    #[instrument(skip(self, gateway_payload))]
    pub async fn apply_payment_success(
        &self,
        order_number: &str,
        kind: PendingPaymentKind,
        gateway_payload: serde_json::Value,
    ) -> Result<OrderResponse, ServiceError> {
        let model = self.find_by_number(order_number).await?;

        if model.payment_status.is_settled() {
            info!(
                "Order {} already settled ({:?}), skipping",
                order_number, model.payment_status
            );
            return self.to_response(model).await;
        }

        let new_payment_status = match kind {
            PendingPaymentKind::Full => PaymentStatus::Success,
            PendingPaymentKind::Advance => PaymentStatus::AdvancePaid,
        };
        let old_status = model.status;
        let new_status = if model.status == OrderStatus::Pending {
            OrderStatus::Processing
        } else {
            model.status
        };

        let version = model.version;
        let order_id = model.id;
        let mut active: order::ActiveModel = model.into();
        active.payment_status = Set(new_payment_status);
        active.status = Set(new_status);
        active.gateway_response = Set(Some(gateway_payload));
        active.payment_completed_at = Set(Some(Utc::now()));
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let saved = active.update(&*self.db).await?;

        self.send_event(Event::PaymentSucceeded {
            order_id,
            order_number: order_number.to_string(),
        })
        .await;
        if old_status != new_status {
            self.send_event(Event::OrderStatusChanged {
                order_id,
                old_status: format!("{:?}", old_status),
                new_status: format!("{:?}", new_status),
            })
            .await;
        }

        self.to_response(saved).await
    }

    /// Records a failed or abandoned payment attempt. The order itself is
    /// kept so the customer can retry; only payment fields move.
    #[instrument(skip(self, gateway_payload))]
    pub async fn mark_payment_failed(
        &self,
        order_number: &str,
        cancelled: bool,
        gateway_payload: Option<serde_json::Value>,
        reason: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let model = self.find_by_number(order_number).await?;

        if model.payment_status.is_settled() {
            info!(
                "Order {} already settled, ignoring failure report",
                order_number
            );
            return self.to_response(model).await;
        }

        let order_id = model.id;
        let version = model.version;
        let mut active: order::ActiveModel = model.into();
        active.payment_status = Set(if cancelled {
            PaymentStatus::Cancelled
        } else {
            PaymentStatus::Failed
        });
        if let Some(payload) = gateway_payload {
            active.gateway_response = Set(Some(payload));
        }
        active.payment_failed_at = Set(Some(Utc::now()));
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let saved = active.update(&*self.db).await?;

        self.send_event(Event::PaymentFailed {
            order_id,
            order_number: order_number.to_string(),
            reason,
        })
        .await;

        self.to_response(saved).await
    }

    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let model = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !Self::is_valid_transition(model.status, new_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot move order from {:?} to {:?}",
                model.status, new_status
            )));
        }

        let old_status = model.status;
        let version = model.version;
        let mut active: order::ActiveModel = model.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let saved = active.update(&*self.db).await?;

        self.send_event(Event::OrderStatusChanged {
            order_id,
            old_status: format!("{:?}", old_status),
            new_status: format!("{:?}", new_status),
        })
        .await;

        self.to_response(saved).await
    }

    /// Cancels an order that has not completed. A settled online payment
    /// blocks cancellation here; refunds are a manual process.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let model = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        match model.status {
            OrderStatus::Completed => {
                return Err(ServiceError::InvalidOperation(
                    "Completed orders cannot be cancelled".to_string(),
                ))
            }
            OrderStatus::Cancelled => {
                return Err(ServiceError::InvalidOperation(
                    "Order is already cancelled".to_string(),
                ))
            }
            _ => {}
        }

        let version = model.version;
        let mut active: order::ActiveModel = model.into();
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let saved = active.update(&*self.db).await?;

        self.send_event(Event::OrderCancelled(order_id)).await;

        self.to_response(saved).await
    }

    fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (from, to),
            (Pending, Processing)
                | (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Processing, Confirmed)
                | (Processing, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
        )
    }

    async fn to_response(&self, model: order::Model) -> Result<OrderResponse, ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(model.id))
            .all(&*self.db)
            .await?;

        Ok(OrderResponse {
            id: model.id,
            order_number: model.order_number,
            customer_id: model.customer_id,
            status: model.status,
            total_amount: crate::services::money(model.total_amount),
            currency: model.currency,
            payment_method: model.payment_method,
            payment_status: model.payment_status,
            advance_amount: crate::services::money(model.advance_amount),
            remaining_amount: crate::services::money(model.remaining_amount),
            delivery_address: model.delivery_address,
            notes: model.notes,
            items,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_allow_the_forward_path() {
        use OrderStatus::*;
        assert!(OrderService::is_valid_transition(Pending, Processing));
        assert!(OrderService::is_valid_transition(Processing, Confirmed));
        assert!(OrderService::is_valid_transition(Confirmed, Completed));
    }

    #[test]
    fn transitions_block_backwards_and_terminal_moves() {
        use OrderStatus::*;
        assert!(!OrderService::is_valid_transition(Confirmed, Pending));
        assert!(!OrderService::is_valid_transition(Completed, Cancelled));
        assert!(!OrderService::is_valid_transition(Cancelled, Pending));
        assert!(!OrderService::is_valid_transition(Pending, Completed));
    }
}
