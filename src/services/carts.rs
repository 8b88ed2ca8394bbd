use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::entities::cart::{self, CartStatus};
use crate::entities::cart_item;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub currency: String,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub status: CartStatus,
    pub items: Vec<cart_item::Model>,
}

#[derive(Debug, Clone)]
pub struct AddCartItem {
    pub product_id: Uuid,
    pub shop_id: Uuid,
    pub farmer_id: Uuid,
    pub name: String,
    pub unit_label: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl CartService {
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

    /// Fetches the customer's active cart, creating an empty one on demand.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, customer_id: Uuid) -> Result<cart::Model, ServiceError> {
        let existing = cart::Entity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(&*self.db)
            .await?;

        if let Some(cart) = existing {
            return Ok(cart);
        }

        let model = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            currency: Set("BDT".to_string()),
            subtotal: Set(Decimal::ZERO),
            total: Set(Decimal::ZERO),
            status: Set(CartStatus::Active),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        Ok(model.insert(&*self.db).await?)
    }

    pub async fn get_cart_with_items(
        &self,
        customer_id: Uuid,
    ) -> Result<CartResponse, ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;
        let items = cart
            .find_related(cart_item::Entity)
            .all(&*self.db)
            .await?;
        Ok(Self::to_response(cart, items))
    }

    /// Adds an item to the active cart. Adding a product already in the cart
    /// bumps its quantity instead of duplicating the line.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        input: AddCartItem,
    ) -> Result<CartResponse, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }
        if input.unit_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Unit price must be positive".to_string(),
            ));
        }

        let cart = self.get_or_create_cart(customer_id).await?;
        if cart.status != CartStatus::Active {
            return Err(ServiceError::Conflict(
                "Cart is being checked out".to_string(),
            ));
        }

        let now = Utc::now();
        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&*self.db)
            .await?;

        let txn = self.db.begin().await?;

        match existing {
            Some(item) => {
                let quantity = item.quantity + input.quantity;
                let line_total = input.unit_price * Decimal::from(quantity);
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(quantity);
                active.unit_price = Set(input.unit_price);
                active.line_total = Set(line_total);
                active.updated_at = Set(Some(now));
                active.update(&txn).await?;
            }
            None => {
                let line_total = input.unit_price * Decimal::from(input.quantity);
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(input.product_id),
                    shop_id: Set(input.shop_id),
                    farmer_id: Set(input.farmer_id),
                    name: Set(input.name.clone()),
                    unit_label: Set(input.unit_label.clone()),
                    unit_price: Set(input.unit_price),
                    quantity: Set(input.quantity),
                    line_total: Set(line_total),
                    created_at: Set(now),
                    updated_at: Set(None),
                };
                item.insert(&txn).await?;
            }
        }

        let cart = Self::recompute_totals(&txn, cart).await?;
        let items = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&txn)
            .await?;
        txn.commit().await?;

        Ok(Self::to_response(cart, items))
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartResponse, ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;
        if cart.status != CartStatus::Active {
            return Err(ServiceError::Conflict(
                "Cart is being checked out".to_string(),
            ));
        }

        let item = cart_item::Entity::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        let txn = self.db.begin().await?;
        item.delete(&txn).await?;
        let cart = Self::recompute_totals(&txn, cart).await?;
        let items = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&txn)
            .await?;
        txn.commit().await?;

        Ok(Self::to_response(cart, items))
    }

    /// Empties the active cart without converting it.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, customer_id: Uuid) -> Result<CartResponse, ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;

        let txn = self.db.begin().await?;
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        let cart = Self::recompute_totals(&txn, cart).await?;
        txn.commit().await?;

        self.send_event(Event::CartCleared(cart.id)).await;

        Ok(Self::to_response(cart, Vec::new()))
    }

    /// Flips the cart into `Converting` so checkout has exclusive use of it.
    /// Fails if another checkout already holds it.
    pub async fn begin_conversion(&self, cart: cart::Model) -> Result<cart::Model, ServiceError> {
        if cart.status != CartStatus::Active {
            return Err(ServiceError::Conflict(
                "Cart is already being checked out".to_string(),
            ));
        }
        let mut active: cart::ActiveModel = cart.into();
        active.status = Set(CartStatus::Converting);
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(&*self.db).await?)
    }

    /// Marks the cart converted after a successful checkout and drops its
    /// items. The cart row itself is kept for history.
    pub async fn finish_conversion(&self, cart: cart::Model) -> Result<(), ServiceError> {
        let cart_id = cart.id;
        let txn = self.db.begin().await?;
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;
        let mut active: cart::ActiveModel = cart.into();
        active.status = Set(CartStatus::Converted);
        active.subtotal = Set(Decimal::ZERO);
        active.total = Set(Decimal::ZERO);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;
        txn.commit().await?;

        self.send_event(Event::CartCleared(cart_id)).await;
        Ok(())
    }

    /// Returns the cart to `Active` after a checkout that did not complete.
    pub async fn abort_conversion(&self, cart: cart::Model) -> Result<cart::Model, ServiceError> {
        let mut active: cart::ActiveModel = cart.into();
        active.status = Set(CartStatus::Active);
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(&*self.db).await?)
    }

    async fn recompute_totals<C: sea_orm::ConnectionTrait>(
        conn: &C,
        cart: cart::Model,
    ) -> Result<cart::Model, ServiceError> {
        let items = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(conn)
            .await?;
        let subtotal: Decimal = items.iter().map(|i| i.line_total).sum();

        let mut active: cart::ActiveModel = cart.into();
        active.subtotal = Set(subtotal);
        active.total = Set(subtotal);
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(conn).await?)
    }

    fn to_response(cart: cart::Model, items: Vec<cart_item::Model>) -> CartResponse {
        CartResponse {
            id: cart.id,
            customer_id: cart.customer_id,
            currency: cart.currency,
            subtotal: crate::services::money(cart.subtotal),
            total: crate::services::money(cart.total),
            status: cart.status,
            items,
        }
    }
}
