use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::{PaymentMethod, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::carts::CartService;
use crate::services::gateway::{GatewayChargeRequest, PaymentGateway};
use crate::services::orders::{NewOrder, NewOrderItem, OrderResponse, OrderService};
use crate::services::pending_payments::{
    PendingPaymentKind, PendingPaymentLedger, PendingPaymentRecord,
};

/// Share of the total collected up front on cash-on-delivery orders.
const ADVANCE_RATE: Decimal = dec!(0.10);

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub payment_method: PaymentMethod,
    /// Collect the 10% advance through the gateway before delivery. Only
    /// meaningful for cash-on-delivery.
    #[serde(default)]
    pub pay_advance_online: bool,
    pub delivery_address: String,
    pub delivery_latitude: Option<Decimal>,
    pub delivery_longitude: Option<Decimal>,
    pub notes: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderResponse {
    pub order: OrderResponse,
    /// Hosted checkout page when a gateway leg was opened
    pub payment_url: Option<String>,
    pub message: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    orders: OrderService,
    carts: CartService,
    gateway: Arc<dyn PaymentGateway>,
    ledger: PendingPaymentLedger,
    currency: String,
    event_sender: Option<EventSender>,
}

impl CheckoutService {
    pub fn new(
        orders: OrderService,
        carts: CartService,
        gateway: Arc<dyn PaymentGateway>,
        ledger: PendingPaymentLedger,
        currency: String,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            orders,
            carts,
            gateway,
            ledger,
            currency,
            event_sender,
        }
    }

    async fn send_event(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                error!("Failed to send event: {}", e);
            }
        }
    }

    /// Places an order from the customer's active cart. Each call mints a
    /// fresh order number; retrying a timed-out request creates a second
    /// order on purpose, so the operator can refund rather than guess.
    #[instrument(skip(self, request), fields(customer_id = %customer_id))]
    pub async fn place_order(
        &self,
        customer_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<PlaceOrderResponse, ServiceError> {
        if request.delivery_address.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Delivery address is required".to_string(),
            ));
        }
        if request.customer_name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Customer name is required".to_string(),
            ));
        }
        if request.customer_email.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Customer email is required".to_string(),
            ));
        }
        if request.customer_phone.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Customer phone is required".to_string(),
            ));
        }

        let cart = self.carts.get_cart_with_items(customer_id).await?;
        if cart.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Cart is empty".to_string(),
            ));
        }

        let cart_model = self.carts.get_or_create_cart(customer_id).await?;
        let cart_model = self.carts.begin_conversion(cart_model).await?;

        let total = crate::services::money(cart.items.iter().map(|i| i.line_total).sum());
        let order_number = generate_order_number();

        // Advance applies only to cash-on-delivery with the online leg
        // requested; everything else charges in full or not at all.
        let (payment_status, advance_amount, charge) = match request.payment_method {
            PaymentMethod::OnlinePayment => {
                (PaymentStatus::Pending, Decimal::ZERO, Some((total, PendingPaymentKind::Full)))
            }
            PaymentMethod::CashOnDelivery if request.pay_advance_online => {
                let advance = (total * ADVANCE_RATE).round_dp(2);
                (
                    PaymentStatus::AdvancePending,
                    advance,
                    Some((advance, PendingPaymentKind::Advance)),
                )
            }
            PaymentMethod::CashOnDelivery => {
                (PaymentStatus::CashOnDelivery, Decimal::ZERO, None)
            }
        };
        let remaining_amount = total - advance_amount;

        let new_order = NewOrder {
            customer_id,
            order_number: order_number.clone(),
            currency: self.currency.clone(),
            total_amount: total,
            payment_method: request.payment_method,
            payment_status,
            advance_amount,
            remaining_amount,
            delivery_address: request.delivery_address.clone(),
            delivery_latitude: request.delivery_latitude,
            delivery_longitude: request.delivery_longitude,
            notes: request.notes.clone(),
            items: cart
                .items
                .iter()
                .map(|i| NewOrderItem {
                    product_id: i.product_id,
                    shop_id: i.shop_id,
                    farmer_id: i.farmer_id,
                    name: i.name.clone(),
                    unit_label: i.unit_label.clone(),
                    unit_price: i.unit_price,
                    quantity: i.quantity,
                    line_total: i.line_total,
                })
                .collect(),
        };

        let order = match self.orders.create_order(new_order).await {
            Ok(order) => order,
            Err(e) => {
                // Give the cart back before surfacing the error.
                if let Err(abort_err) = self.carts.abort_conversion(cart_model).await {
                    error!("Failed to release cart after order error: {}", abort_err);
                }
                return Err(e);
            }
        };

        let Some((charge_amount, kind)) = charge else {
            // Plain cash on delivery: nothing to charge, cart converts now.
            self.carts.finish_conversion(cart_model).await?;
            return Ok(PlaceOrderResponse {
                message: format!(
                    "Order {} placed. Pay {} {} on delivery.",
                    order.order_number, total, order.currency
                ),
                payment_url: None,
                order,
            });
        };

        // Ledger entry goes in before the gateway call so a callback that
        // races the response still finds the record.
        let record = PendingPaymentRecord {
            order_id: order.id,
            order_number: order_number.clone(),
            customer_id,
            kind,
            amount: charge_amount,
            created_at: Utc::now(),
        };
        self.ledger.record(&record).await?;

        self.send_event(Event::PaymentInitiated {
            order_id: order.id,
            order_number: order_number.clone(),
        })
        .await;

        let session = self
            .gateway
            .create_session(&GatewayChargeRequest {
                tran_id: order_number.clone(),
                amount: charge_amount,
                currency: self.currency.clone(),
                customer_name: request.customer_name.clone(),
                customer_email: request.customer_email.clone(),
                customer_phone: request.customer_phone.clone(),
                customer_address: request.delivery_address.clone(),
                product_name: format!("Farm order {}", order_number),
                value_a: Some(order.id.to_string()),
                value_b: Some(customer_id.to_string()),
                value_c: Some(match kind {
                    PendingPaymentKind::Full => "full".to_string(),
                    PendingPaymentKind::Advance => "advance".to_string(),
                }),
                value_d: None,
            })
            .await;

        let session = match session {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    "Gateway rejected session for order {}: {}",
                    order_number, e
                );
                // The order stays on file with a failed payment so support
                // can see the attempt; the cart is returned to the customer.
                if let Err(mark_err) = self
                    .orders
                    .mark_payment_failed(&order_number, false, None, Some(e.to_string()))
                    .await
                {
                    error!(
                        "Failed to record gateway failure on order {}: {}",
                        order_number, mark_err
                    );
                }
                self.ledger.clear(&order_number).await?;
                if let Err(abort_err) = self.carts.abort_conversion(cart_model).await {
                    error!("Failed to release cart after gateway error: {}", abort_err);
                }
                return Err(e);
            }
        };

        self.carts.finish_conversion(cart_model).await?;

        let message = match kind {
            PendingPaymentKind::Full => format!(
                "Order {} placed. Complete payment of {} {} to confirm.",
                order.order_number, total, order.currency
            ),
            PendingPaymentKind::Advance => format!(
                "Order {} placed. Pay the {} {} advance now; {} {} is due on delivery.",
                order.order_number,
                advance_amount,
                order.currency,
                remaining_amount,
                order.currency
            ),
        };

        info!(
            "Opened gateway session for order {} ({:?}, {} {})",
            order.order_number, kind, charge_amount, order.currency
        );

        Ok(PlaceOrderResponse {
            order,
            payment_url: Some(session.redirect_url),
            message,
        })
    }
}

/// `FG-<epoch millis>-<4 hex chars>`. Unique enough for a per-customer order
/// stream and readable over the phone.
pub fn generate_order_number() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u16 = rand::thread_rng().gen();
    format!("FG-{}-{:04x}", millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_ten_percent_rounded_to_cents() {
        let total = dec!(1000.00);
        let advance = (total * ADVANCE_RATE).round_dp(2);
        assert_eq!(advance, dec!(100.00));
        assert_eq!(total - advance, dec!(900.00));

        let odd = dec!(333.33);
        let advance = (odd * ADVANCE_RATE).round_dp(2);
        assert_eq!(advance, dec!(33.33));
        assert_eq!(advance + (odd - advance), odd);
    }

    #[test]
    fn order_numbers_carry_the_prefix_and_differ() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert!(a.starts_with("FG-"));
        assert!(b.starts_with("FG-"));
        assert_ne!(a, b);
    }
}
