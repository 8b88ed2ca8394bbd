pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod payment_callbacks;
pub mod shops;

use crate::services::carts::CartService;
use crate::services::checkout::CheckoutService;
use crate::services::orders::OrderService;
use crate::services::pending_payments::PendingPaymentLedger;

/// Service instances shared across handlers through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub orders: OrderService,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub ledger: PendingPaymentLedger,
}
