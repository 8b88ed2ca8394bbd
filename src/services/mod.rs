use rust_decimal::Decimal;

pub mod carts;
pub mod checkout;
pub mod gateway;
pub mod geo;
pub mod orders;
pub mod pending_payments;

/// Monetary amounts leave the service layer with exactly two decimal
/// places; sqlite in particular drops trailing zeros on round-trip.
pub(crate) fn money(mut amount: Decimal) -> Decimal {
    amount.rescale(2);
    amount
}
