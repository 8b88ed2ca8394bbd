use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted order. Item lines and totals are a snapshot of the cart at
/// placement time and are never rewritten; payment fields are the only part
/// touched by reconciliation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Also used as the gateway transaction id (`tran_id`)
    pub order_number: String,

    pub customer_id: Uuid,
    pub status: OrderStatus,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// 10% of total when an advance leg applies, zero otherwise
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub advance_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub remaining_amount: Decimal,
    pub delivery_address: String,
    #[sea_orm(nullable)]
    pub delivery_latitude: Option<Decimal>,
    #[sea_orm(nullable)]
    pub delivery_longitude: Option<Decimal>,
    #[sea_orm(nullable)]
    pub notes: Option<String>,
    /// Raw gateway callback block stored verbatim for audit
    #[sea_orm(column_type = "Json", nullable)]
    pub gateway_response: Option<Json>,
    #[sea_orm(nullable)]
    pub payment_completed_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub payment_failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle status, independent of payment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "cash_on_delivery")]
    CashOnDelivery,
    #[sea_orm(string_value = "online_payment")]
    OnlinePayment,
}

/// Payment settlement state. `AdvancePending` is the explicit pre-confirmation
/// state for a started advance leg; only reconciliation moves it to
/// `AdvancePaid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "cash_on_delivery")]
    CashOnDelivery,
    #[sea_orm(string_value = "advance_pending")]
    AdvancePending,
    #[sea_orm(string_value = "advance_paid")]
    AdvancePaid,
}

impl PaymentStatus {
    /// Terminal states need no further reconciliation.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Success | PaymentStatus::AdvancePaid | PaymentStatus::Cancelled
        )
    }
}
