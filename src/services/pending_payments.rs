use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

const KEY_PREFIX: &str = "pending_payment:";

/// Which leg of the payment this session covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPaymentKind {
    /// The whole order total
    Full,
    /// The 10% advance on a cash-on-delivery order
    Advance,
}

/// A gateway session we are still waiting to hear back about. Keyed by
/// order number, which doubles as the gateway transaction id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPaymentRecord {
    pub order_id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub kind: PendingPaymentKind,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Key-value backend for the ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ServiceError>;
    async fn remove(&self, key: &str) -> Result<(), ServiceError>;
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, ServiceError>;
    async fn remove_many(&self, keys: &[String]) -> Result<(), ServiceError>;
}

pub struct RedisLedgerStore {
    client: redis::Client,
}

impl RedisLedgerStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<redis::aio::Connection, ServiceError> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| ServiceError::LedgerError(format!("Redis connection failed: {}", e)))
    }
}

#[async_trait]
impl LedgerStore for RedisLedgerStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|e| ServiceError::LedgerError(format!("Redis GET failed: {}", e)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        let mut conn = self.connection().await?;
        conn.set(key, value)
            .await
            .map_err(|e| ServiceError::LedgerError(format!("Redis SET failed: {}", e)))
    }

    async fn remove(&self, key: &str) -> Result<(), ServiceError> {
        let mut conn = self.connection().await?;
        conn.del(key)
            .await
            .map_err(|e| ServiceError::LedgerError(format!("Redis DEL failed: {}", e)))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, ServiceError> {
        let mut conn = self.connection().await?;
        conn.keys(format!("{}*", prefix))
            .await
            .map_err(|e| ServiceError::LedgerError(format!("Redis KEYS failed: {}", e)))
    }

    async fn remove_many(&self, keys: &[String]) -> Result<(), ServiceError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        conn.del(keys)
            .await
            .map_err(|e| ServiceError::LedgerError(format!("Redis DEL failed: {}", e)))
    }
}

/// Single-process backend for tests and local development.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ServiceError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<(), ServiceError> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Tracks gateway sessions from placement until a terminal callback arrives.
/// A record here is what lets reconciliation know whether a `tran_id` was a
/// full charge or an advance.
#[derive(Clone)]
pub struct PendingPaymentLedger {
    store: Arc<dyn LedgerStore>,
}

impl PendingPaymentLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    fn key(order_number: &str) -> String {
        format!("{}{}", KEY_PREFIX, order_number)
    }

    #[instrument(skip(self, record), fields(order_number = %record.order_number))]
    pub async fn record(&self, record: &PendingPaymentRecord) -> Result<(), ServiceError> {
        let value = serde_json::to_string(record)
            .map_err(|e| ServiceError::LedgerError(format!("Failed to encode record: {}", e)))?;
        self.store.set(&Self::key(&record.order_number), &value).await
    }

    pub async fn lookup(
        &self,
        order_number: &str,
    ) -> Result<Option<PendingPaymentRecord>, ServiceError> {
        let raw = self.store.get(&Self::key(order_number)).await?;
        match raw {
            None => Ok(None),
            Some(value) => match serde_json::from_str(&value) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!(
                        "Dropping corrupt ledger entry for {}: {}",
                        order_number, e
                    );
                    Ok(None)
                }
            },
        }
    }

    /// All live records for one customer. Corrupt entries are skipped, not
    /// fatal.
    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<PendingPaymentRecord>, ServiceError> {
        let keys = self.store.keys(KEY_PREFIX).await?;
        let mut records = Vec::new();
        for key in keys {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<PendingPaymentRecord>(&raw) {
                Ok(record) if record.customer_id == customer_id => records.push(record),
                Ok(_) => {}
                Err(e) => warn!("Skipping corrupt ledger entry at {}: {}", key, e),
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    pub async fn clear(&self, order_number: &str) -> Result<(), ServiceError> {
        self.store.remove(&Self::key(order_number)).await
    }

    /// Removes every record belonging to the customer.
    pub async fn clear_all_for_customer(&self, customer_id: Uuid) -> Result<usize, ServiceError> {
        let records = self.list_for_customer(customer_id).await?;
        let keys: Vec<String> = records.iter().map(|r| Self::key(&r.order_number)).collect();
        self.store.remove_many(&keys).await?;
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ledger() -> PendingPaymentLedger {
        PendingPaymentLedger::new(Arc::new(InMemoryLedgerStore::new()))
    }

    fn record(customer_id: Uuid, order_number: &str, kind: PendingPaymentKind) -> PendingPaymentRecord {
        PendingPaymentRecord {
            order_id: Uuid::new_v4(),
            order_number: order_number.to_string(),
            customer_id,
            kind,
            amount: dec!(100.00),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_then_lookup_round_trips() {
        let ledger = ledger();
        let customer = Uuid::new_v4();
        let rec = record(customer, "FG-1-aaaa", PendingPaymentKind::Advance);
        ledger.record(&rec).await.unwrap();

        let found = ledger.lookup("FG-1-aaaa").await.unwrap().unwrap();
        assert_eq!(found.order_id, rec.order_id);
        assert_eq!(found.kind, PendingPaymentKind::Advance);
    }

    #[tokio::test]
    async fn lookup_of_unknown_order_is_none() {
        assert!(ledger().lookup("FG-0-none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_customer() {
        let ledger = ledger();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        ledger
            .record(&record(alice, "FG-1-aaaa", PendingPaymentKind::Full))
            .await
            .unwrap();
        ledger
            .record(&record(bob, "FG-2-bbbb", PendingPaymentKind::Full))
            .await
            .unwrap();

        let listed = ledger.list_for_customer(alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].order_number, "FG-1-aaaa");
    }

    #[tokio::test]
    async fn clear_removes_the_record_from_listing() {
        let ledger = ledger();
        let customer = Uuid::new_v4();
        ledger
            .record(&record(customer, "FG-3-cccc", PendingPaymentKind::Full))
            .await
            .unwrap();
        ledger.clear("FG-3-cccc").await.unwrap();

        assert!(ledger.lookup("FG-3-cccc").await.unwrap().is_none());
        assert!(ledger.list_for_customer(customer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_all_removes_only_that_customers_records() {
        let ledger = ledger();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        ledger
            .record(&record(alice, "FG-4-dddd", PendingPaymentKind::Full))
            .await
            .unwrap();
        ledger
            .record(&record(alice, "FG-5-eeee", PendingPaymentKind::Advance))
            .await
            .unwrap();
        ledger
            .record(&record(bob, "FG-6-ffff", PendingPaymentKind::Full))
            .await
            .unwrap();

        let removed = ledger.clear_all_for_customer(alice).await.unwrap();
        assert_eq!(removed, 2);
        assert!(ledger.list_for_customer(alice).await.unwrap().is_empty());
        assert_eq!(ledger.list_for_customer(bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_entries_are_skipped_when_listing() {
        let store = Arc::new(InMemoryLedgerStore::new());
        store
            .set("pending_payment:FG-7-garbled", "{not json")
            .await
            .unwrap();
        let ledger = PendingPaymentLedger::new(store);
        let customer = Uuid::new_v4();
        ledger
            .record(&record(customer, "FG-8-good", PendingPaymentKind::Full))
            .await
            .unwrap();

        let listed = ledger.list_for_customer(customer).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].order_number, "FG-8-good");
        assert!(ledger.lookup("FG-7-garbled").await.unwrap().is_none());
    }
}
