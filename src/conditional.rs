//! Dependent close orders.
//!
//! Stop-loss and take-profit orders are managed outside the engine. The engine only tells
//! the manager when a position slot empties so any close orders hanging off it can be
//! dropped. That call is made after the closing transaction commits, never from inside it.

use crate::types::{AccountId, PositionKey, Price, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::Mutex;

pub trait CloseOrderManager: Send + Sync + Debug {
    fn cancel_dependent_close_orders(&self, key: PositionKey);
}

/// Unique identifier for conditional orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionalOrderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionalType {
    StopLoss,
    TakeProfit,
}

/// A close order waiting on its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseOrder {
    pub id: ConditionalOrderId,
    pub key: PositionKey,
    pub order_type: ConditionalType,
    pub trigger_price: Price,
    pub created_at: Timestamp,
}

/// Cancellations kept in the book's log; older entries fall off the front.
pub const CANCELLATION_LOG_LIMIT: usize = 1_024;

#[derive(Debug, Default)]
struct BookInner {
    orders: HashMap<PositionKey, Vec<CloseOrder>>,
    cancellations: VecDeque<(PositionKey, usize)>,
    next_id: u64,
}

/// In-memory close-order book. Stores orders per position slot and keeps a bounded log of
/// the latest cancellation requests it has served.
#[derive(Debug, Default)]
pub struct CloseOrderBook {
    inner: Mutex<BookInner>,
}

impl CloseOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(
        &self,
        key: PositionKey,
        order_type: ConditionalType,
        trigger_price: Price,
        created_at: Timestamp,
    ) -> Option<ConditionalOrderId> {
        let mut inner = self.inner.lock().ok()?;
        inner.next_id += 1;
        let id = ConditionalOrderId(inner.next_id);
        inner.orders.entry(key).or_default().push(CloseOrder {
            id,
            key,
            order_type,
            trigger_price,
            created_at,
        });
        Some(id)
    }

    pub fn orders_for(&self, key: PositionKey) -> Vec<CloseOrder> {
        self.inner
            .lock()
            .map(|inner| inner.orders.get(&key).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn orders_for_account(&self, owner: AccountId) -> Vec<CloseOrder> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .orders
                    .iter()
                    .filter(|(key, _)| key.owner == owner)
                    .flat_map(|(_, orders)| orders.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Latest cancellations served, oldest first, with how many orders each removed.
    pub fn cancellations(&self) -> Vec<(PositionKey, usize)> {
        self.inner
            .lock()
            .map(|inner| inner.cancellations.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.orders.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CloseOrderManager for CloseOrderBook {
    fn cancel_dependent_close_orders(&self, key: PositionKey) {
        if let Ok(mut inner) = self.inner.lock() {
            let removed = inner.orders.remove(&key).map_or(0, |orders| orders.len());
            if inner.cancellations.len() == CANCELLATION_LOG_LIMIT {
                inner.cancellations.pop_front();
            }
            inner.cancellations.push_back((key, removed));
        }
    }
}

/// Manager for deployments without close orders.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCloseOrders;

impl CloseOrderManager for NoCloseOrders {
    fn cancel_dependent_close_orders(&self, _key: PositionKey) {}
}
