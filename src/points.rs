use std::collections::VecDeque;

use crate::entity::{GiftId, TransactionId};

/// How many sent gifts the in-call history keeps. Older entries are evicted
/// oldest-first.
pub const GIFT_LOG_CAPACITY: usize = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GiftError {
    #[error("gift {0} is not in the catalog")]
    UnknownGift(GiftId),
    #[error("insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: u64, required: u64 },
    /// Gifts can only be sent on a connected call.
    #[error("call is not connected")]
    NotConnected,
}

/// Spendable point balance. Never goes negative: a debit either succeeds in
/// full or leaves the balance untouched.
#[derive(Debug, Clone)]
pub struct PointLedger {
    balance: u64,
}

impl PointLedger {
    pub fn new(initial_balance: u64) -> Self {
        Self {
            balance: initial_balance,
        }
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Withdraws `amount` if covered, returning the new balance.
    pub fn debit(&mut self, amount: u64) -> Result<u64, GiftError> {
        match self.balance.checked_sub(amount) {
            Some(remaining) => {
                self.balance = remaining;
                Ok(remaining)
            }
            None => Err(GiftError::InsufficientPoints {
                balance: self.balance,
                required: amount,
            }),
        }
    }

    /// Deposits earned points, returning the new balance.
    pub fn credit(&mut self, amount: u64) -> u64 {
        self.balance = self.balance.saturating_add(amount);
        self.balance
    }
}

/// One successfully sent gift. `sent_at_secs` is seconds into the call at
/// the time of sending.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GiftTransaction {
    pub id: TransactionId,
    pub gift_id: GiftId,
    pub point_cost: u64,
    pub sent_at_secs: u64,
}

/// Bounded record of sent gifts plus the running totals the call summary
/// reports. Only the most recent [`GIFT_LOG_CAPACITY`] transactions are kept.
#[derive(Debug, Default)]
pub struct GiftTransactionLog {
    entries: VecDeque<GiftTransaction>,
    sent_count: u64,
    points_spent: u64,
}

impl GiftTransactionLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(GIFT_LOG_CAPACITY),
            sent_count: 0,
            points_spent: 0,
        }
    }

    pub fn record(&mut self, gift_id: GiftId, point_cost: u64, sent_at_secs: u64) -> GiftTransaction {
        let txn = GiftTransaction {
            id: TransactionId::new(),
            gift_id,
            point_cost,
            sent_at_secs,
        };
        self.entries.push_back(txn.clone());
        while self.entries.len() > GIFT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.sent_count += 1;
        self.points_spent = self.points_spent.saturating_add(point_cost);
        txn
    }

    /// Most recent first.
    pub fn recent(&self) -> Vec<GiftTransaction> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total gifts sent over the whole call, not just the retained window.
    pub fn sent_count(&self) -> u64 {
        self.sent_count
    }

    /// Total points spent over the whole call.
    pub fn points_spent(&self) -> u64 {
        self.points_spent
    }
}
