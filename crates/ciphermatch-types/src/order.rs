//! Order types for the CipherMatch engine.
//!
//! An order carries its public routing data in the clear (trader, pair,
//! escrow amount, deadline) and its price-discovery inputs as ciphertexts.
//! The ciphertext type `C` is supplied by the encrypted-arithmetic backend.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, OrderId, TokenPair, TraderId};

/// Lifecycle status of an order.
///
/// `Pending` is the only non-terminal status. Transitions out of it are
/// irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// The confidential part of an order: the inputs to price discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedIntent<C> {
    /// Amount of `token_in` offered.
    pub amount_in: C,
    /// Minimum acceptable amount of `token_out`.
    pub min_amount_out: C,
    /// Maximum tolerated slippage, carried for the trader's own audit.
    pub max_slippage: C,
}

/// A new-order request as it arrives at intake.
#[derive(Debug, Clone)]
pub struct SubmitOrder<C> {
    pub trader: TraderId,
    pub token_in: String,
    pub token_out: String,
    pub intent: EncryptedIntent<C>,
    /// Plaintext amount of `token_in` to lock. Must correspond to `intent.amount_in`.
    pub escrow_amount: Decimal,
    pub deadline: DateTime<Utc>,
}

impl<C> SubmitOrder<C> {
    #[must_use]
    pub fn pair(&self) -> TokenPair {
        TokenPair::new(self.token_in.clone(), self.token_out.clone())
    }
}

/// Core order record held in the engine's order table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order<C> {
    pub id: OrderId,
    pub trader: TraderId,
    pub pair: TokenPair,
    pub intent: EncryptedIntent<C>,
    /// Plaintext `token_in` amount held in escrow while `Pending`.
    pub escrowed: Decimal,
    pub deadline: DateTime<Utc>,
    pub submit_time: DateTime<Utc>,
    pub status: OrderStatus,
    /// The non-terminal batch this order belongs to, if any.
    pub batch_id: Option<BatchId>,
    /// How many times settlement carried this order into a later batch.
    pub carry_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl<C> Order<C> {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// An order is expired once `now` reaches its deadline.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Settlement ordering key: arrival time, then id for ties.
    #[must_use]
    pub fn arrival_key(&self) -> (DateTime<Utc>, OrderId) {
        (self.submit_time, self.id)
    }

    /// Public projection that never exposes encrypted fields.
    #[must_use]
    pub fn view(&self) -> OrderView {
        OrderView {
            order_id: self.id,
            trader: self.trader,
            token_in: self.pair.token_in.clone(),
            token_out: self.pair.token_out.clone(),
            deadline: self.deadline,
            status: self.status,
        }
    }
}

/// Public order status as returned by `order_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub trader: TraderId,
    pub token_in: String,
    pub token_out: String,
    pub deadline: DateTime<Utc>,
    pub status: OrderStatus,
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order<Decimal> {
    /// A pending order whose "ciphertexts" are the plaintext values.
    pub fn dummy(id: u64, amount_in: Decimal, min_amount_out: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId(id),
            trader: TraderId::new(),
            pair: TokenPair::new("USDC", "WETH"),
            intent: EncryptedIntent {
                amount_in,
                min_amount_out,
                max_slippage: Decimal::new(5, 2),
            },
            escrowed: amount_in,
            deadline: now + chrono::Duration::hours(1),
            submit_time: now,
            status: OrderStatus::Pending,
            batch_id: None,
            carry_count: 0,
            updated_at: now,
        }
    }
}
