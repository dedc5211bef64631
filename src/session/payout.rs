//! Payout capability used when a verified action is settled.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Proof that a payout was accepted by a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    /// Sink-specific reference (transaction id, ledger entry, ...).
    pub reference: String,
    /// Who was paid.
    pub recipient: String,
    /// Amount paid.
    pub amount: f64,
}

/// Why a payout did not go through.
#[derive(Debug, Clone, PartialEq)]
pub enum PayoutError {
    /// The sink refused the payout; retrying will not help.
    Rejected(String),
    /// The sink could not be reached; the payout may be retried.
    Unavailable(String),
}

impl PayoutError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PayoutError::Unavailable(_))
    }
}

impl fmt::Display for PayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoutError::Rejected(reason) => write!(f, "payout rejected: {}", reason),
            PayoutError::Unavailable(reason) => write!(f, "payout sink unavailable: {}", reason),
        }
    }
}

impl std::error::Error for PayoutError {}

/// Something that can pay a recipient.
pub trait PayoutSink {
    /// Pay `amount` to `recipient`.
    fn send(&mut self, recipient: &str, amount: f64) -> Result<PayoutReceipt, PayoutError>;
}

/// Send a payout, retrying retryable failures up to `attempts` times in total.
pub fn send_with_retry<S: PayoutSink + ?Sized>(
    sink: &mut S,
    recipient: &str,
    amount: f64,
    attempts: usize,
) -> Result<PayoutReceipt, PayoutError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match sink.send(recipient, amount) {
            Ok(receipt) => return Ok(receipt),
            Err(e) if e.is_retryable() && attempt < attempts => {
                log::warn!(
                    "payout of {} to {} failed (attempt {}/{}): {}",
                    amount,
                    recipient,
                    attempt,
                    attempts,
                    e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// In-memory sink that books every payout into a ledger.
#[derive(Debug, Clone, Default)]
pub struct LedgerSink {
    entries: Vec<PayoutReceipt>,
    balances: FxHashMap<String, f64>,
}

impl LedgerSink {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every booked payout in order.
    pub fn entries(&self) -> &[PayoutReceipt] {
        &self.entries
    }

    /// Total paid to `recipient`.
    pub fn balance(&self, recipient: &str) -> f64 {
        self.balances.get(recipient).copied().unwrap_or(0.0)
    }

    /// Total paid to everyone.
    pub fn total_paid(&self) -> f64 {
        self.entries.iter().map(|e| e.amount).sum()
    }
}

impl PayoutSink for LedgerSink {
    fn send(&mut self, recipient: &str, amount: f64) -> Result<PayoutReceipt, PayoutError> {
        if !(amount.is_finite() && amount >= 0.0) {
            return Err(PayoutError::Rejected(format!("invalid amount {}", amount)));
        }
        let receipt = PayoutReceipt {
            reference: format!("ledger-{}", self.entries.len() + 1),
            recipient: recipient.to_string(),
            amount,
        };
        *self.balances.entry(recipient.to_string()).or_insert(0.0) += amount;
        self.entries.push(receipt.clone());
        Ok(receipt)
    }
}
