//! Validated statement data returned by a successful extraction.

use serde::{Deserialize, Serialize};

/// One line item on the statement.
///
/// `amount` is signed: positive for credits/deposits, negative for
/// debits/withdrawals. The LLM is told this convention; nothing here tries
/// to infer a sign from the description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub date: String,
    pub description: String,
    pub amount: f64,
}

/// A statement that passed validation.
///
/// `is_reconciled` is always computed by
/// [`crate::pipeline::validate::reconcile`]; a value supplied by the LLM is
/// never kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRecord {
    pub name: String,
    pub address: String,
    pub document_date: String,
    pub start_balance: f64,
    pub end_balance: f64,
    /// Document order.
    pub transactions: Vec<TransactionRecord>,
    pub is_reconciled: bool,
}

impl StatementRecord {
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Sum of all transaction amounts.
    pub fn transaction_total(&self) -> f64 {
        self.transactions.iter().map(|t| t.amount).sum()
    }
}
