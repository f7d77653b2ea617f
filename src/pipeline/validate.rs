//! Schema validation and balance reconciliation.
//!
//! [`validate`] walks the decoded JSON and collects *every* violated
//! constraint before failing, so one error message shows everything that
//! is wrong with a malformed reply. [`reconcile`] then recomputes
//! `isReconciled` from the balances; whatever the LLM claimed is ignored.

use crate::error::StageError;
use crate::output::{StatementRecord, TransactionRecord};
use serde_json::{Map, Value};

/// Absolute tolerance, in currency units, for reconciliation rounding.
pub const RECONCILIATION_TOLERANCE: f64 = 0.01;

/// Accumulates violations while walking the JSON.
#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, msg: String) {
        self.0.push(msg);
    }

    fn non_empty_string(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> String {
        match obj.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::String(_)) => {
                self.push(format!("{path} should not be empty"));
                String::new()
            }
            Some(Value::Null) | None => {
                self.push(format!("{path} should not be empty"));
                self.push(format!("{path} must be a string"));
                String::new()
            }
            Some(_) => {
                self.push(format!("{path} must be a string"));
                String::new()
            }
        }
    }

    fn number(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> f64 {
        match obj.get(key).and_then(Value::as_f64) {
            Some(n) if n.is_finite() => n,
            _ => {
                self.push(format!(
                    "{path} must be a number conforming to the specified constraints"
                ));
                0.0
            }
        }
    }
}

/// Check `raw` against the statement schema and convert it.
///
/// Required: non-empty string `name`, `address`, `documentDate`; numeric
/// `startBalance`, `endBalance`; array `transactions` whose items each have
/// non-empty string `date`, `description` and numeric `amount`.
/// `isReconciled` is not required; it is recomputed by [`reconcile`].
pub fn validate(raw: &Value) -> Result<StatementRecord, StageError> {
    let Some(obj) = raw.as_object() else {
        return Err(StageError::Validation {
            violations: vec!["statement must be an object".to_string()],
        });
    };

    let mut v = Violations::default();

    let name = v.non_empty_string(obj, "name", "name");
    let address = v.non_empty_string(obj, "address", "address");
    let document_date = v.non_empty_string(obj, "documentDate", "documentDate");
    let start_balance = v.number(obj, "startBalance", "startBalance");
    let end_balance = v.number(obj, "endBalance", "endBalance");

    let transactions = match obj.get("transactions") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| validate_transaction(item, i, &mut v))
            .collect(),
        _ => {
            v.push("transactions must be an array".to_string());
            Vec::new()
        }
    };

    if !v.0.is_empty() {
        return Err(StageError::Validation { violations: v.0 });
    }

    Ok(StatementRecord {
        name,
        address,
        document_date,
        start_balance,
        end_balance,
        transactions,
        is_reconciled: false,
    })
}

fn validate_transaction(
    item: &Value,
    index: usize,
    v: &mut Violations,
) -> Option<TransactionRecord> {
    let Some(obj) = item.as_object() else {
        v.push(format!("transactions.{index} must be an object"));
        return None;
    };

    let before = v.0.len();
    let date = v.non_empty_string(obj, "date", &format!("transactions.{index}.date"));
    let description =
        v.non_empty_string(obj, "description", &format!("transactions.{index}.description"));
    let amount = v.number(obj, "amount", &format!("transactions.{index}.amount"));

    (v.0.len() == before).then_some(TransactionRecord {
        date,
        description,
        amount,
    })
}

/// Whether `start + Σ amounts` lands on `end` within [`RECONCILIATION_TOLERANCE`].
pub fn balances_reconcile(start_balance: f64, transaction_total: f64, end_balance: f64) -> bool {
    (start_balance + transaction_total - end_balance).abs() < RECONCILIATION_TOLERANCE
}

/// Overwrite `is_reconciled` from the balances and transactions.
pub fn reconcile(mut record: StatementRecord) -> StatementRecord {
    record.is_reconciled = balances_reconcile(
        record.start_balance,
        record.transaction_total(),
        record.end_balance,
    );
    record
}
