//! Audit seam for the routing layer's audit sink.
//!
//! Every successful mutation reports a before/after snapshot. The recorder is
//! fire-and-forget from the ledger's perspective: implementations must not
//! fail the business operation, so the trait is infallible and callers never
//! await delivery.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Already-authenticated operator identity, used for audit attribution only.
/// Access checks live in the routing layer, not in this core.
#[derive(Debug, Clone)]
pub struct Operator {
    pub id: i64,
    pub name: String,
}

impl Operator {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

pub trait AuditRecorder: Send + Sync {
    fn record(
        &self,
        operator: &Operator,
        action: &str,
        entity: &str,
        entity_id: i64,
        before: Option<Value>,
        after: Option<Value>,
    );
}

/// Default recorder that writes audit lines to the log.
pub struct LogAuditRecorder;

impl AuditRecorder for LogAuditRecorder {
    fn record(
        &self,
        operator: &Operator,
        action: &str,
        entity: &str,
        entity_id: i64,
        before: Option<Value>,
        after: Option<Value>,
    ) {
        info!(
            operator_id = operator.id,
            operator = %operator.name,
            action,
            entity,
            entity_id,
            before = %before.unwrap_or(serde_json::Value::Null),
            after = %after.unwrap_or(serde_json::Value::Null),
            "audit"
        );
    }
}

/// JSON snapshot of an entity for audit before/after fields. Serialization
/// failure degrades to `None` rather than failing the mutation.
pub fn snapshot<T: Serialize>(entity: &T) -> Option<Value> {
    serde_json::to_value(entity).ok()
}
