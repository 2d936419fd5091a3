//! Append-only audit trail.
//!
//! Every core operation emits one record: the action name, the acting
//! organization, a structured detail payload, and the result cardinality.
//! Auditing is observability, not control flow: an append failure is
//! logged and never propagated to the caller.

use crate::store::RecordStore;
use crate::types::AuditRecord;
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

/// Emits audit records through the record store.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn RecordStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Append one record. Best-effort: failures are logged, not returned.
    pub async fn record(
        &self,
        org_id: &str,
        action: &str,
        details: serde_json::Value,
        result_count: Option<u32>,
    ) {
        let record = AuditRecord {
            org_id: org_id.to_string(),
            action: action.to_string(),
            details,
            result_count,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.store.append_audit(record).await {
            error!(org_id, action, error = %e, "failed to append audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn records_carry_action_and_details() {
        let store = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(store.clone());

        trail
            .record(
                "org_a",
                "list_campaigns",
                serde_json::json!({"attack_vector": "ai_phishing"}),
                Some(4),
            )
            .await;

        let records = store.audit_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "list_campaigns");
        assert_eq!(records[0].org_id, "org_a");
        assert_eq!(records[0].result_count, Some(4));
        assert_eq!(records[0].details["attack_vector"], "ai_phishing");
    }
}
