use {super::status::CanonicalStatus, uuid::Uuid};

/// One applied status change, appended to `payment_status_history`.
#[derive(Debug, Clone)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub reference: String,
    pub from_status: CanonicalStatus,
    pub to_status: CanonicalStatus,
    pub actor: String,
    pub detail: serde_json::Value,
}
