use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Scheduled notification row; the delivery channel is a collaborator's
/// concern, the engine only flips `scheduled` to `sent` once due.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: u64,
    pub organization_id: u64,
    pub employee_id: Option<u64>,
    pub title: String,
    pub body: String,
    pub scheduled_at: NaiveDateTime,
    pub status: String,
    pub sent_at: Option<NaiveDateTime>,
}
