use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-text annotation a staff member attaches to a client, already
/// HTML-escaped and length-capped by the admin flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientNote {
    pub text: String,
    pub appointment_id: Option<Uuid>,
    pub author_staff_id: String,
    pub created_at: DateTime<Utc>,
}

/// Auto-registered on first booking, upserted on every successful one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub customer_id: crate::CustomerId,
    pub display_name: String,
    pub appointment_count: u64,
    pub last_booked_at: DateTime<Utc>,
    pub notes: Vec<ClientNote>,
}

impl ClientRecord {
    pub fn first_visit(
        customer_id: impl Into<String>,
        display_name: impl Into<String>,
        booked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            display_name: display_name.into(),
            appointment_count: 1,
            last_booked_at: booked_at,
            notes: Vec::new(),
        }
    }
}
