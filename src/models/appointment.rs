use crate::{CustomerId, StaffId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Haircut,
    Beard,
    Both,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Haircut => "haircut",
            ServiceKind::Beard => "beard",
            ServiceKind::Both => "both",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServiceKind::Haircut => "Haircut",
            ServiceKind::Beard => "Beard trim",
            ServiceKind::Both => "Haircut + beard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "haircut" => Some(ServiceKind::Haircut),
            "beard" => Some(ServiceKind::Beard),
            "both" => Some(ServiceKind::Both),
            _ => None,
        }
    }

    pub fn all() -> [ServiceKind; 3] {
        [ServiceKind::Haircut, ServiceKind::Beard, ServiceKind::Both]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }

    /// Terminal statuses admit no further transition; a customer who
    /// wants another visit books a new appointment.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Completed)
    }
}

/// One booked visit. Fixed 60 minute duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub staff_id: StaffId,
    pub service: ServiceKind,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

pub const APPOINTMENT_MINUTES: i64 = 60;

impl Appointment {
    pub fn end_at(&self) -> DateTime<Utc> {
        self.scheduled_at + chrono::Duration::minutes(APPOINTMENT_MINUTES)
    }

    /// Still counts against the one-appointment-per-customer invariant.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Occupies its slot for availability purposes. Completed visits
    /// keep their slot (they happened); only cancellation frees it.
    pub fn occupies_slot(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }

    /// Half-open interval overlap against another 60 minute window
    /// starting at `other_start`. Back-to-back slots do not overlap.
    pub fn overlaps_window(&self, other_start: DateTime<Utc>) -> bool {
        let other_end = other_start + chrono::Duration::minutes(APPOINTMENT_MINUTES);
        self.scheduled_at < other_end && other_start < self.end_at()
    }

    /// First 8 hex chars of the id, the handle staff use in chat.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

/// Snapshot moved out of the live table by the expiry sweep. At most one
/// per customer identity; each sweep overwrites the previous snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedAppointment {
    pub customer_id: CustomerId,
    pub appointment: Appointment,
    pub archived_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment_at(iso: &str) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            customer_id: "+5491112345678".into(),
            customer_name: "Ana".into(),
            staff_id: "alex".into(),
            service: ServiceKind::Haircut,
            scheduled_at: iso.parse().unwrap(),
            status: AppointmentStatus::Confirmed,
            created_at: "2026-03-01T12:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn adjacent_windows_do_not_overlap() {
        let appt = appointment_at("2026-03-10T14:00:00Z");
        assert!(!appt.overlaps_window("2026-03-10T15:00:00Z".parse().unwrap()));
        assert!(!appt.overlaps_window("2026-03-10T13:00:00Z".parse().unwrap()));
    }

    #[test]
    fn same_and_partial_windows_overlap() {
        let appt = appointment_at("2026-03-10T14:00:00Z");
        assert!(appt.overlaps_window("2026-03-10T14:00:00Z".parse().unwrap()));
        assert!(appt.overlaps_window("2026-03-10T14:30:00Z".parse().unwrap()));
        assert!(appt.overlaps_window("2026-03-10T13:30:00Z".parse().unwrap()));
    }

    #[test]
    fn terminal_statuses() {
        assert!(AppointmentStatus::Cancelled.is_terminal());
        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(!AppointmentStatus::Pending.is_terminal());
        assert!(!AppointmentStatus::Confirmed.is_terminal());
    }

    #[test]
    fn cancelled_frees_slot_but_completed_does_not() {
        let mut appt = appointment_at("2026-03-10T14:00:00Z");
        appt.status = AppointmentStatus::Cancelled;
        assert!(!appt.occupies_slot());
        appt.status = AppointmentStatus::Completed;
        assert!(appt.occupies_slot());
        assert!(!appt.is_open());
    }
}
