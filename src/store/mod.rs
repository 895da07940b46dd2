use crate::error::Result;
use crate::models::{
    Appointment, AppointmentStatus, ArchivedAppointment, BlockedInterval, ClientNote, ClientRecord,
    Staff,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

mod memory;

pub use memory::{
    MemoryAppointmentStore, MemoryBlockedIntervalStore, MemoryClientDirectory,
    MemoryStaffDirectory,
};

/// Persistence port for appointments. The store is the final authority on
/// both uniqueness invariants: `create` must atomically reject a second
/// open appointment for the same customer identity and a second
/// non-cancelled appointment overlapping the same (staff, instant)
/// window, surfacing `Error::Conflict` to the losing caller. The checks
/// flows perform beforehand are an optimization, not the guarantee.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn create(&self, appointment: Appointment) -> Result<Appointment>;

    /// Applies a status transition. Transitions out of a terminal status
    /// are rejected with `Error::Conflict`.
    async fn update_status(&self, id: Uuid, status: AppointmentStatus) -> Result<Appointment>;

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>>;

    /// The customer's open (pending or confirmed) appointment, if any.
    async fn find_active_by_customer(&self, customer_id: &str) -> Result<Option<Appointment>>;

    /// All appointments for a staff member scheduled in `[from, to)`,
    /// any status, ordered by scheduled instant.
    async fn find_by_staff_and_range(
        &self,
        staff_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>>;

    /// Resolves the short id staff type in chat. `Error::NotFound` when
    /// nothing matches, `Error::Conflict` when the prefix is ambiguous.
    async fn find_by_id_prefix(&self, prefix: &str) -> Result<Appointment>;

    /// Moves every past-due appointment out of the live table: cancelled
    /// ones are dropped, the rest become the customer's single history
    /// record (overwritten per sweep). Returns how many were processed.
    async fn archive_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    async fn history_for(&self, customer_id: &str) -> Result<Option<ArchivedAppointment>>;

    /// Number of appointments (any status) scheduled in `[from, to)`.
    async fn count_in_range(
        &self,
        staff_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize>;
}

/// Persistence port for staff exclusion windows.
#[async_trait]
pub trait BlockedIntervalStore: Send + Sync {
    /// Rejects an exact duplicate (same staff, date and start) with
    /// `Error::Conflict`.
    async fn create(&self, interval: BlockedInterval) -> Result<BlockedInterval>;

    async fn delete_by_id(&self, id: Uuid) -> Result<BlockedInterval>;

    /// Removes the one-off interval at (staff, date, start), or failing
    /// that the recurring interval with that start time.
    async fn delete_by_slot(
        &self,
        staff_id: &str,
        date: NaiveDate,
        start: chrono::NaiveTime,
    ) -> Result<BlockedInterval>;

    /// One-off intervals for the date plus every recurring interval,
    /// ordered by start time.
    async fn find_for_staff_on(&self, staff_id: &str, date: NaiveDate)
        -> Result<Vec<BlockedInterval>>;
}

/// Read/write access to the fixed staff roster.
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn get(&self, staff_id: &str) -> Result<Option<Staff>>;

    /// Case-insensitive alias lookup.
    async fn find_by_alias(&self, alias: &str) -> Result<Option<Staff>>;

    async fn list_active(&self) -> Result<Vec<Staff>>;

    async fn update_pin_hash(&self, staff_id: &str, pin_hash: String) -> Result<()>;

    async fn set_active(&self, staff_id: &str, active: bool) -> Result<()>;
}

/// Client roster, auto-populated by successful bookings.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Inserts on first visit; afterwards refreshes the display name,
    /// bumps the appointment count and the last-booked instant.
    async fn upsert_visit(
        &self,
        customer_id: &str,
        display_name: &str,
        booked_at: DateTime<Utc>,
    ) -> Result<ClientRecord>;

    async fn get(&self, customer_id: &str) -> Result<Option<ClientRecord>>;

    async fn add_note(&self, customer_id: &str, note: ClientNote) -> Result<()>;
}
