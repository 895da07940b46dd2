use super::{AppointmentStore, BlockedIntervalStore, ClientDirectory, StaffDirectory};
use crate::error::{Error, Result};
use crate::models::{
    Appointment, AppointmentStatus, ArchivedAppointment, BlockedInterval, ClientNote, ClientRecord,
    Staff,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// In-memory appointment store. Both uniqueness checks run under the one
/// store lock, which makes `create` the atomic conditional write the
/// concurrency model requires.
#[derive(Default)]
pub struct MemoryAppointmentStore {
    inner: Mutex<AppointmentsInner>,
}

#[derive(Default)]
struct AppointmentsInner {
    live: HashMap<Uuid, Appointment>,
    history: HashMap<String, ArchivedAppointment>,
}

impl MemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for MemoryAppointmentStore {
    async fn create(&self, appointment: Appointment) -> Result<Appointment> {
        let mut inner = self.inner.lock().await;
        if inner
            .live
            .values()
            .any(|a| a.customer_id == appointment.customer_id && a.is_open())
        {
            return Err(Error::conflict("customer already has an active appointment"));
        }
        if inner.live.values().any(|a| {
            a.staff_id == appointment.staff_id
                && a.occupies_slot()
                && a.overlaps_window(appointment.scheduled_at)
        }) {
            return Err(Error::conflict("slot unavailable"));
        }
        inner.live.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_status(&self, id: Uuid, status: AppointmentStatus) -> Result<Appointment> {
        let mut inner = self.inner.lock().await;
        let appointment = inner
            .live
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("appointment"))?;
        if appointment.status.is_terminal() {
            return Err(Error::conflict(format!(
                "appointment is already {}",
                appointment.status.as_str()
            )));
        }
        appointment.status = status;
        Ok(appointment.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>> {
        Ok(self.inner.lock().await.live.get(&id).cloned())
    }

    async fn find_active_by_customer(&self, customer_id: &str) -> Result<Option<Appointment>> {
        Ok(self
            .inner
            .lock()
            .await
            .live
            .values()
            .find(|a| a.customer_id == customer_id && a.is_open())
            .cloned())
    }

    async fn find_by_staff_and_range(
        &self,
        staff_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        let inner = self.inner.lock().await;
        let mut found: Vec<Appointment> = inner
            .live
            .values()
            .filter(|a| a.staff_id == staff_id && a.scheduled_at >= from && a.scheduled_at < to)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.scheduled_at);
        Ok(found)
    }

    async fn find_by_id_prefix(&self, prefix: &str) -> Result<Appointment> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.len() < 4 {
            return Err(Error::validation("appointment id is at least 4 characters"));
        }
        let inner = self.inner.lock().await;
        let mut matches = inner
            .live
            .values()
            .filter(|a| a.id.simple().to_string().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(found), None) => Ok(found.clone()),
            (Some(_), Some(_)) => Err(Error::conflict("appointment id is ambiguous")),
            (None, _) => Err(Error::not_found("appointment")),
        }
    }

    async fn archive_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let expired: Vec<Uuid> = inner
            .live
            .values()
            .filter(|a| a.scheduled_at < now)
            .map(|a| a.id)
            .collect();
        let mut processed = 0;
        for id in expired {
            if let Some(appointment) = inner.live.remove(&id) {
                processed += 1;
                if appointment.status != AppointmentStatus::Cancelled {
                    inner.history.insert(
                        appointment.customer_id.clone(),
                        ArchivedAppointment {
                            customer_id: appointment.customer_id.clone(),
                            appointment,
                            archived_at: now,
                        },
                    );
                }
            }
        }
        Ok(processed)
    }

    async fn history_for(&self, customer_id: &str) -> Result<Option<ArchivedAppointment>> {
        Ok(self.inner.lock().await.history.get(customer_id).cloned())
    }

    async fn count_in_range(
        &self,
        staff_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize> {
        let inner = self.inner.lock().await;
        Ok(inner
            .live
            .values()
            .filter(|a| a.staff_id == staff_id && a.scheduled_at >= from && a.scheduled_at < to)
            .count())
    }
}

#[derive(Default)]
pub struct MemoryBlockedIntervalStore {
    intervals: Mutex<HashMap<Uuid, BlockedInterval>>,
}

impl MemoryBlockedIntervalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockedIntervalStore for MemoryBlockedIntervalStore {
    async fn create(&self, interval: BlockedInterval) -> Result<BlockedInterval> {
        let mut intervals = self.intervals.lock().await;
        let duplicate = intervals.values().any(|i| {
            i.staff_id == interval.staff_id && i.date == interval.date && i.start == interval.start
        });
        if duplicate {
            return Err(Error::conflict("that hour is already blocked"));
        }
        intervals.insert(interval.id, interval.clone());
        Ok(interval)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<BlockedInterval> {
        self.intervals
            .lock()
            .await
            .remove(&id)
            .ok_or_else(|| Error::not_found("blocked interval"))
    }

    async fn delete_by_slot(
        &self,
        staff_id: &str,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<BlockedInterval> {
        let mut intervals = self.intervals.lock().await;
        let one_off = intervals
            .values()
            .find(|i| i.staff_id == staff_id && i.date == Some(date) && i.start == start)
            .map(|i| i.id);
        let target = one_off.or_else(|| {
            intervals
                .values()
                .find(|i| i.staff_id == staff_id && i.date.is_none() && i.start == start)
                .map(|i| i.id)
        });
        target
            .and_then(|id| intervals.remove(&id))
            .ok_or_else(|| Error::not_found("blocked interval"))
    }

    async fn find_for_staff_on(
        &self,
        staff_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<BlockedInterval>> {
        let intervals = self.intervals.lock().await;
        let mut found: Vec<BlockedInterval> = intervals
            .values()
            .filter(|i| i.staff_id == staff_id && (i.date.is_none() || i.date == Some(date)))
            .cloned()
            .collect();
        found.sort_by_key(|i| i.start);
        Ok(found)
    }
}

pub struct MemoryStaffDirectory {
    staff: Mutex<HashMap<String, Staff>>,
}

impl MemoryStaffDirectory {
    pub fn new(roster: Vec<Staff>) -> Self {
        info!(staff = roster.len(), "creating in-memory staff directory");
        let staff = roster.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            staff: Mutex::new(staff),
        }
    }
}

#[async_trait]
impl StaffDirectory for MemoryStaffDirectory {
    async fn get(&self, staff_id: &str) -> Result<Option<Staff>> {
        Ok(self.staff.lock().await.get(staff_id).cloned())
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Staff>> {
        let alias = alias.to_lowercase();
        Ok(self
            .staff
            .lock()
            .await
            .values()
            .find(|s| s.alias == alias)
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<Staff>> {
        let staff = self.staff.lock().await;
        let mut active: Vec<Staff> = staff.values().filter(|s| s.active).cloned().collect();
        active.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(active)
    }

    async fn update_pin_hash(&self, staff_id: &str, pin_hash: String) -> Result<()> {
        let mut staff = self.staff.lock().await;
        let member = staff
            .get_mut(staff_id)
            .ok_or_else(|| Error::not_found("staff"))?;
        member.pin_hash = pin_hash;
        Ok(())
    }

    async fn set_active(&self, staff_id: &str, active: bool) -> Result<()> {
        let mut staff = self.staff.lock().await;
        let member = staff
            .get_mut(staff_id)
            .ok_or_else(|| Error::not_found("staff"))?;
        member.active = active;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryClientDirectory {
    clients: Mutex<HashMap<String, ClientRecord>>,
}

impl MemoryClientDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientDirectory for MemoryClientDirectory {
    async fn upsert_visit(
        &self,
        customer_id: &str,
        display_name: &str,
        booked_at: DateTime<Utc>,
    ) -> Result<ClientRecord> {
        let mut clients = self.clients.lock().await;
        let record = clients
            .entry(customer_id.to_string())
            .and_modify(|c| {
                c.display_name = display_name.to_string();
                c.appointment_count += 1;
                c.last_booked_at = booked_at;
            })
            .or_insert_with(|| ClientRecord::first_visit(customer_id, display_name, booked_at));
        Ok(record.clone())
    }

    async fn get(&self, customer_id: &str) -> Result<Option<ClientRecord>> {
        Ok(self.clients.lock().await.get(customer_id).cloned())
    }

    async fn add_note(&self, customer_id: &str, note: ClientNote) -> Result<()> {
        let mut clients = self.clients.lock().await;
        let record = clients
            .get_mut(customer_id)
            .ok_or_else(|| Error::not_found("client"))?;
        record.notes.push(note);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockReason, ServiceKind};

    fn appointment(customer: &str, staff: &str, iso: &str) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            customer_id: customer.to_string(),
            customer_name: "Test".to_string(),
            staff_id: staff.to_string(),
            service: ServiceKind::Haircut,
            scheduled_at: iso.parse().unwrap(),
            status: AppointmentStatus::Confirmed,
            created_at: "2026-03-01T10:00:00Z".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn create_rejects_second_active_for_same_customer() {
        let store = MemoryAppointmentStore::new();
        store
            .create(appointment("+541111111", "alex", "2026-03-10T14:00:00Z"))
            .await
            .unwrap();
        let err = store
            .create(appointment("+541111111", "alex", "2026-03-11T15:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn create_rejects_overlapping_slot_for_same_staff() {
        let store = MemoryAppointmentStore::new();
        store
            .create(appointment("+541111111", "alex", "2026-03-10T14:00:00Z"))
            .await
            .unwrap();
        let err = store
            .create(appointment("+542222222", "alex", "2026-03-10T14:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        // Adjacent hour and other staff are both fine.
        store
            .create(appointment("+542222222", "alex", "2026-03-10T15:00:00Z"))
            .await
            .unwrap();
        store
            .create(appointment("+543333333", "maria", "2026-03-10T14:00:00Z"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_appointment_frees_customer_and_slot() {
        let store = MemoryAppointmentStore::new();
        let first = store
            .create(appointment("+541111111", "alex", "2026-03-10T14:00:00Z"))
            .await
            .unwrap();
        store
            .update_status(first.id, AppointmentStatus::Cancelled)
            .await
            .unwrap();
        store
            .create(appointment("+541111111", "alex", "2026-03-10T14:00:00Z"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn no_transition_out_of_terminal_status() {
        let store = MemoryAppointmentStore::new();
        let appt = store
            .create(appointment("+541111111", "alex", "2026-03-10T14:00:00Z"))
            .await
            .unwrap();
        store
            .update_status(appt.id, AppointmentStatus::Completed)
            .await
            .unwrap();
        let err = store
            .update_status(appt.id, AppointmentStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn archive_moves_past_due_and_is_idempotent() {
        let store = MemoryAppointmentStore::new();
        let past = store
            .create(appointment("+541111111", "alex", "2026-03-10T14:00:00Z"))
            .await
            .unwrap();
        store
            .create(appointment("+542222222", "alex", "2026-03-20T14:00:00Z"))
            .await
            .unwrap();
        let now: DateTime<Utc> = "2026-03-15T00:00:00Z".parse().unwrap();
        assert_eq!(store.archive_expired(now).await.unwrap(), 1);
        assert_eq!(store.archive_expired(now).await.unwrap(), 0);

        let archived = store.history_for("+541111111").await.unwrap().unwrap();
        assert_eq!(archived.appointment.id, past.id);
        assert!(store.get(past.id).await.unwrap().is_none());
        // The future appointment is untouched.
        assert!(store
            .find_active_by_customer("+542222222")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn archive_overwrites_previous_history_record() {
        let store = MemoryAppointmentStore::new();
        store
            .create(appointment("+541111111", "alex", "2026-03-10T14:00:00Z"))
            .await
            .unwrap();
        store
            .archive_expired("2026-03-11T00:00:00Z".parse().unwrap())
            .await
            .unwrap();
        let second = store
            .create(appointment("+541111111", "alex", "2026-03-17T14:00:00Z"))
            .await
            .unwrap();
        store
            .archive_expired("2026-03-18T00:00:00Z".parse().unwrap())
            .await
            .unwrap();
        let archived = store.history_for("+541111111").await.unwrap().unwrap();
        assert_eq!(archived.appointment.id, second.id);
    }

    #[tokio::test]
    async fn prefix_lookup_handles_missing_and_short_input() {
        let store = MemoryAppointmentStore::new();
        let appt = store
            .create(appointment("+541111111", "alex", "2026-03-10T14:00:00Z"))
            .await
            .unwrap();
        let found = store.find_by_id_prefix(&appt.short_id()).await.unwrap();
        assert_eq!(found.id, appt.id);
        assert!(matches!(
            store.find_by_id_prefix("ffffffff").await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            store.find_by_id_prefix("ab").await.unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[tokio::test]
    async fn blocked_store_round_trip() {
        let store = MemoryBlockedIntervalStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let one = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
        let interval = store
            .create(BlockedInterval::one_off("alex", date, noon, one, BlockReason::Lunch).unwrap())
            .await
            .unwrap();
        assert!(matches!(
            store
                .create(
                    BlockedInterval::one_off("alex", date, noon, one, BlockReason::Other).unwrap()
                )
                .await
                .unwrap_err(),
            Error::Conflict(_)
        ));
        let removed = store.delete_by_slot("alex", date, noon).await.unwrap();
        assert_eq!(removed.id, interval.id);
        assert!(store.find_for_staff_on("alex", date).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_by_id_removes_exactly_that_interval() {
        let store = MemoryBlockedIntervalStore::new();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let one = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
        let three = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
        let four = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
        let lunch = store
            .create(BlockedInterval::recurring("alex", noon, one, BlockReason::Lunch).unwrap())
            .await
            .unwrap();
        store
            .create(BlockedInterval::recurring("alex", three, four, BlockReason::Break).unwrap())
            .await
            .unwrap();
        store.delete_by_id(lunch.id).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let left = store.find_for_staff_on("alex", date).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].start, three);
        assert!(matches!(
            store.delete_by_id(lunch.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn recurring_intervals_show_on_every_date() {
        let store = MemoryBlockedIntervalStore::new();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let one = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
        store
            .create(BlockedInterval::recurring("alex", noon, one, BlockReason::Lunch).unwrap())
            .await
            .unwrap();
        for day in [10, 11, 25] {
            let date = NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
            assert_eq!(store.find_for_staff_on("alex", date).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn client_upsert_increments_count_and_updates_name() {
        let directory = MemoryClientDirectory::new();
        let first: DateTime<Utc> = "2026-03-01T10:00:00Z".parse().unwrap();
        let second: DateTime<Utc> = "2026-03-08T10:00:00Z".parse().unwrap();
        directory.upsert_visit("+541111111", "Ana", first).await.unwrap();
        let updated = directory
            .upsert_visit("+541111111", "Ana Maria", second)
            .await
            .unwrap();
        assert_eq!(updated.appointment_count, 2);
        assert_eq!(updated.display_name, "Ana Maria");
        assert_eq!(updated.last_booked_at, second);
    }
}
