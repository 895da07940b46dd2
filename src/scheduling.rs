use crate::error::{Error, Result};
use crate::models::{Appointment, Staff};
use crate::store::{AppointmentStore, BlockedIntervalStore, StaffDirectory};
use crate::time::TimeProvider;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use std::sync::Arc;

/// One bookable 60 minute start on a given date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub hour: u32,
    pub time: NaiveTime,
    pub instant: DateTime<Utc>,
}

impl Slot {
    /// Selection id the chat channel echoes back, "HH:MM".
    pub fn selection_id(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}

/// Turns working hours, booked appointments and blocked intervals into
/// the conflict-free slot set for a (staff, date) pair.
pub struct SlotAvailabilityEngine {
    appointments: Arc<dyn AppointmentStore>,
    blocked: Arc<dyn BlockedIntervalStore>,
    staff: Arc<dyn StaffDirectory>,
    time: TimeProvider,
}

impl SlotAvailabilityEngine {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        blocked: Arc<dyn BlockedIntervalStore>,
        staff: Arc<dyn StaffDirectory>,
        time: TimeProvider,
    ) -> Self {
        Self {
            appointments,
            blocked,
            staff,
            time,
        }
    }

    /// Ordered bookable slots for a staff member on a calendar date in
    /// business time. Today's slots whose hour has begun are dropped;
    /// slots overlapping a non-cancelled appointment or covered by a
    /// blocked interval are subtracted.
    pub async fn available_slots(&self, staff_id: &str, date: NaiveDate) -> Result<Vec<Slot>> {
        let staff = self.active_staff(staff_id).await?;
        let today = self.time.today();
        if date < today {
            return Err(Error::validation("date is in the past"));
        }

        let cutoff_hour = if date == today {
            Some(self.time.current_hour())
        } else {
            None
        };

        let appointments = self.day_appointments(&staff, date).await?;
        let blocked = self.blocked.find_for_staff_on(&staff.id, date).await?;

        let mut slots = Vec::new();
        for (hour, time) in staff.hours.slot_times() {
            // A slot is never offered once its hour has begun.
            if let Some(current) = cutoff_hour {
                if hour <= current {
                    continue;
                }
            }
            if blocked.iter().any(|i| i.covers(date, time)) {
                continue;
            }
            let instant = match self.time.instant_at(date, time) {
                Ok(instant) => instant,
                // Skipped wall time (DST gap); nothing bookable there.
                Err(Error::Validation(_)) => continue,
                Err(e) => return Err(e),
            };
            if appointments.iter().any(|a| a.overlaps_window(instant)) {
                continue;
            }
            slots.push(Slot {
                hour,
                time,
                instant,
            });
        }
        Ok(slots)
    }

    /// Single-instant availability check, the same rules as
    /// `available_slots` without generating the full day. The booking
    /// commit still relies on the store's atomic create as the final
    /// authority.
    pub async fn is_slot_free(&self, staff_id: &str, instant: DateTime<Utc>) -> Result<bool> {
        let staff = self.active_staff(staff_id).await?;
        if !self.time.is_future(instant) {
            return Ok(false);
        }

        let local = self.time.local(instant);
        let date = local.date_naive();
        let time = local.time();
        if !staff.hours.contains_hour(local.hour()) {
            return Ok(false);
        }
        if date == self.time.today() && local.hour() <= self.time.current_hour() {
            return Ok(false);
        }

        let blocked = self.blocked.find_for_staff_on(&staff.id, date).await?;
        if blocked.iter().any(|i| i.covers(date, time)) {
            return Ok(false);
        }

        let window_from = instant - Duration::minutes(60);
        let window_to = instant + Duration::minutes(60);
        let nearby = self
            .appointments
            .find_by_staff_and_range(&staff.id, window_from, window_to)
            .await?;
        Ok(!nearby
            .iter()
            .any(|a| a.occupies_slot() && a.overlaps_window(instant)))
    }

    /// Read-only booked view for the admin panel: every non-cancelled
    /// appointment for the staff member on that date, ordered by time.
    pub async fn booked_slots(&self, staff_id: &str, date: NaiveDate) -> Result<Vec<Appointment>> {
        let staff = self
            .staff
            .get(staff_id)
            .await?
            .ok_or_else(|| Error::not_found("staff"))?;
        let appointments = self.day_appointments(&staff, date).await?;
        Ok(appointments
            .into_iter()
            .filter(|a| a.occupies_slot())
            .collect())
    }

    async fn active_staff(&self, staff_id: &str) -> Result<Staff> {
        let staff = self
            .staff
            .get(staff_id)
            .await?
            .ok_or_else(|| Error::not_found("staff"))?;
        if !staff.active {
            return Err(Error::not_found("staff"));
        }
        staff.hours.validate()?;
        Ok(staff)
    }

    async fn day_appointments(&self, staff: &Staff, date: NaiveDate) -> Result<Vec<Appointment>> {
        // Widen the range by an hour each side so appointments straddling
        // midnight in UTC terms still show up for the overlap test.
        let day_start = self
            .time
            .instant_at(date, NaiveTime::MIN)
            .unwrap_or_else(|_| self.time.now_utc());
        let from = day_start - Duration::hours(1);
        let to = day_start + Duration::hours(25);
        self.appointments
            .find_by_staff_and_range(&staff.id, from, to)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AppointmentStatus, BlockReason, BlockedInterval, ServiceKind, Staff, WorkingHours,
    };
    use crate::store::{
        MemoryAppointmentStore, MemoryBlockedIntervalStore, MemoryStaffDirectory,
    };
    use crate::time::ManualClock;
    use chrono_tz::Tz;
    use uuid::Uuid;

    struct Fixture {
        engine: SlotAvailabilityEngine,
        appointments: Arc<MemoryAppointmentStore>,
        blocked: Arc<MemoryBlockedIntervalStore>,
        time: TimeProvider,
        clock: Arc<ManualClock>,
    }

    // Business tz is UTC-3; 2026-03-10T11:30Z is 08:30 local, before opening.
    fn fixture() -> Fixture {
        let tz: Tz = "America/Argentina/Buenos_Aires".parse().unwrap();
        let clock = Arc::new(ManualClock::new("2026-03-10T11:30:00Z".parse().unwrap()));
        let time = TimeProvider::with_clock(tz, clock.clone());
        let appointments = Arc::new(MemoryAppointmentStore::new());
        let blocked = Arc::new(MemoryBlockedIntervalStore::new());
        let staff = Arc::new(MemoryStaffDirectory::new(vec![Staff::new(
            "alex",
            "alex",
            "Alex",
            "unused-hash",
            WorkingHours::new(9, 17).unwrap(),
        )]));
        let engine = SlotAvailabilityEngine::new(
            appointments.clone(),
            blocked.clone(),
            staff,
            time.clone(),
        );
        Fixture {
            engine,
            appointments,
            blocked,
            time,
            clock,
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    async fn book(fixture: &Fixture, customer: &str, date: NaiveDate, hour: u32) -> Appointment {
        let instant = fixture
            .time
            .instant_at(date, NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
            .unwrap();
        fixture
            .appointments
            .create(Appointment {
                id: Uuid::new_v4(),
                customer_id: customer.to_string(),
                customer_name: "Test".to_string(),
                staff_id: "alex".to_string(),
                service: ServiceKind::Haircut,
                scheduled_at: instant,
                status: AppointmentStatus::Confirmed,
                created_at: fixture.time.now_utc(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn full_day_before_opening_offers_every_working_hour() {
        let fixture = fixture();
        let slots = fixture.engine.available_slots("alex", date(10)).await.unwrap();
        let hours: Vec<u32> = slots.iter().map(|s| s.hour).collect();
        assert_eq!(hours, vec![9, 10, 11, 12, 13, 14, 15, 16]);
    }

    #[tokio::test]
    async fn today_hides_hours_that_have_begun() {
        let fixture = fixture();
        // 14:00 local on booking day.
        fixture.clock.set("2026-03-10T17:00:00Z".parse().unwrap());
        let slots = fixture.engine.available_slots("alex", date(10)).await.unwrap();
        let hours: Vec<u32> = slots.iter().map(|s| s.hour).collect();
        assert_eq!(hours, vec![15, 16]);
    }

    #[tokio::test]
    async fn booked_hour_disappears_for_second_customer() {
        let fixture = fixture();
        book(&fixture, "+541111111", date(10), 14).await;
        let slots = fixture.engine.available_slots("alex", date(10)).await.unwrap();
        let hours: Vec<u32> = slots.iter().map(|s| s.hour).collect();
        assert_eq!(hours, vec![9, 10, 11, 12, 13, 15, 16]);
    }

    #[tokio::test]
    async fn cancelled_appointment_releases_its_hour() {
        let fixture = fixture();
        let appt = book(&fixture, "+541111111", date(10), 14).await;
        fixture
            .appointments
            .update_status(appt.id, AppointmentStatus::Cancelled)
            .await
            .unwrap();
        let slots = fixture.engine.available_slots("alex", date(10)).await.unwrap();
        assert!(slots.iter().any(|s| s.hour == 14));
    }

    #[tokio::test]
    async fn recurring_block_applies_to_every_future_date() {
        let fixture = fixture();
        fixture
            .blocked
            .create(
                BlockedInterval::recurring(
                    "alex",
                    NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                    NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
                    BlockReason::Lunch,
                )
                .unwrap(),
            )
            .await
            .unwrap();
        for day in [10, 11, 20] {
            let slots = fixture.engine.available_slots("alex", date(day)).await.unwrap();
            assert!(
                !slots.iter().any(|s| s.hour == 12),
                "12:00 offered on day {}",
                day
            );
            assert!(slots.iter().any(|s| s.hour == 11));
            assert!(slots.iter().any(|s| s.hour == 13));
        }
    }

    #[tokio::test]
    async fn one_off_block_applies_to_its_date_only() {
        let fixture = fixture();
        fixture
            .blocked
            .create(
                BlockedInterval::one_off(
                    "alex",
                    date(11),
                    NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                    NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
                    BlockReason::Personal,
                )
                .unwrap(),
            )
            .await
            .unwrap();
        let blocked_day = fixture.engine.available_slots("alex", date(11)).await.unwrap();
        assert!(!blocked_day.iter().any(|s| s.hour == 15));
        let other_day = fixture.engine.available_slots("alex", date(12)).await.unwrap();
        assert!(other_day.iter().any(|s| s.hour == 15));
    }

    #[tokio::test]
    async fn unblock_restores_the_hour() {
        let fixture = fixture();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let one = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
        fixture
            .blocked
            .create(BlockedInterval::one_off("alex", date(11), noon, one, BlockReason::Lunch).unwrap())
            .await
            .unwrap();
        assert!(!fixture
            .engine
            .available_slots("alex", date(11))
            .await
            .unwrap()
            .iter()
            .any(|s| s.hour == 12));
        fixture.blocked.delete_by_slot("alex", date(11), noon).await.unwrap();
        assert!(fixture
            .engine
            .available_slots("alex", date(11))
            .await
            .unwrap()
            .iter()
            .any(|s| s.hour == 12));
    }

    #[tokio::test]
    async fn is_slot_free_mirrors_the_day_view() {
        let fixture = fixture();
        book(&fixture, "+541111111", date(10), 14).await;
        let booked = fixture
            .time
            .instant_at(date(10), NaiveTime::from_hms_opt(14, 0, 0).unwrap())
            .unwrap();
        let free = fixture
            .time
            .instant_at(date(10), NaiveTime::from_hms_opt(15, 0, 0).unwrap())
            .unwrap();
        let outside = fixture
            .time
            .instant_at(date(10), NaiveTime::from_hms_opt(18, 0, 0).unwrap())
            .unwrap();
        assert!(!fixture.engine.is_slot_free("alex", booked).await.unwrap());
        assert!(fixture.engine.is_slot_free("alex", free).await.unwrap());
        assert!(!fixture.engine.is_slot_free("alex", outside).await.unwrap());
    }

    #[tokio::test]
    async fn past_dates_and_unknown_staff_are_rejected() {
        let fixture = fixture();
        assert!(matches!(
            fixture.engine.available_slots("alex", date(9)).await.unwrap_err(),
            Error::Validation(_)
        ));
        assert!(matches!(
            fixture.engine.available_slots("nobody", date(10)).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
