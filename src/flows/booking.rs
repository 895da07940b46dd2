use super::{date_rows, more_row, paginate, parse_date, FlowOutcome, MORE_ROW_ID};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::InboundEvent;
use crate::messaging::{Choice, ListRow, ListSection, Messenger};
use crate::models::{Appointment, AppointmentStatus, ServiceKind};
use crate::scheduling::{Slot, SlotAvailabilityEngine};
use crate::store::{AppointmentStore, ClientDirectory, StaffDirectory};
use crate::time::TimeProvider;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStep {
    Name,
    Staff,
    Service,
    Date,
    Time,
}

/// Accumulated state of one customer's booking dialogue.
#[derive(Debug, Clone)]
pub struct BookingSession {
    pub step: BookingStep,
    /// Who the appointment is for. Equal to the chat identity except in
    /// book-for-another mode.
    pub target_identity: String,
    pub name: Option<String>,
    pub staff_id: Option<String>,
    pub service: Option<ServiceKind>,
    pub date: Option<NaiveDate>,
    /// Slot list shown at the Time step; refreshed on date selection
    /// and after a lost race.
    pub slots: Vec<Slot>,
    pub page: usize,
}

impl BookingSession {
    fn new(target_identity: String) -> Self {
        Self {
            step: BookingStep::Name,
            target_identity,
            name: None,
            staff_id: None,
            service: None,
            date: None,
            slots: Vec::new(),
            page: 0,
        }
    }
}

/// Drives the customer-facing booking dialogue.
pub struct BookingFlow {
    engine: Arc<SlotAvailabilityEngine>,
    appointments: Arc<dyn AppointmentStore>,
    staff: Arc<dyn StaffDirectory>,
    clients: Arc<dyn ClientDirectory>,
    messenger: Arc<dyn Messenger>,
    time: TimeProvider,
    config: Arc<Config>,
}

impl BookingFlow {
    pub fn new(
        engine: Arc<SlotAvailabilityEngine>,
        appointments: Arc<dyn AppointmentStore>,
        staff: Arc<dyn StaffDirectory>,
        clients: Arc<dyn ClientDirectory>,
        messenger: Arc<dyn Messenger>,
        time: TimeProvider,
        config: Arc<Config>,
    ) -> Self {
        Self {
            engine,
            appointments,
            staff,
            clients,
            messenger,
            time,
            config,
        }
    }

    /// Opens a booking dialogue for `target_identity` (normally the chat
    /// identity itself). Returns `None` without starting when the target
    /// already holds an active appointment.
    pub async fn start(
        &self,
        identity: &str,
        target_identity: &str,
    ) -> Result<Option<BookingSession>> {
        if let Some(existing) = self
            .appointments
            .find_active_by_customer(target_identity)
            .await?
        {
            let local = self.time.local(existing.scheduled_at);
            self.messenger
                .send_text(
                    identity,
                    &format!(
                        "There is already an appointment for {} on {} at {}. Cancel it first if you need a different time.",
                        existing.customer_name,
                        local.format("%a %d %b"),
                        local.format("%H:%M"),
                    ),
                )
                .await?;
            return Ok(None);
        }
        self.messenger
            .send_text(identity, "Let's book you in. What's your name?")
            .await?;
        Ok(Some(BookingSession::new(target_identity.to_string())))
    }

    pub async fn handle(
        &self,
        identity: &str,
        session: BookingSession,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<BookingSession>> {
        match session.step {
            BookingStep::Name => self.on_name(identity, session, event).await,
            BookingStep::Staff => self.on_staff(identity, session, event).await,
            BookingStep::Service => self.on_service(identity, session, event).await,
            BookingStep::Date => self.on_date(identity, session, event).await,
            BookingStep::Time => self.on_time(identity, session, event).await,
        }
    }

    async fn on_name(
        &self,
        identity: &str,
        mut session: BookingSession,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<BookingSession>> {
        let name = event.payload.trim();
        let chars = name.chars().count();
        if chars < self.config.booking.name_min_chars || chars > self.config.booking.name_max_chars
        {
            self.messenger
                .send_text(
                    identity,
                    &format!(
                        "That name doesn't look right — please send between {} and {} characters.",
                        self.config.booking.name_min_chars, self.config.booking.name_max_chars
                    ),
                )
                .await?;
            return Ok(FlowOutcome::Continue(session));
        }
        session.name = Some(name.to_string());
        session.step = BookingStep::Staff;
        self.send_staff_list(identity, None).await?;
        Ok(FlowOutcome::Continue(session))
    }

    async fn on_staff(
        &self,
        identity: &str,
        mut session: BookingSession,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<BookingSession>> {
        let roster = self.staff.list_active().await?;
        let Some(chosen) = roster.iter().find(|s| s.id == event.payload.trim()) else {
            self.send_staff_list(identity, Some("That wasn't one of the options."))
                .await?;
            return Ok(FlowOutcome::Continue(session));
        };
        session.staff_id = Some(chosen.id.clone());
        session.step = BookingStep::Service;
        self.send_service_choices(identity, None).await?;
        Ok(FlowOutcome::Continue(session))
    }

    async fn on_service(
        &self,
        identity: &str,
        mut session: BookingSession,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<BookingSession>> {
        let Some(service) = ServiceKind::parse(event.payload.trim()) else {
            self.send_service_choices(identity, Some("That wasn't one of the options."))
                .await?;
            return Ok(FlowOutcome::Continue(session));
        };
        session.service = Some(service);
        session.step = BookingStep::Date;
        self.send_date_list(identity, None).await?;
        Ok(FlowOutcome::Continue(session))
    }

    async fn on_date(
        &self,
        identity: &str,
        mut session: BookingSession,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<BookingSession>> {
        let Some(date) = parse_date(&event.payload) else {
            self.send_date_list(identity, Some("Please pick one of the listed days."))
                .await?;
            return Ok(FlowOutcome::Continue(session));
        };
        let staff_id = session
            .staff_id
            .clone()
            .ok_or_else(|| Error::validation("no staff selected yet"))?;
        let slots = match self.engine.available_slots(&staff_id, date).await {
            Ok(slots) => slots,
            Err(Error::Validation(_)) => {
                self.send_date_list(identity, Some("Please pick one of the listed days."))
                    .await?;
                return Ok(FlowOutcome::Continue(session));
            }
            Err(e) => return Err(e),
        };
        if slots.is_empty() {
            self.send_date_list(
                identity,
                Some("No free times left that day — try another one."),
            )
            .await?;
            return Ok(FlowOutcome::Continue(session));
        }
        session.date = Some(date);
        session.slots = slots;
        session.page = 0;
        session.step = BookingStep::Time;
        self.send_time_page(identity, &session, None).await?;
        Ok(FlowOutcome::Continue(session))
    }

    async fn on_time(
        &self,
        identity: &str,
        mut session: BookingSession,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<BookingSession>> {
        let payload = event.payload.trim();
        if payload == MORE_ROW_ID {
            session.page += 1;
            self.send_time_page(identity, &session, None).await?;
            return Ok(FlowOutcome::Continue(session));
        }
        let Some(slot) = session
            .slots
            .iter()
            .find(|s| s.selection_id() == payload)
            .cloned()
        else {
            self.send_time_page(identity, &session, Some("That wasn't one of the options."))
                .await?;
            return Ok(FlowOutcome::Continue(session));
        };

        // The list the customer picked from may be minutes old; check
        // again before committing. The store's atomic create is still
        // the final word against a concurrent winner.
        let staff_id = session
            .staff_id
            .clone()
            .ok_or_else(|| Error::validation("no staff selected yet"))?;
        if let Some(existing) = self
            .appointments
            .find_active_by_customer(&session.target_identity)
            .await?
        {
            let local = self.time.local(existing.scheduled_at);
            self.messenger
                .send_text(
                    identity,
                    &format!(
                        "An appointment already exists for {} at {} — one active booking at a time.",
                        local.format("%a %d %b"),
                        local.format("%H:%M"),
                    ),
                )
                .await?;
            return Ok(FlowOutcome::Done);
        }
        if !self.engine.is_slot_free(&staff_id, slot.instant).await? {
            return self.reoffer_after_race(identity, session).await;
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            customer_id: session.target_identity.clone(),
            customer_name: session.name.clone().unwrap_or_default(),
            staff_id: staff_id.clone(),
            service: session.service.unwrap_or(ServiceKind::Haircut),
            scheduled_at: slot.instant,
            status: AppointmentStatus::Confirmed,
            created_at: self.time.now_utc(),
        };
        let appointment = match self.appointments.create(appointment).await {
            Ok(created) => created,
            Err(Error::Conflict(_)) => {
                return self.reoffer_after_race(identity, session).await;
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self
            .clients
            .upsert_visit(
                &appointment.customer_id,
                &appointment.customer_name,
                appointment.created_at,
            )
            .await
        {
            // The booking stands either way; the roster catches up on
            // the next visit.
            warn!(customer = %appointment.customer_id, "client upsert failed: {}", e);
        }

        let staff_name = self
            .staff
            .get(&staff_id)
            .await?
            .map(|s| s.display_name)
            .unwrap_or(staff_id);
        let local = self.time.local(appointment.scheduled_at);
        info!(
            appointment = %appointment.short_id(),
            customer = %appointment.customer_id,
            "booking committed"
        );
        self.messenger
            .send_text(
                identity,
                &format!(
                    "Booked! {} with {} on {} at {}. See you then.",
                    appointment.service.label(),
                    staff_name,
                    local.format("%a %d %b"),
                    local.format("%H:%M"),
                ),
            )
            .await?;
        Ok(FlowOutcome::Done)
    }

    /// The picked slot vanished between listing and commit. Re-prompt
    /// the same step with fresh slots, never silently pick another.
    async fn reoffer_after_race(
        &self,
        identity: &str,
        mut session: BookingSession,
    ) -> Result<FlowOutcome<BookingSession>> {
        let staff_id = session
            .staff_id
            .clone()
            .ok_or_else(|| Error::validation("no staff selected yet"))?;
        let date = session
            .date
            .ok_or_else(|| Error::validation("no date selected yet"))?;
        let slots = self.engine.available_slots(&staff_id, date).await?;
        if slots.is_empty() {
            session.slots.clear();
            session.step = BookingStep::Date;
            self.send_date_list(
                identity,
                Some("Sorry — that time was just taken and the day is now full. Pick another day."),
            )
            .await?;
            return Ok(FlowOutcome::Continue(session));
        }
        session.slots = slots;
        session.page = 0;
        self.send_time_page(
            identity,
            &session,
            Some("Sorry — that time was just taken. Here is what's still free."),
        )
        .await?;
        Ok(FlowOutcome::Continue(session))
    }

    async fn send_staff_list(&self, identity: &str, notice: Option<&str>) -> Result<()> {
        let roster = self.staff.list_active().await?;
        if roster.is_empty() {
            return Err(Error::conflict("nobody is taking bookings right now"));
        }
        let rows: Vec<ListRow> = roster
            .iter()
            .take(crate::messaging::MAX_LIST_ROWS)
            .map(|s| ListRow::new(s.id.clone(), s.display_name.clone()))
            .collect();
        let body = match notice {
            Some(notice) => format!("{} Who would you like?", notice),
            None => "Who would you like?".to_string(),
        };
        self.messenger
            .send_list(
                identity,
                &body,
                "Choose",
                &[ListSection::new("Our team", rows)],
            )
            .await
    }

    async fn send_service_choices(&self, identity: &str, notice: Option<&str>) -> Result<()> {
        let choices: Vec<Choice> = ServiceKind::all()
            .iter()
            .map(|s| Choice::new(s.as_str(), s.label()))
            .collect();
        let body = match notice {
            Some(notice) => format!("{} Which service?", notice),
            None => "Which service?".to_string(),
        };
        self.messenger.send_choices(identity, &body, &choices).await
    }

    async fn send_date_list(&self, identity: &str, notice: Option<&str>) -> Result<()> {
        let rows = date_rows(&self.time, self.config.booking.days_ahead);
        let body = match notice {
            Some(notice) => format!("{} Which day?", notice),
            None => "Which day?".to_string(),
        };
        self.messenger
            .send_list(identity, &body, "Choose", &[ListSection::new("Days", rows)])
            .await
    }

    async fn send_time_page(
        &self,
        identity: &str,
        session: &BookingSession,
        notice: Option<&str>,
    ) -> Result<()> {
        let (window, has_more) = paginate(
            &session.slots,
            session.page,
            self.config.booking.page_rows,
        );
        let mut rows: Vec<ListRow> = window
            .iter()
            .map(|slot| ListRow::new(slot.selection_id(), slot.time.format("%H:%M").to_string()))
            .collect();
        if has_more {
            let shown = session.page * (self.config.booking.page_rows - 1) + rows.len();
            rows.push(more_row(&format!(
                "{} more times",
                session.slots.len().saturating_sub(shown)
            )));
        }
        let body = match notice {
            Some(notice) => format!("{} What time?", notice),
            None => "What time?".to_string(),
        };
        self.messenger
            .send_list(
                identity,
                &body,
                "Choose",
                &[ListSection::new("Free times", rows)],
            )
            .await
    }
}
