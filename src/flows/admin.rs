use super::{date_rows, more_row, paginate, parse_date, parse_hour, FlowOutcome, MORE_ROW_ID};
use crate::auth::{generate_pin, SecretHasher};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{EventKind, InboundEvent};
use crate::messaging::{ListRow, ListSection, Messenger};
use crate::models::{Appointment, AppointmentStatus, BlockReason, BlockedInterval, ClientNote};
use crate::scheduling::SlotAvailabilityEngine;
use crate::stats;
use crate::store::{
    AppointmentStore, BlockedIntervalStore, ClientDirectory, StaffDirectory,
};
use crate::time::TimeProvider;
use crate::utils::{escape_html, normalize_identity};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// `admin <alias> <pin> [action] [params...]`, case-insensitive. Text
/// that doesn't match is not an admin command and must fall through to
/// normal routing without comment, so the admin surface stays invisible.
static COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*admin\s+([a-z0-9]{2,20})\s+([0-9]{4,6})(?:\s+(.+?))?\s*$")
        .expect("admin command regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Panel,
    Today,
    Week,
    Cancel,
    Block,
    Unblock,
    Complete,
    Note,
    Stats,
    Help,
    Logout,
    Pin,
    PauseSelf,
    ResumeSelf,
}

impl AdminAction {
    /// Action words in English and Spanish. Anything unrecognized after
    /// a successful auth gets the help text.
    fn parse(word: &str) -> Self {
        match word {
            "panel" | "menu" => AdminAction::Panel,
            "today" | "hoy" => AdminAction::Today,
            "week" | "semana" => AdminAction::Week,
            "cancel" | "cancelar" => AdminAction::Cancel,
            "block" | "bloquear" => AdminAction::Block,
            "unblock" | "desbloquear" => AdminAction::Unblock,
            "complete" | "completar" => AdminAction::Complete,
            "note" | "nota" => AdminAction::Note,
            "stats" | "estadisticas" | "estadísticas" => AdminAction::Stats,
            "help" | "ayuda" => AdminAction::Help,
            "logout" | "salir" => AdminAction::Logout,
            "pin" => AdminAction::Pin,
            "off" | "pausa" => AdminAction::PauseSelf,
            "on" | "activar" => AdminAction::ResumeSelf,
            _ => AdminAction::Help,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCommand {
    pub alias: String,
    pub pin: String,
    pub action: AdminAction,
    pub args: Vec<String>,
}

/// Returns `None` for anything that isn't shaped like an admin command.
pub fn parse_admin_command(text: &str) -> Option<AdminCommand> {
    let captures = COMMAND_RE.captures(text)?;
    let alias = captures.get(1)?.as_str().to_lowercase();
    let pin = captures.get(2)?.as_str().to_string();
    let mut action = AdminAction::Panel;
    let mut args = Vec::new();
    if let Some(tail) = captures.get(3) {
        let mut words = tail.as_str().split_whitespace();
        if let Some(word) = words.next() {
            action = AdminAction::parse(&word.to_lowercase());
        }
        args = words.map(|w| w.to_string()).collect();
    }
    Some(AdminCommand {
        alias,
        pin,
        action,
        args,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOp {
    View,
    Block,
    Unblock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApptOp {
    Complete,
    Cancel,
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminState {
    Menu,
    ChoosingDate {
        op: DateOp,
    },
    ChoosingHour {
        op: DateOp,
        date: NaiveDate,
        page: usize,
    },
    ChoosingAppointment {
        op: ApptOp,
        page: usize,
    },
    AwaitingNote {
        customer_id: String,
        appointment_id: Option<Uuid>,
    },
}

/// Authenticated staff dialogue, opened by a valid admin command.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub staff_id: String,
    pub alias: String,
    pub state: AdminState,
}

pub struct AdminFlow {
    engine: Arc<SlotAvailabilityEngine>,
    appointments: Arc<dyn AppointmentStore>,
    blocked: Arc<dyn BlockedIntervalStore>,
    staff: Arc<dyn StaffDirectory>,
    clients: Arc<dyn ClientDirectory>,
    messenger: Arc<dyn Messenger>,
    hasher: Arc<dyn SecretHasher>,
    time: TimeProvider,
    config: Arc<Config>,
}

impl AdminFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<SlotAvailabilityEngine>,
        appointments: Arc<dyn AppointmentStore>,
        blocked: Arc<dyn BlockedIntervalStore>,
        staff: Arc<dyn StaffDirectory>,
        clients: Arc<dyn ClientDirectory>,
        messenger: Arc<dyn Messenger>,
        hasher: Arc<dyn SecretHasher>,
        time: TimeProvider,
        config: Arc<Config>,
    ) -> Self {
        Self {
            engine,
            appointments,
            blocked,
            staff,
            clients,
            messenger,
            hasher,
            time,
            config,
        }
    }

    /// Verifies the alias and PIN. Unknown alias and wrong PIN both come
    /// back as `None`; the caller sends one generic failure for either,
    /// so the command gives away nothing about which aliases exist.
    pub async fn authenticate(&self, command: &AdminCommand) -> Result<Option<AdminSession>> {
        let member = match self.staff.find_by_alias(&command.alias).await? {
            Some(member) => member,
            None => {
                warn!(alias = %command.alias, "admin auth failed: unknown alias");
                return Ok(None);
            }
        };
        if !self.hasher.verify(&command.pin, &member.pin_hash) {
            warn!(alias = %command.alias, "admin auth failed: wrong pin");
            return Ok(None);
        }
        info!(staff = %member.id, "admin session opened");
        Ok(Some(AdminSession {
            staff_id: member.id,
            alias: member.alias,
            state: AdminState::Menu,
        }))
    }

    /// Runs one action for an authenticated session, either straight
    /// from the command tail or from a menu selection.
    pub async fn dispatch(
        &self,
        identity: &str,
        mut session: AdminSession,
        action: AdminAction,
        args: &[String],
    ) -> Result<FlowOutcome<AdminSession>> {
        session.state = AdminState::Menu;
        match action {
            AdminAction::Panel => {
                self.send_panel(identity, &session).await?;
                Ok(FlowOutcome::Continue(session))
            }
            AdminAction::Today => {
                let today = self.time.today();
                let view = self.render_day(&session, today).await?;
                self.messenger.send_text(identity, &view).await?;
                Ok(FlowOutcome::Continue(session))
            }
            AdminAction::Week => {
                let view = self.render_week(&session).await?;
                self.messenger.send_text(identity, &view).await?;
                Ok(FlowOutcome::Continue(session))
            }
            AdminAction::Complete | AdminAction::Cancel | AdminAction::Note => {
                let op = match action {
                    AdminAction::Complete => ApptOp::Complete,
                    AdminAction::Cancel => ApptOp::Cancel,
                    _ => ApptOp::Note,
                };
                match args.first() {
                    Some(arg) => self.appointment_arg(identity, session, op, arg).await,
                    None => self.open_appointment_picker(identity, session, op, 0).await,
                }
            }
            AdminAction::Block => match self.parse_block_args(args) {
                Ok(Some((date, time, reason, recurring))) => {
                    self.apply_block(identity, session, date, time, reason, recurring)
                        .await
                }
                Ok(None) => {
                    session.state = AdminState::ChoosingDate { op: DateOp::Block };
                    self.send_date_picker(identity, "Block an hour on which day?")
                        .await?;
                    Ok(FlowOutcome::Continue(session))
                }
                Err(e @ Error::Validation(_)) => {
                    self.messenger.send_text(identity, &e.to_string()).await?;
                    Ok(FlowOutcome::Continue(session))
                }
                Err(e) => Err(e),
            },
            AdminAction::Unblock => match self.parse_unblock_args(args) {
                Ok(Some((date, time))) => self.apply_unblock(identity, session, date, time).await,
                Ok(None) => {
                    session.state = AdminState::ChoosingDate { op: DateOp::Unblock };
                    self.send_date_picker(identity, "Unblock an hour on which day?")
                        .await?;
                    Ok(FlowOutcome::Continue(session))
                }
                Err(e @ Error::Validation(_)) => {
                    self.messenger.send_text(identity, &e.to_string()).await?;
                    Ok(FlowOutcome::Continue(session))
                }
                Err(e) => Err(e),
            },
            AdminAction::Stats => {
                let view = self.render_stats(&session).await?;
                self.messenger.send_text(identity, &view).await?;
                Ok(FlowOutcome::Continue(session))
            }
            AdminAction::Help => {
                self.messenger.send_text(identity, HELP_TEXT).await?;
                Ok(FlowOutcome::Continue(session))
            }
            AdminAction::Logout => {
                self.messenger.send_text(identity, "Logged out.").await?;
                Ok(FlowOutcome::Done)
            }
            AdminAction::Pin => {
                let pin = generate_pin(self.config.admin.pin_digits);
                let hash = self.hasher.hash(&pin)?;
                self.staff.update_pin_hash(&session.staff_id, hash).await?;
                info!(staff = %session.staff_id, "pin regenerated");
                self.messenger
                    .send_text(
                        identity,
                        &format!("Your new PIN is {}. It replaces the old one now.", pin),
                    )
                    .await?;
                Ok(FlowOutcome::Continue(session))
            }
            AdminAction::PauseSelf | AdminAction::ResumeSelf => {
                let active = action == AdminAction::ResumeSelf;
                self.staff.set_active(&session.staff_id, active).await?;
                info!(staff = %session.staff_id, active, "active flag updated");
                let text = if active {
                    "You are taking bookings again."
                } else {
                    "You are hidden from new bookings. Existing appointments stay."
                };
                self.messenger.send_text(identity, text).await?;
                Ok(FlowOutcome::Continue(session))
            }
        }
    }

    /// One inbound event for an already-open admin session.
    pub async fn handle(
        &self,
        identity: &str,
        session: AdminSession,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<AdminSession>> {
        match session.state.clone() {
            AdminState::AwaitingNote {
                customer_id,
                appointment_id,
            } => {
                self.on_note_text(identity, session, &customer_id, appointment_id, event)
                    .await
            }
            AdminState::Menu => self.on_menu(identity, session, event).await,
            AdminState::ChoosingDate { op } => self.on_date_choice(identity, session, op, event).await,
            AdminState::ChoosingHour { op, date, page } => {
                self.on_hour_choice(identity, session, op, date, page, event)
                    .await
            }
            AdminState::ChoosingAppointment { op, page } => {
                self.on_appointment_choice(identity, session, op, page, event)
                    .await
            }
        }
    }

    async fn on_menu(
        &self,
        identity: &str,
        session: AdminSession,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<AdminSession>> {
        let payload = event.payload.trim().to_lowercase();
        if event.kind == EventKind::Selection && payload == "day" {
            let mut session = session;
            session.state = AdminState::ChoosingDate { op: DateOp::View };
            self.send_date_picker(identity, "Which day?").await?;
            return Ok(FlowOutcome::Continue(session));
        }
        let action = AdminAction::parse(&payload);
        self.dispatch(identity, session, action, &[]).await
    }

    async fn on_date_choice(
        &self,
        identity: &str,
        mut session: AdminSession,
        op: DateOp,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<AdminSession>> {
        let Some(date) = parse_date(&event.payload) else {
            self.send_date_picker(identity, "Please pick one of the listed days.")
                .await?;
            return Ok(FlowOutcome::Continue(session));
        };
        match op {
            DateOp::View => {
                let view = self.render_day(&session, date).await?;
                session.state = AdminState::Menu;
                self.messenger.send_text(identity, &view).await?;
                Ok(FlowOutcome::Continue(session))
            }
            DateOp::Block | DateOp::Unblock => {
                session.state = AdminState::ChoosingHour { op, date, page: 0 };
                self.send_hour_picker(identity, &mut session, op, date, 0).await?;
                Ok(FlowOutcome::Continue(session))
            }
        }
    }

    async fn on_hour_choice(
        &self,
        identity: &str,
        mut session: AdminSession,
        op: DateOp,
        date: NaiveDate,
        page: usize,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<AdminSession>> {
        let payload = event.payload.trim();
        if payload == MORE_ROW_ID {
            session.state = AdminState::ChoosingHour {
                op,
                date,
                page: page + 1,
            };
            self.send_hour_picker(identity, &mut session, op, date, page + 1)
                .await?;
            return Ok(FlowOutcome::Continue(session));
        }
        let Some(time) = parse_hour(payload) else {
            self.send_hour_picker(identity, &mut session, op, date, page).await?;
            return Ok(FlowOutcome::Continue(session));
        };
        match op {
            DateOp::Block => {
                self.apply_block(identity, session, Some(date), time, BlockReason::Other, false)
                    .await
            }
            DateOp::Unblock => self.apply_unblock(identity, session, Some(date), time).await,
            DateOp::View => {
                session.state = AdminState::Menu;
                self.send_panel(identity, &session).await?;
                Ok(FlowOutcome::Continue(session))
            }
        }
    }

    async fn on_appointment_choice(
        &self,
        identity: &str,
        mut session: AdminSession,
        op: ApptOp,
        page: usize,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<AdminSession>> {
        let payload = event.payload.trim();
        if payload == MORE_ROW_ID {
            return self
                .open_appointment_picker(identity, session, op, page + 1)
                .await;
        }
        self.appointment_arg(identity, session, op, payload).await
    }

    /// Resolves a short-id argument and runs the per-appointment action.
    async fn appointment_arg(
        &self,
        identity: &str,
        mut session: AdminSession,
        op: ApptOp,
        arg: &str,
    ) -> Result<FlowOutcome<AdminSession>> {
        // `note +549...` targets a client directly, unlinked to any
        // appointment. The leading `+` keeps phone numbers apart from
        // all-digit appointment ids.
        if op == ApptOp::Note && arg.starts_with('+') {
            if let Ok(customer_id) = normalize_identity(arg) {
                session.state = AdminState::AwaitingNote {
                    customer_id,
                    appointment_id: None,
                };
                self.messenger
                    .send_text(identity, NOTE_PROMPT)
                    .await?;
                return Ok(FlowOutcome::Continue(session));
            }
        }
        let appointment = match self.appointments.find_by_id_prefix(arg).await {
            Ok(appointment) => appointment,
            Err(e @ (Error::NotFound(_) | Error::Validation(_) | Error::Conflict(_))) => {
                session.state = AdminState::Menu;
                self.messenger.send_text(identity, &e.to_string()).await?;
                return Ok(FlowOutcome::Continue(session));
            }
            Err(e) => return Err(e),
        };
        self.require_own_appointment(&session, &appointment)?;
        match op {
            ApptOp::Complete => {
                self.apply_status(identity, session, &appointment, AppointmentStatus::Completed)
                    .await
            }
            ApptOp::Cancel => {
                self.apply_status(identity, session, &appointment, AppointmentStatus::Cancelled)
                    .await
            }
            ApptOp::Note => {
                session.state = AdminState::AwaitingNote {
                    customer_id: appointment.customer_id.clone(),
                    appointment_id: Some(appointment.id),
                };
                self.messenger.send_text(identity, NOTE_PROMPT).await?;
                Ok(FlowOutcome::Continue(session))
            }
        }
    }

    async fn apply_status(
        &self,
        identity: &str,
        mut session: AdminSession,
        appointment: &Appointment,
        status: AppointmentStatus,
    ) -> Result<FlowOutcome<AdminSession>> {
        session.state = AdminState::Menu;
        let updated = match self.appointments.update_status(appointment.id, status).await {
            Ok(updated) => updated,
            Err(e @ (Error::Conflict(_) | Error::NotFound(_))) => {
                self.messenger.send_text(identity, &e.to_string()).await?;
                return Ok(FlowOutcome::Continue(session));
            }
            Err(e) => return Err(e),
        };
        let local = self.time.local(updated.scheduled_at);
        info!(
            appointment = %updated.short_id(),
            staff = %session.staff_id,
            status = status.as_str(),
            "appointment updated by staff"
        );
        if status == AppointmentStatus::Cancelled {
            // Best effort: the cancellation stands even if the customer
            // can't be reached.
            let notice = format!(
                "Your appointment on {} at {} was cancelled by the shop. Message us to rebook.",
                local.format("%a %d %b"),
                local.format("%H:%M"),
            );
            if let Err(e) = self.messenger.send_text(&updated.customer_id, &notice).await {
                warn!(
                    customer = %updated.customer_id,
                    "failed to notify customer of cancellation: {}",
                    e
                );
            }
        }
        self.messenger
            .send_text(
                identity,
                &format!(
                    "{} — {} at {} marked {}.",
                    updated.customer_name,
                    local.format("%a %d %b"),
                    local.format("%H:%M"),
                    status.as_str(),
                ),
            )
            .await?;
        Ok(FlowOutcome::Continue(session))
    }

    async fn on_note_text(
        &self,
        identity: &str,
        mut session: AdminSession,
        customer_id: &str,
        appointment_id: Option<Uuid>,
        event: &InboundEvent,
    ) -> Result<FlowOutcome<AdminSession>> {
        let text = event.payload.trim();
        session.state = AdminState::Menu;
        if text.eq_ignore_ascii_case("cancel") || text.eq_ignore_ascii_case("cancelar") {
            self.messenger.send_text(identity, "Note discarded.").await?;
            return Ok(FlowOutcome::Continue(session));
        }
        let chars = text.chars().count();
        if text.is_empty() || chars > self.config.admin.note_max_chars {
            session.state = AdminState::AwaitingNote {
                customer_id: customer_id.to_string(),
                appointment_id,
            };
            self.messenger
                .send_text(
                    identity,
                    &format!(
                        "Notes are 1 to {} characters. Try again or send 'cancel'.",
                        self.config.admin.note_max_chars
                    ),
                )
                .await?;
            return Ok(FlowOutcome::Continue(session));
        }
        let note = ClientNote {
            text: escape_html(text),
            appointment_id,
            author_staff_id: session.staff_id.clone(),
            created_at: self.time.now_utc(),
        };
        match self.clients.add_note(customer_id, note).await {
            Ok(()) => {
                self.messenger.send_text(identity, "Note saved.").await?;
            }
            Err(Error::NotFound(_)) => {
                self.messenger
                    .send_text(identity, "No client record for that number yet.")
                    .await?;
            }
            Err(e) => return Err(e),
        }
        Ok(FlowOutcome::Continue(session))
    }

    async fn apply_block(
        &self,
        identity: &str,
        mut session: AdminSession,
        date: Option<NaiveDate>,
        time: NaiveTime,
        reason: BlockReason,
        recurring: bool,
    ) -> Result<FlowOutcome<AdminSession>> {
        session.state = AdminState::Menu;
        let member = self
            .staff
            .get(&session.staff_id)
            .await?
            .ok_or_else(|| Error::not_found("staff"))?;
        if time.minute() != 0 || !member.hours.contains_hour(time.hour()) {
            self.messenger
                .send_text(
                    identity,
                    &format!(
                        "Blocks are on the hour, between {:02}:00 and {:02}:00.",
                        member.hours.start_hour, member.hours.end_hour
                    ),
                )
                .await?;
            return Ok(FlowOutcome::Continue(session));
        }
        let end = NaiveTime::from_hms_opt(time.hour() + 1, 0, 0)
            .ok_or_else(|| Error::validation("hour out of range"))?;
        let interval = if recurring || date.is_none() {
            BlockedInterval::recurring(&member.id, time, end, reason)?
        } else {
            let date = date.unwrap_or_else(|| self.time.today());
            BlockedInterval::one_off(&member.id, date, time, end, reason)?
        };
        let check_date = date.unwrap_or_else(|| self.time.today());
        let existing = self.blocked.find_for_staff_on(&member.id, check_date).await?;
        if existing.iter().any(|i| i.covers(check_date, time)) {
            self.messenger
                .send_text(identity, "That hour is already blocked.")
                .await?;
            return Ok(FlowOutcome::Continue(session));
        }
        match self.blocked.create(interval).await {
            Ok(created) => {
                let scope = if created.recurring {
                    "every day".to_string()
                } else {
                    check_date.format("%a %d %b").to_string()
                };
                info!(staff = %member.id, %scope, hour = time.hour(), "hour blocked");
                self.messenger
                    .send_text(
                        identity,
                        &format!("Blocked {} ({}) — {}.", time.format("%H:%M"), created.reason.as_str(), scope),
                    )
                    .await?;
            }
            Err(Error::Conflict(_)) => {
                self.messenger
                    .send_text(identity, "That hour is already blocked.")
                    .await?;
            }
            Err(e) => return Err(e),
        }
        Ok(FlowOutcome::Continue(session))
    }

    async fn apply_unblock(
        &self,
        identity: &str,
        mut session: AdminSession,
        date: Option<NaiveDate>,
        time: NaiveTime,
    ) -> Result<FlowOutcome<AdminSession>> {
        session.state = AdminState::Menu;
        let date = date.unwrap_or_else(|| self.time.today());
        match self
            .blocked
            .delete_by_slot(&session.staff_id, date, time)
            .await
        {
            Ok(removed) => {
                let scope = if removed.recurring {
                    "the daily block".to_string()
                } else {
                    date.format("%a %d %b").to_string()
                };
                info!(staff = %session.staff_id, hour = time.hour(), "hour unblocked");
                self.messenger
                    .send_text(
                        identity,
                        &format!("Unblocked {} — {}.", time.format("%H:%M"), scope),
                    )
                    .await?;
            }
            Err(Error::NotFound(_)) => {
                self.messenger
                    .send_text(identity, "Nothing blocked at that hour.")
                    .await?;
            }
            Err(e) => return Err(e),
        }
        Ok(FlowOutcome::Continue(session))
    }

    async fn open_appointment_picker(
        &self,
        identity: &str,
        mut session: AdminSession,
        op: ApptOp,
        page: usize,
    ) -> Result<FlowOutcome<AdminSession>> {
        let open = self.upcoming_open(&session).await?;
        if open.is_empty() {
            session.state = AdminState::Menu;
            self.messenger
                .send_text(identity, "No upcoming appointments.")
                .await?;
            return Ok(FlowOutcome::Continue(session));
        }
        let (window, has_more) = paginate(&open, page, self.config.booking.page_rows);
        let mut rows: Vec<ListRow> = window
            .iter()
            .map(|a| {
                let local = self.time.local(a.scheduled_at);
                ListRow::new(
                    a.short_id(),
                    format!("{} {} — {}", local.format("%a %d"), local.format("%H:%M"), a.customer_name),
                )
                .with_description(format!("{} · {}", a.service.label(), a.status.as_str()))
            })
            .collect();
        if has_more {
            rows.push(more_row("more appointments"));
        }
        let verb = match op {
            ApptOp::Complete => "complete",
            ApptOp::Cancel => "cancel",
            ApptOp::Note => "annotate",
        };
        session.state = AdminState::ChoosingAppointment { op, page };
        self.messenger
            .send_list(
                identity,
                &format!("Which appointment do you want to {}?", verb),
                "Choose",
                &[ListSection::new("Appointments", rows)],
            )
            .await?;
        Ok(FlowOutcome::Continue(session))
    }

    async fn send_panel(&self, identity: &str, session: &AdminSession) -> Result<()> {
        let member = self
            .staff
            .get(&session.staff_id)
            .await?
            .ok_or_else(|| Error::not_found("staff"))?;
        let agenda = ListSection::new(
            "Agenda",
            vec![
                ListRow::new("today", "Today's appointments"),
                ListRow::new("week", "This week"),
                ListRow::new("day", "Pick a day"),
            ],
        );
        let manage = ListSection::new(
            "Manage",
            vec![
                ListRow::new("block", "Block an hour"),
                ListRow::new("unblock", "Unblock an hour"),
                ListRow::new("complete", "Mark completed"),
                ListRow::new("cancel", "Cancel for a client"),
            ],
        );
        let clients = ListSection::new(
            "Clients",
            vec![
                ListRow::new("note", "Add a client note"),
                ListRow::new("stats", "Monthly stats"),
                ListRow::new("logout", "Log out"),
            ],
        );
        self.messenger
            .send_list(
                identity,
                &format!("Hello {}, what do you need?", member.display_name),
                "Open",
                &[agenda, manage, clients],
            )
            .await
    }

    async fn send_date_picker(&self, identity: &str, body: &str) -> Result<()> {
        let rows = date_rows(&self.time, self.config.booking.days_ahead);
        self.messenger
            .send_list(identity, body, "Choose", &[ListSection::new("Days", rows)])
            .await
    }

    async fn send_hour_picker(
        &self,
        identity: &str,
        session: &mut AdminSession,
        op: DateOp,
        date: NaiveDate,
        page: usize,
    ) -> Result<()> {
        let member = self
            .staff
            .get(&session.staff_id)
            .await?
            .ok_or_else(|| Error::not_found("staff"))?;
        let existing = self.blocked.find_for_staff_on(&member.id, date).await?;
        let hours: Vec<NaiveTime> = match op {
            DateOp::Block => member
                .hours
                .slot_times()
                .filter(|(_, t)| !existing.iter().any(|i| i.covers(date, *t)))
                .map(|(_, t)| t)
                .collect(),
            _ => existing
                .iter()
                .filter(|i| i.covers(date, i.start))
                .map(|i| i.start)
                .collect(),
        };
        if hours.is_empty() {
            session.state = AdminState::Menu;
            let text = match op {
                DateOp::Block => "Every working hour that day is already blocked.",
                _ => "Nothing is blocked that day.",
            };
            return self.messenger.send_text(identity, text).await;
        }
        let (window, has_more) = paginate(&hours, page, self.config.booking.page_rows);
        let mut rows: Vec<ListRow> = window
            .iter()
            .map(|t| ListRow::new(t.format("%H:%M").to_string(), t.format("%H:%M").to_string()))
            .collect();
        if has_more {
            rows.push(more_row("more hours"));
        }
        let body = match op {
            DateOp::Block => format!("Block which hour on {}?", date.format("%a %d %b")),
            _ => format!("Unblock which hour on {}?", date.format("%a %d %b")),
        };
        self.messenger
            .send_list(identity, &body, "Choose", &[ListSection::new("Hours", rows)])
            .await
    }

    async fn render_day(&self, session: &AdminSession, date: NaiveDate) -> Result<String> {
        let booked = self.engine.booked_slots(&session.staff_id, date).await?;
        if booked.is_empty() {
            return Ok(format!("No appointments for {}.", date.format("%a %d %b")));
        }
        let mut lines = vec![format!("Appointments for {}:", date.format("%a %d %b"))];
        for appointment in booked {
            let local = self.time.local(appointment.scheduled_at);
            lines.push(format!(
                "{} — {} ({}, {}) [{}]",
                local.format("%H:%M"),
                appointment.customer_name,
                appointment.service.label(),
                appointment.status.as_str(),
                appointment.short_id(),
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn render_week(&self, session: &AdminSession) -> Result<String> {
        let today = self.time.today();
        let mut lines = vec!["Next 7 days:".to_string()];
        for offset in 0..7u64 {
            let Some(date) = today.checked_add_days(chrono::Days::new(offset)) else {
                continue;
            };
            let from = self.time.instant_at(date, NaiveTime::MIN)?;
            let to = from + chrono::Duration::hours(24);
            let count = self
                .appointments
                .count_in_range(&session.staff_id, from, to)
                .await?;
            lines.push(format!(
                "{} — {} appointment{}",
                date.format("%a %d %b"),
                count,
                if count == 1 { "" } else { "s" }
            ));
        }
        Ok(lines.join("\n"))
    }

    async fn render_stats(&self, session: &AdminSession) -> Result<String> {
        let today = self.time.today();
        let first = today.with_day(1).unwrap_or(today);
        let next_month = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
        }
        .unwrap_or(first);
        let from = self.time.instant_at(first, NaiveTime::MIN)?;
        let to = self.time.instant_at(next_month, NaiveTime::MIN)?;
        let appointments = self
            .appointments
            .find_by_staff_and_range(&session.staff_id, from, to)
            .await?;
        let stats = stats::aggregate(&appointments, &self.time);
        let mut lines = vec![
            format!("Stats for {}:", first.format("%B %Y")),
            format!(
                "{} total · {} completed · {} cancelled · {} upcoming",
                stats.total, stats.completed, stats.cancelled, stats.upcoming
            ),
            format!("Completion rate: {:.0}%", stats.completion_rate * 100.0),
        ];
        if let Some(weekday) = stats.busiest_weekday {
            lines.push(format!("Busiest day: {}", weekday));
        }
        if !stats.peak_hours.is_empty() {
            let hours: Vec<String> = stats
                .peak_hours
                .iter()
                .map(|(hour, count)| format!("{:02}:00 ({})", hour, count))
                .collect();
            lines.push(format!("Peak hours: {}", hours.join(", ")));
        }
        Ok(lines.join("\n"))
    }

    /// Cross-staff modification is a hard error, not a policy warning.
    fn require_own_appointment(
        &self,
        session: &AdminSession,
        appointment: &Appointment,
    ) -> Result<()> {
        if appointment.staff_id != session.staff_id {
            warn!(
                staff = %session.staff_id,
                owner = %appointment.staff_id,
                appointment = %appointment.short_id(),
                "cross-staff modification rejected"
            );
            return Err(Error::Authorization(
                "that appointment belongs to another staff member".to_string(),
            ));
        }
        Ok(())
    }

    async fn upcoming_open(&self, session: &AdminSession) -> Result<Vec<Appointment>> {
        let from = self.time.now_utc();
        let to = from + chrono::Duration::days(self.config.booking.days_ahead as i64 + 1);
        let appointments = self
            .appointments
            .find_by_staff_and_range(&session.staff_id, from, to)
            .await?;
        Ok(appointments.into_iter().filter(|a| a.is_open()).collect())
    }

    /// `[date] HH:MM [daily|diario] [reason]`; bare `HH:MM` means today.
    /// Empty args mean "walk me through it".
    fn parse_block_args(
        &self,
        args: &[String],
    ) -> Result<Option<(Option<NaiveDate>, NaiveTime, BlockReason, bool)>> {
        if args.is_empty() {
            return Ok(None);
        }
        let mut date = None;
        let mut time = None;
        let mut reason = BlockReason::Other;
        let mut recurring = false;
        for arg in args {
            let lowered = arg.to_lowercase();
            if let Some(parsed) = parse_date(arg) {
                date = Some(parsed);
            } else if let Some(parsed) = parse_hour(arg) {
                time = Some(parsed);
            } else if lowered == "daily" || lowered == "diario" {
                recurring = true;
            } else if let Some(parsed) = BlockReason::parse(&lowered) {
                reason = parsed;
            } else {
                return Err(Error::validation(format!(
                    "didn't understand '{}' — use: block [YYYY-MM-DD] HH:MM [daily]",
                    arg
                )));
            }
        }
        let time = time.ok_or_else(|| {
            Error::validation("missing hour — use: block [YYYY-MM-DD] HH:MM [daily]")
        })?;
        if recurring && date.is_some() {
            return Err(Error::validation("a daily block doesn't take a date"));
        }
        let date = if recurring { None } else { Some(date.unwrap_or_else(|| self.time.today())) };
        Ok(Some((date, time, reason, recurring)))
    }

    fn parse_unblock_args(&self, args: &[String]) -> Result<Option<(Option<NaiveDate>, NaiveTime)>> {
        if args.is_empty() {
            return Ok(None);
        }
        let mut date = None;
        let mut time = None;
        for arg in args {
            if let Some(parsed) = parse_date(arg) {
                date = Some(parsed);
            } else if let Some(parsed) = parse_hour(arg) {
                time = Some(parsed);
            } else {
                return Err(Error::validation(format!(
                    "didn't understand '{}' — use: unblock [YYYY-MM-DD] HH:MM",
                    arg
                )));
            }
        }
        let time = time
            .ok_or_else(|| Error::validation("missing hour — use: unblock [YYYY-MM-DD] HH:MM"))?;
        Ok(Some((date, time)))
    }
}

const NOTE_PROMPT: &str = "Send the note text (or 'cancel' to abort).";

const HELP_TEXT: &str = "Commands: admin <alias> <pin> [action]\n\
    Actions: panel, today (hoy), week (semana), block (bloquear), \
    unblock (desbloquear), complete (completar), cancel (cancelar), \
    note (nota), stats (estadisticas), pin, off (pausa), on (activar), \
    logout (salir).\n\
    Examples:\n\
    admin alex 1234 block 12:00 daily\n\
    admin alex 1234 cancel 1a2b3c4d";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_command_shape_case_insensitively() {
        let command = parse_admin_command("ADMIN Alex 1234 HOY").unwrap();
        assert_eq!(command.alias, "alex");
        assert_eq!(command.pin, "1234");
        assert_eq!(command.action, AdminAction::Today);
        assert!(command.args.is_empty());
    }

    #[test]
    fn default_action_is_panel() {
        let command = parse_admin_command("admin alex 123456").unwrap();
        assert_eq!(command.action, AdminAction::Panel);
    }

    #[test]
    fn collects_params_after_the_action() {
        let command = parse_admin_command("admin alex 1234 block 2026-03-10 15:00").unwrap();
        assert_eq!(command.action, AdminAction::Block);
        assert_eq!(command.args, vec!["2026-03-10", "15:00"]);
    }

    #[test]
    fn spanish_aliases_map_to_the_same_actions() {
        for (word, action) in [
            ("hoy", AdminAction::Today),
            ("semana", AdminAction::Week),
            ("bloquear", AdminAction::Block),
            ("cancelar", AdminAction::Cancel),
            ("nota", AdminAction::Note),
            ("salir", AdminAction::Logout),
        ] {
            let command = parse_admin_command(&format!("admin alex 1234 {}", word)).unwrap();
            assert_eq!(command.action, action, "{}", word);
        }
    }

    #[test]
    fn non_matching_shapes_are_not_commands() {
        assert!(parse_admin_command("hello, can I book a haircut?").is_none());
        assert!(parse_admin_command("admin alex").is_none());
        // PIN outside 4-6 digits.
        assert!(parse_admin_command("admin alex 123").is_none());
        assert!(parse_admin_command("admin alex 12345678").is_none());
        // Alias outside 2-20 chars.
        assert!(parse_admin_command("admin a 1234").is_none());
        assert!(parse_admin_command("admin nombredemasiadolargoxx 1234").is_none());
    }

    #[test]
    fn unknown_action_words_fall_back_to_help() {
        let command = parse_admin_command("admin alex 1234 dance").unwrap();
        assert_eq!(command.action, AdminAction::Help);
    }
}
