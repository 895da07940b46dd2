use crate::auth::{Argon2Hasher, SecretHasher};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{EventKind, InboundEvent};
use crate::flows::{AdminFlow, AdminSession, BookingFlow, BookingSession, FlowOutcome};
use crate::messaging::{Choice, Messenger};
use crate::models::AppointmentStatus;
use crate::scheduling::SlotAvailabilityEngine;
use crate::session::{IdentityLanes, SessionStore};
use crate::store::{
    AppointmentStore, BlockedIntervalStore, ClientDirectory, MemoryAppointmentStore,
    MemoryBlockedIntervalStore, MemoryClientDirectory, MemoryStaffDirectory, StaffDirectory,
};
use crate::time::{Clock, SystemClock, TimeProvider};
use crate::{flows, sweep};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Routes every normalized inbound chat event to the right dialogue:
/// admin command first, then whichever session the identity already has,
/// then the greeting. One event per identity runs at a time.
pub struct ChatRouter {
    config: Arc<Config>,
    time: TimeProvider,
    messenger: Arc<dyn Messenger>,
    appointments: Arc<dyn AppointmentStore>,
    staff: Arc<dyn StaffDirectory>,
    booking_flow: BookingFlow,
    admin_flow: AdminFlow,
    bookings: SessionStore<BookingSession>,
    admins: SessionStore<AdminSession>,
    lanes: IdentityLanes,
}

/// Wires the router from its ports, defaulting every store to the
/// in-memory backend and the clock to the system clock.
pub struct ChatRouterBuilder {
    config: Option<Config>,
    clock: Option<Arc<dyn Clock>>,
    messenger: Option<Arc<dyn Messenger>>,
    hasher: Option<Arc<dyn SecretHasher>>,
    appointments: Option<Arc<dyn AppointmentStore>>,
    blocked: Option<Arc<dyn BlockedIntervalStore>>,
    staff: Option<Arc<dyn StaffDirectory>>,
    clients: Option<Arc<dyn ClientDirectory>>,
}

impl ChatRouterBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            clock: None,
            messenger: None,
            hasher: None,
            appointments: None,
            blocked: None,
            staff: None,
            clients: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn SecretHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn appointment_store(mut self, store: Arc<dyn AppointmentStore>) -> Self {
        self.appointments = Some(store);
        self
    }

    pub fn blocked_store(mut self, store: Arc<dyn BlockedIntervalStore>) -> Self {
        self.blocked = Some(store);
        self
    }

    pub fn staff_directory(mut self, directory: Arc<dyn StaffDirectory>) -> Self {
        self.staff = Some(directory);
        self
    }

    pub fn staff_roster(mut self, roster: Vec<crate::models::Staff>) -> Self {
        self.staff = Some(Arc::new(MemoryStaffDirectory::new(roster)));
        self
    }

    pub fn client_directory(mut self, directory: Arc<dyn ClientDirectory>) -> Self {
        self.clients = Some(directory);
        self
    }

    pub fn build(self) -> Result<ChatRouter> {
        let config = Arc::new(self.config.unwrap_or_default());
        let tz = config.timezone().map_err(Error::Infrastructure)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let time = TimeProvider::with_clock(tz, clock);
        let messenger = self
            .messenger
            .ok_or_else(|| Error::Infrastructure(anyhow::anyhow!("a messenger is required")))?;
        let hasher: Arc<dyn SecretHasher> =
            self.hasher.unwrap_or_else(|| Arc::new(Argon2Hasher));
        let appointments: Arc<dyn AppointmentStore> = self
            .appointments
            .unwrap_or_else(|| Arc::new(MemoryAppointmentStore::new()));
        let blocked: Arc<dyn BlockedIntervalStore> = self
            .blocked
            .unwrap_or_else(|| Arc::new(MemoryBlockedIntervalStore::new()));
        let staff: Arc<dyn StaffDirectory> = self
            .staff
            .unwrap_or_else(|| Arc::new(MemoryStaffDirectory::new(Vec::new())));
        let clients: Arc<dyn ClientDirectory> = self
            .clients
            .unwrap_or_else(|| Arc::new(MemoryClientDirectory::new()));

        let engine = Arc::new(SlotAvailabilityEngine::new(
            appointments.clone(),
            blocked.clone(),
            staff.clone(),
            time.clone(),
        ));
        let booking_flow = BookingFlow::new(
            engine.clone(),
            appointments.clone(),
            staff.clone(),
            clients.clone(),
            messenger.clone(),
            time.clone(),
            config.clone(),
        );
        let admin_flow = AdminFlow::new(
            engine,
            appointments.clone(),
            blocked,
            staff.clone(),
            clients,
            messenger.clone(),
            hasher,
            time.clone(),
            config.clone(),
        );

        let timeout = Duration::from_secs(config.session_timeout_secs);
        let closing = messenger.clone();
        let bookings: SessionStore<BookingSession> = SessionStore::new(timeout)
            .with_expiry_hook(Arc::new(move |identity, _| {
                let messenger = closing.clone();
                Box::pin(async move {
                    // Best effort; the session is already gone either way.
                    if let Err(e) = messenger
                        .send_text(
                            &identity,
                            "Closed this conversation after a quiet spell. Say hi to start over.",
                        )
                        .await
                    {
                        warn!(identity = %identity, "failed to send closing notice: {}", e);
                    }
                })
            }));
        let closing = messenger.clone();
        let admins: SessionStore<AdminSession> = SessionStore::new(timeout)
            .with_expiry_hook(Arc::new(move |identity, _| {
                let messenger = closing.clone();
                Box::pin(async move {
                    if let Err(e) = messenger
                        .send_text(&identity, "Admin session closed after inactivity.")
                        .await
                    {
                        warn!(identity = %identity, "failed to send closing notice: {}", e);
                    }
                })
            }));

        Ok(ChatRouter {
            config,
            time,
            messenger,
            appointments,
            staff,
            booking_flow,
            admin_flow,
            bookings,
            admins,
            lanes: IdentityLanes::new(),
        })
    }
}

impl Default for ChatRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

const GREETING: &str = "Hi! I can help you with your appointment.";
const APOLOGY: &str = "Something went wrong on our side — please try again in a moment.";
const AUTH_FAILED: &str = "Invalid credentials.";

impl ChatRouter {
    pub fn builder() -> ChatRouterBuilder {
        ChatRouterBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn time(&self) -> &TimeProvider {
        &self.time
    }

    pub fn appointment_store(&self) -> Arc<dyn AppointmentStore> {
        self.appointments.clone()
    }

    /// Single entry point for the chat channel. Errors are converted to
    /// user-facing messages here; the session is only advanced on
    /// success, so a failed step can simply be retried.
    pub async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        let identity = match crate::utils::normalize_identity(&event.identity) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(identity = %event.identity, "dropping event with invalid identity");
                return Err(e);
            }
        };
        let _lane = self.lanes.acquire(&identity).await;

        match self.dispatch(&identity, &event).await {
            Ok(()) => Ok(()),
            Err(Error::Infrastructure(e)) => {
                error!(identity = %identity, "infrastructure failure: {:#}", e);
                if let Err(send_err) = self.messenger.send_text(&identity, APOLOGY).await {
                    error!(identity = %identity, "failed to send apology: {}", send_err);
                }
                Ok(())
            }
            Err(Error::Authentication) => {
                self.messenger.send_text(&identity, AUTH_FAILED).await?;
                Ok(())
            }
            Err(e) => {
                // Validation, conflict, authorization and not-found all
                // carry a safe user-facing message.
                self.messenger.send_text(&identity, &e.to_string()).await?;
                Ok(())
            }
        }
    }

    /// Opens a booking dialogue on behalf of another identity (staff
    /// booking for a walk-in who called). The active-appointment
    /// invariant is checked against the target before the flow opens.
    pub async fn start_booking_for(&self, identity: &str, target_identity: &str) -> Result<()> {
        let identity = crate::utils::normalize_identity(identity)?;
        let target = crate::utils::normalize_identity(target_identity)?;
        let _lane = self.lanes.acquire(&identity).await;
        if let Some(session) = self.booking_flow.start(&identity, &target).await? {
            self.bookings.put(&identity, session).await;
        }
        Ok(())
    }

    /// Periodic maintenance: archive past-due appointments. Intended to
    /// run once at startup and then on a fixed interval.
    pub async fn sweep_expired_appointments(&self) -> Result<usize> {
        sweep::sweep_expired_appointments(self.appointments.as_ref(), &self.time).await
    }

    async fn dispatch(&self, identity: &str, event: &InboundEvent) -> Result<()> {
        // The admin command works from anywhere, even mid-booking, so a
        // staff member can always reach their panel.
        if event.kind == EventKind::Text {
            if let Some(command) = flows::admin::parse_admin_command(&event.payload) {
                return self.open_admin(identity, command).await;
            }
        }

        if let Some(session) = self.admins.get(identity).await {
            self.admins.touch(identity).await;
            return self.run_admin(identity, session, event).await;
        }

        if let Some(session) = self.bookings.get(identity).await {
            self.bookings.touch(identity).await;
            if event.kind == EventKind::Text && event.payload.trim().eq_ignore_ascii_case("menu") {
                self.bookings.remove(identity).await;
                info!(identity = %identity, "booking abandoned");
                return self
                    .messenger
                    .send_text(identity, "No problem — say hi whenever you want to book.")
                    .await;
            }
            let outcome = self.booking_flow.handle(identity, session, event).await?;
            match outcome {
                FlowOutcome::Continue(next) => self.bookings.put(identity, next).await,
                FlowOutcome::Done => {
                    self.bookings.remove(identity).await;
                }
            }
            return Ok(());
        }

        self.greet(identity, event).await
    }

    async fn open_admin(&self, identity: &str, command: flows::admin::AdminCommand) -> Result<()> {
        let Some(session) = self.admin_flow.authenticate(&command).await? else {
            return Err(Error::Authentication);
        };
        // An admin login supersedes any booking in progress.
        self.bookings.remove(identity).await;
        let outcome = self
            .admin_flow
            .dispatch(identity, session, command.action, &command.args)
            .await?;
        match outcome {
            FlowOutcome::Continue(next) => self.admins.put(identity, next).await,
            FlowOutcome::Done => {
                self.admins.remove(identity).await;
            }
        }
        Ok(())
    }

    async fn run_admin(
        &self,
        identity: &str,
        session: AdminSession,
        event: &InboundEvent,
    ) -> Result<()> {
        let outcome = self.admin_flow.handle(identity, session, event).await?;
        match outcome {
            FlowOutcome::Continue(next) => self.admins.put(identity, next).await,
            FlowOutcome::Done => {
                self.admins.remove(identity).await;
            }
        }
        Ok(())
    }

    async fn greet(&self, identity: &str, event: &InboundEvent) -> Result<()> {
        if event.kind == EventKind::Selection {
            match event.payload.trim() {
                "book" => {
                    if let Some(session) = self.booking_flow.start(identity, identity).await? {
                        self.bookings.put(identity, session).await;
                    }
                    return Ok(());
                }
                "view" => return self.show_appointment(identity).await,
                "cancel_appt" => return self.cancel_own(identity).await,
                _ => {}
            }
        }
        self.messenger
            .send_choices(
                identity,
                GREETING,
                &[
                    Choice::new("book", "Book"),
                    Choice::new("view", "My appointment"),
                    Choice::new("cancel_appt", "Cancel it"),
                ],
            )
            .await
    }

    async fn show_appointment(&self, identity: &str) -> Result<()> {
        let Some(appointment) = self.appointments.find_active_by_customer(identity).await? else {
            return self
                .messenger
                .send_text(identity, "You have no upcoming appointment.")
                .await;
        };
        let staff_name = self
            .staff
            .get(&appointment.staff_id)
            .await?
            .map(|s| s.display_name)
            .unwrap_or_else(|| appointment.staff_id.clone());
        let local = self.time.local(appointment.scheduled_at);
        self.messenger
            .send_text(
                identity,
                &format!(
                    "{} with {} on {} at {} ({}).",
                    appointment.service.label(),
                    staff_name,
                    local.format("%a %d %b"),
                    local.format("%H:%M"),
                    appointment.status.as_str(),
                ),
            )
            .await
    }

    async fn cancel_own(&self, identity: &str) -> Result<()> {
        let Some(appointment) = self.appointments.find_active_by_customer(identity).await? else {
            return self
                .messenger
                .send_text(identity, "You have no upcoming appointment to cancel.")
                .await;
        };
        self.appointments
            .update_status(appointment.id, AppointmentStatus::Cancelled)
            .await?;
        info!(
            appointment = %appointment.short_id(),
            customer = %identity,
            "customer self-cancelled"
        );
        let local = self.time.local(appointment.scheduled_at);
        self.messenger
            .send_text(
                identity,
                &format!(
                    "Cancelled your appointment on {} at {}. Book again any time.",
                    local.format("%a %d %b"),
                    local.format("%H:%M"),
                ),
            )
            .await
    }
}
