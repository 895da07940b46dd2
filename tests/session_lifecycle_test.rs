use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use turnero::auth::{Argon2Hasher, SecretHasher};
use turnero::config::Config;
use turnero::messaging::{Outbound, RecordingMessenger};
use turnero::models::{Staff, WorkingHours};
use turnero::router::ChatRouter;
use turnero::time::ManualClock;
use turnero::InboundEvent;

fn build_router(pin_hash: String) -> (ChatRouter, Arc<RecordingMessenger>) {
    let messenger = Arc::new(RecordingMessenger::new());
    let router = ChatRouter::builder()
        .config(Config::default())
        .clock(Arc::new(ManualClock::new(
            "2026-03-10T11:30:00Z".parse().unwrap(),
        )))
        .messenger(messenger.clone())
        .staff_roster(vec![Staff::new(
            "alex",
            "alex",
            "Alex",
            pin_hash,
            WorkingHours::new(9, 17).unwrap(),
        )])
        .build()
        .unwrap();
    (router, messenger)
}

async fn text(router: &ChatRouter, identity: &str, payload: &str) {
    router
        .handle_event(InboundEvent::text(identity, payload))
        .await
        .unwrap();
}

async fn select(router: &ChatRouter, identity: &str, payload: &str) {
    router
        .handle_event(InboundEvent::selection(identity, payload))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn idle_booking_session_expires_and_the_next_message_greets() {
    let (router, messenger) = build_router("unused".into());
    let identity = "+5491111111111";

    // Walk to the date step, then go quiet.
    text(&router, identity, "hi").await;
    select(&router, identity, "book").await;
    text(&router, identity, "Ana").await;
    select(&router, identity, "alex").await;
    select(&router, identity, "haircut").await;

    sleep(Duration::from_secs(601)).await;
    let closing = messenger.last_text().unwrap();
    assert!(closing.contains("Say hi to start over"), "{}", closing);

    // Not back at the date step: a fresh greeting.
    messenger.take();
    text(&router, identity, "hello?").await;
    let sent = messenger.take();
    assert!(
        matches!(sent.last(), Some(Outbound::Choices { .. })),
        "expected greeting choices, got {:?}",
        sent.last()
    );
}

#[tokio::test(start_paused = true)]
async fn every_inbound_event_resets_the_inactivity_window() {
    let (router, messenger) = build_router("unused".into());
    let identity = "+5491111111111";

    text(&router, identity, "hi").await;
    select(&router, identity, "book").await;
    sleep(Duration::from_secs(400)).await;
    text(&router, identity, "Ana").await;
    sleep(Duration::from_secs(400)).await;

    // 800s since the flow opened, 400s since the last event: alive.
    messenger.take();
    select(&router, identity, "alex").await;
    let sent = messenger.take();
    assert!(
        matches!(sent.last(), Some(Outbound::Choices { .. })),
        "expected the service step, got {:?}",
        sent.last()
    );
}

#[tokio::test(start_paused = true)]
async fn idle_admin_session_expires_too() {
    let hash = Argon2Hasher.hash("1234").unwrap();
    let (router, messenger) = build_router(hash);
    let staff_phone = "+5490000000000";

    text(&router, staff_phone, "admin alex 1234").await;
    sleep(Duration::from_secs(601)).await;
    assert!(messenger
        .last_text()
        .unwrap()
        .contains("Admin session closed"));

    // Typing a menu action now routes as a plain customer.
    messenger.take();
    text(&router, staff_phone, "today").await;
    let sent = messenger.take();
    assert!(matches!(sent.last(), Some(Outbound::Choices { .. })));
}

#[tokio::test(start_paused = true)]
async fn committed_booking_cancels_the_watchdog() {
    let (router, messenger) = build_router("unused".into());
    let identity = "+5491111111111";

    text(&router, identity, "hi").await;
    select(&router, identity, "book").await;
    text(&router, identity, "Ana").await;
    select(&router, identity, "alex").await;
    select(&router, identity, "haircut").await;
    select(&router, identity, "2026-03-11").await;
    select(&router, identity, "10:00").await;
    assert!(messenger.last_text().unwrap().contains("Booked!"));

    // No stale timer fires a closing notice afterwards.
    messenger.take();
    sleep(Duration::from_secs(1200)).await;
    assert!(messenger.take().is_empty());
}
