use crate::messaging::ListRow;
use crate::time::TimeProvider;
use chrono::NaiveDate;

pub mod admin;
pub mod booking;

pub use admin::{AdminFlow, AdminSession};
pub use booking::{BookingFlow, BookingSession};

/// What a flow step did with the session.
pub enum FlowOutcome<S> {
    /// Keep (or replace) the session; the dialogue continues.
    Continue(S),
    /// Terminal transition; the caller deletes the session.
    Done,
}

/// Row id that asks for the next page of a long selection list.
pub const MORE_ROW_ID: &str = "more";

/// Splits `items` into the window for `page`, reserving one row for the
/// "more" continuation whenever items remain. Returns the window and
/// whether a continuation row is needed.
pub(crate) fn paginate<T: Clone>(items: &[T], page: usize, per_message: usize) -> (Vec<T>, bool) {
    let per_page = per_message.saturating_sub(1).max(1);
    let start = (page * per_page).min(items.len());
    let remaining = &items[start..];
    if remaining.len() <= per_message {
        (remaining.to_vec(), false)
    } else {
        (remaining[..per_page].to_vec(), true)
    }
}

pub(crate) fn more_row(remaining_hint: &str) -> ListRow {
    ListRow::new(MORE_ROW_ID, "More…").with_description(remaining_hint.to_string())
}

/// Selectable rows for the next `days_ahead` calendar days, today first.
/// Row ids are ISO dates so the echoed selection parses directly.
pub(crate) fn date_rows(time: &TimeProvider, days_ahead: u32) -> Vec<ListRow> {
    let today = time.today();
    (0..days_ahead)
        .filter_map(|offset| today.checked_add_days(chrono::Days::new(offset as u64)))
        .map(|date| {
            let title = if date == today {
                format!("{} (today)", date.format("%a %d %b"))
            } else {
                date.format("%a %d %b").to_string()
            };
            ListRow::new(date.format("%Y-%m-%d").to_string(), title)
        })
        .collect()
}

pub(crate) fn parse_date(payload: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(payload.trim(), "%Y-%m-%d").ok()
}

pub(crate) fn parse_hour(payload: &str) -> Option<chrono::NaiveTime> {
    chrono::NaiveTime::parse_from_str(payload.trim(), "%H:%M").ok()
}
