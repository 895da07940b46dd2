use crate::models::{Appointment, AppointmentStatus};
use crate::time::TimeProvider;
use chrono::{Datelike, Timelike, Weekday};

/// Aggregated client-side from one date-range query; nothing here goes
/// back to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyStats {
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub upcoming: usize,
    pub busiest_weekday: Option<Weekday>,
    /// Top 3 start hours by appointment count, busiest first.
    pub peak_hours: Vec<(u32, usize)>,
    /// completed / (total - cancelled); 0 when the denominator is 0.
    pub completion_rate: f64,
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn aggregate(appointments: &[Appointment], time: &TimeProvider) -> MonthlyStats {
    let total = appointments.len();
    let completed = appointments
        .iter()
        .filter(|a| a.status == AppointmentStatus::Completed)
        .count();
    let cancelled = appointments
        .iter()
        .filter(|a| a.status == AppointmentStatus::Cancelled)
        .count();
    let upcoming = appointments.iter().filter(|a| a.is_open()).count();

    let mut weekday_counts = [0usize; 7];
    let mut hour_counts = [0usize; 24];
    for appointment in appointments {
        let local = time.local(appointment.scheduled_at);
        weekday_counts[local.weekday().num_days_from_monday() as usize] += 1;
        hour_counts[local.hour() as usize] += 1;
    }

    let busiest_weekday = WEEKDAYS
        .iter()
        .max_by_key(|w| weekday_counts[w.num_days_from_monday() as usize])
        .copied()
        .filter(|w| weekday_counts[w.num_days_from_monday() as usize] > 0);

    let mut peak_hours: Vec<(u32, usize)> = hour_counts
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(hour, &count)| (hour as u32, count))
        .collect();
    peak_hours.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    peak_hours.truncate(3);

    let denominator = total.saturating_sub(cancelled);
    let completion_rate = if denominator == 0 {
        0.0
    } else {
        completed as f64 / denominator as f64
    };

    MonthlyStats {
        total,
        completed,
        cancelled,
        upcoming,
        busiest_weekday,
        peak_hours,
        completion_rate,
    }
}
