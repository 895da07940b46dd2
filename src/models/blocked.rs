use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockReason {
    Lunch,
    Break,
    Personal,
    Other,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::Lunch => "lunch",
            BlockReason::Break => "break",
            BlockReason::Personal => "personal",
            BlockReason::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lunch" | "almuerzo" => Some(BlockReason::Lunch),
            "break" | "descanso" => Some(BlockReason::Break),
            "personal" => Some(BlockReason::Personal),
            "other" | "otro" => Some(BlockReason::Other),
            _ => None,
        }
    }
}

/// Staff-declared exclusion window subtracted from availability.
/// `date: None` means the window recurs every day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedInterval {
    pub id: Uuid,
    pub staff_id: crate::StaffId,
    pub date: Option<NaiveDate>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub reason: BlockReason,
    pub recurring: bool,
}

impl BlockedInterval {
    pub fn one_off(
        staff_id: impl Into<String>,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        reason: BlockReason,
    ) -> Result<Self> {
        Self::build(staff_id.into(), Some(date), start, end, reason)
    }

    pub fn recurring(
        staff_id: impl Into<String>,
        start: NaiveTime,
        end: NaiveTime,
        reason: BlockReason,
    ) -> Result<Self> {
        Self::build(staff_id.into(), None, start, end, reason)
    }

    fn build(
        staff_id: String,
        date: Option<NaiveDate>,
        start: NaiveTime,
        end: NaiveTime,
        reason: BlockReason,
    ) -> Result<Self> {
        if start >= end {
            return Err(Error::validation("blocked interval must end after it starts"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            staff_id,
            date,
            start,
            end,
            reason,
            recurring: date.is_none(),
        })
    }

    /// Whether this window excludes a slot starting at `time` on `date`.
    /// Recurring windows match by time of day alone; one-off windows also
    /// require the exact date.
    pub fn covers(&self, date: NaiveDate, time: NaiveTime) -> bool {
        if let Some(own_date) = self.date {
            if own_date != date {
                return false;
            }
        }
        time >= self.start && time < self.end
    }
}
