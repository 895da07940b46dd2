use crate::error::{Error, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Daily working window for one staff member. Hours are whole numbers in
/// business time; slots are fixed at 60 minutes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkingHours {
    pub start_hour: u32,
    pub end_hour: u32,
    pub slot_minutes: u32,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            slot_minutes: 60,
        }
    }
}

impl WorkingHours {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self> {
        let hours = Self {
            start_hour,
            end_hour,
            slot_minutes: 60,
        };
        hours.validate()?;
        Ok(hours)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(Error::validation("working hours must be within 0-23"));
        }
        if self.end_hour <= self.start_hour {
            return Err(Error::validation("working hours must end after they start"));
        }
        if self.slot_minutes != 60 {
            return Err(Error::validation("slot duration is fixed at 60 minutes"));
        }
        Ok(())
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }

    /// Raw slot start times, `start_hour` to `end_hour` exclusive.
    pub fn slot_times(&self) -> impl Iterator<Item = (u32, NaiveTime)> + '_ {
        (self.start_hour..self.end_hour)
            .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0).map(|t| (hour, t)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub id: crate::StaffId,
    /// Lowercase handle used in the admin command, `[a-z0-9]{2,20}`.
    pub alias: String,
    pub display_name: String,
    pub pin_hash: String,
    pub active: bool,
    pub hours: WorkingHours,
}

impl Staff {
    pub fn new(
        id: impl Into<String>,
        alias: impl Into<String>,
        display_name: impl Into<String>,
        pin_hash: impl Into<String>,
        hours: WorkingHours,
    ) -> Self {
        Self {
            id: id.into(),
            alias: alias.into().to_lowercase(),
            display_name: display_name.into(),
            pin_hash: pin_hash.into(),
            active: true,
            hours,
        }
    }
}
