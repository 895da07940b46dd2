use anyhow::Error;
use chrono_tz::Tz;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// IANA timezone every "now"/"today" comparison is made in,
    /// independent of the host clock.
    pub timezone: String,
    pub session_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    /// How many calendar days ahead a customer may pick from.
    pub days_ahead: u32,
    pub name_min_chars: usize,
    pub name_max_chars: usize,
    /// Hard cap on selectable rows per list message, imposed by the
    /// chat channel. Longer slot lists paginate.
    pub page_rows: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub note_max_chars: usize,
    pub pin_digits: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: "America/Argentina/Buenos_Aires".to_string(),
            session_timeout_secs: 600,
            sweep_interval_secs: 300,
            booking: BookingConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            days_ahead: 7,
            name_min_chars: 2,
            name_max_chars: 100,
            page_rows: 10,
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            note_max_chars: 500,
            pin_digits: 6,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }

    pub fn timezone(&self) -> Result<Tz, Error> {
        self.timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid timezone '{}'", self.timezone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.session_timeout_secs, 600);
        assert_eq!(config.booking.page_rows, 10);
        assert_eq!(config.admin.note_max_chars, 500);
        assert!(config.timezone().is_ok());
    }

    #[test]
    fn loads_partial_toml() {
        let parsed: Config = toml::from_str(
            r#"
            timezone = "Europe/Madrid"
            session_timeout_secs = 300
            sweep_interval_secs = 60

            [booking]
            days_ahead = 14
            name_min_chars = 2
            name_max_chars = 100
            page_rows = 10
            "#,
        )
        .unwrap();
        assert_eq!(parsed.timezone, "Europe/Madrid");
        assert_eq!(parsed.booking.days_ahead, 14);
        assert_eq!(parsed.admin.pin_digits, 6);
    }
}
