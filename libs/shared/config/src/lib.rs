use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveTime;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub buffer_minutes: i64,
    pub working_day_start: NaiveTime,
    pub working_day_end: NaiveTime,
    pub slot_search_horizon_days: i64,
    pub reject_past_bookings: bool,
    pub api_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            buffer_minutes: 30,
            working_day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            working_day_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_search_horizon_days: 14,
            reject_past_bookings: true,
            api_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            data_dir: env::var("HOSPITAL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    warn!("HOSPITAL_DATA_DIR not set, using default");
                    defaults.data_dir.clone()
                }),
            buffer_minutes: parse_var("SCHEDULING_BUFFER_MINUTES", defaults.buffer_minutes),
            working_day_start: parse_time_var("WORKING_DAY_START", defaults.working_day_start),
            working_day_end: parse_time_var("WORKING_DAY_END", defaults.working_day_end),
            slot_search_horizon_days: parse_var(
                "SLOT_SEARCH_HORIZON_DAYS",
                defaults.slot_search_horizon_days,
            ),
            reject_past_bookings: parse_var("REJECT_PAST_BOOKINGS", defaults.reject_past_bookings),
            api_port: parse_var("API_PORT", defaults.api_port),
        };

        if !config.is_configured() {
            warn!("Scheduling not fully configured - working day or buffer is malformed");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        self.working_day_start < self.working_day_end
            && self.buffer_minutes >= 0
            && self.slot_search_horizon_days > 0
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default", name);
            default
        }
    }
}

fn parse_time_var(name: &str, default: NaiveTime) -> NaiveTime {
    match env::var(name) {
        Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', expected HH:MM, using default", name, raw);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default", name);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_configured() {
        let config = AppConfig::default();
        assert!(config.is_configured());
        assert_eq!(config.buffer_minutes, 30);
    }

    #[test]
    fn test_inverted_working_day_is_not_configured() {
        let config = AppConfig {
            working_day_start: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            ..AppConfig::default()
        };
        assert!(!config.is_configured());
    }
}
