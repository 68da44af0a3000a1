use std::env;

use serde::Deserialize;

/// Upper bound for a reminder lease: one day.
const MAX_LEASE_SECONDS: i64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub booking: BookingConfig,
    pub reminder: ReminderWorkerConfig,
    pub live: LiveConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    /// Language of notification texts and error messages (`ko` or `en`).
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Shared secret of the external token issuer. Tokens are only verified here.
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for reservation creation endpoints
    pub reservation_per_second: u32,
    /// Burst size for reservation creation endpoints
    pub reservation_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    /// Granularity of clinic appointment slots, in minutes.
    pub slot_minutes: u32,
    /// Maximum number of active hotel stays overlapping a candidate range.
    pub hotel_capacity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderWorkerConfig {
    /// Whether the reminder sweep worker is enabled.
    pub enabled: bool,
    /// How often (seconds) the worker sweeps for due reminders.
    pub poll_interval_seconds: u64,
    /// Maximum reminders leased in a single sweep.
    pub batch_size: u32,
    /// How long a lease stays exclusive before another sweeper may reclaim it.
    pub lease_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    /// Buffered events per live connection before the connection is dropped.
    pub channel_buffer: usize,
    /// Interval of SSE keep-alive comments.
    pub keep_alive_seconds: u64,
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                language: env::var("APP_LANG")
                    .map(|l| crate::i18n::normalize_language(&l))
                    .unwrap_or_else(|_| crate::i18n::DEFAULT_LANG.to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/app.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
            },
            rate_limit: RateLimitConfig {
                reservation_per_second: env::var("RATE_LIMIT_RESERVATIONS_PER_SECOND")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                reservation_burst: env::var("RATE_LIMIT_RESERVATIONS_BURST")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
            },
            booking: BookingConfig {
                slot_minutes: env::var("BOOKING_SLOT_MINUTES")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("BOOKING_SLOT_MINUTES".to_string()))?,
                hotel_capacity: env::var("BOOKING_HOTEL_CAPACITY")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .map_err(|_| {
                        ConfigError::InvalidValue("BOOKING_HOTEL_CAPACITY".to_string())
                    })?,
            },
            reminder: ReminderWorkerConfig {
                enabled: env_flag("REMINDER_WORKER_ENABLED", true),
                poll_interval_seconds: env::var("REMINDER_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30u64),
                batch_size: env::var("REMINDER_BATCH_SIZE")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100u32),
                lease_seconds: env::var("REMINDER_LEASE_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300i64),
            },
            live: LiveConfig {
                channel_buffer: env::var("LIVE_CHANNEL_BUFFER")
                    .unwrap_or_else(|_| "64".to_string())
                    .parse()
                    .unwrap_or(64usize),
                keep_alive_seconds: env::var("LIVE_KEEP_ALIVE_SECONDS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .unwrap_or(15u64),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !crate::i18n::is_supported_language(&self.server.language) {
            return Err(ConfigError::InvalidValue(format!(
                "APP_LANG (unsupported language {})",
                self.server.language
            )));
        }
        let slot = self.booking.slot_minutes;
        if slot == 0 || 60 % slot != 0 {
            return Err(ConfigError::InvalidValue(
                "BOOKING_SLOT_MINUTES (must divide 60)".to_string(),
            ));
        }
        if self.booking.hotel_capacity <= 0 {
            return Err(ConfigError::InvalidValue(
                "BOOKING_HOTEL_CAPACITY (must be positive)".to_string(),
            ));
        }
        if !(1..=MAX_LEASE_SECONDS).contains(&self.reminder.lease_seconds) {
            return Err(ConfigError::InvalidValue(format!(
                "REMINDER_LEASE_SECONDS (must be between 1 and {})",
                MAX_LEASE_SECONDS
            )));
        }
        if self.live.channel_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "LIVE_CHANNEL_BUFFER (must be positive)".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
                language: crate::i18n::DEFAULT_LANG.to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/app.db".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: String::new(),
            },
            rate_limit: RateLimitConfig {
                reservation_per_second: 5,
                reservation_burst: 20,
            },
            booking: BookingConfig {
                slot_minutes: 30,
                hotel_capacity: 15,
            },
            reminder: ReminderWorkerConfig {
                enabled: true,
                poll_interval_seconds: 30,
                batch_size: 100,
                lease_seconds: 300,
            },
            live: LiveConfig {
                channel_buffer: 64,
                keep_alive_seconds: 15,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.booking.slot_minutes, 30);
        assert_eq!(config.booking.hotel_capacity, 15);
    }

    #[test]
    fn rejects_slot_that_does_not_divide_an_hour() {
        let mut config = Config::default();
        config.booking.slot_minutes = 25;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn rejects_lease_outside_allowed_range() {
        for lease in [0, -5, MAX_LEASE_SECONDS + 1, i64::MAX] {
            let mut config = Config::default();
            config.reminder.lease_seconds = lease;
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidValue(_))),
                "lease {} accepted",
                lease
            );
        }

        let mut config = Config::default();
        config.reminder.lease_seconds = MAX_LEASE_SECONDS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_language() {
        let mut config = Config::default();
        config.server.language = "fr".to_string();
        assert!(config.validate().is_err());
    }
}
