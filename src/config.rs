use std::env;
use std::fmt::Display;
use std::str::FromStr;

use log::warn;

use crate::geo::DEFAULT_PROXIMITY_RADIUS_METERS;

/// Runtime configuration, read once at startup from the environment.
pub struct Config {
    pub port: u16,
    /// Postgres connection string; absent means in-memory only.
    pub database_url: Option<String>,
    /// Notification radius in meters.
    pub proximity_radius_meters: f64,
    /// Stored locations older than this are invisible to proximity queries.
    pub staleness_secs: i64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: parse_or("PORT", 3000),
            database_url: env::var("DATABASE_URL").ok(),
            proximity_radius_meters: parse_or(
                "PROXIMITY_RADIUS_METERS",
                DEFAULT_PROXIMITY_RADIUS_METERS,
            ),
            staleness_secs: parse_or("LOCATION_STALENESS_SECS", 300),
        }
    }

    /// The staleness window as a duration usable against row timestamps.
    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_secs)
    }
}

fn parse_or<T: FromStr + Display + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid {} value {:?}, using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
