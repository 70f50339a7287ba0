//! Process configuration from `WATCHTOWER_*` environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `WATCHTOWER_LISTEN_ADDR` | `0.0.0.0:8080` |
//! | `WATCHTOWER_WEBHOOK_SECRET` | required |
//! | `WATCHTOWER_ALLOW_UNSIGNED` | `false` |
//! | `WATCHTOWER_MERGE_STATUS_URL` | unset (merge status sync disabled) |
//! | `WATCHTOWER_SYNC_INTERVAL_SECS` | `60` |
//! | `WATCHTOWER_DATA_PATH` | unset (events kept in memory only) |
//! | `WATCHTOWER_MAX_EVENTS` | `0` (unbounded) |
//! | `WATCHTOWER_EVENTS_MAX_AGE_SECS` | `0` (no age limit) |
//! | `WATCHTOWER_GC_INTERVAL_SECS` | `60` |
//!
//! Empty values count as unset. Without a webhook secret the process refuses
//! to start unless `WATCHTOWER_ALLOW_UNSIGNED=true`, which turns signature
//! checks off for `/webhook` and the job watch bridge.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::store::StoreConfig;
use crate::webhooks::WebhookSecret;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 60;

const LISTEN_ADDR: &str = "WATCHTOWER_LISTEN_ADDR";
const WEBHOOK_SECRET: &str = "WATCHTOWER_WEBHOOK_SECRET";
const ALLOW_UNSIGNED: &str = "WATCHTOWER_ALLOW_UNSIGNED";
const MERGE_STATUS_URL: &str = "WATCHTOWER_MERGE_STATUS_URL";
const SYNC_INTERVAL_SECS: &str = "WATCHTOWER_SYNC_INTERVAL_SECS";
const DATA_PATH: &str = "WATCHTOWER_DATA_PATH";
const MAX_EVENTS: &str = "WATCHTOWER_MAX_EVENTS";
const EVENTS_MAX_AGE_SECS: &str = "WATCHTOWER_EVENTS_MAX_AGE_SECS";
const GC_INTERVAL_SECS: &str = "WATCHTOWER_GC_INTERVAL_SECS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("WATCHTOWER_WEBHOOK_SECRET is not set; set WATCHTOWER_ALLOW_UNSIGNED=true to accept unsigned requests")]
    MissingSecret,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Empty only when unsigned requests were explicitly allowed.
    pub webhook_secret: WebhookSecret,
    /// Base URL of the merge queue's status endpoint.
    pub merge_status_url: Option<String>,
    pub sync_interval: Duration,
    pub store: StoreConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let listen_addr = parse(LISTEN_ADDR, get(LISTEN_ADDR))?
            .unwrap_or(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));

        let sync_interval = positive_secs(SYNC_INTERVAL_SECS, get(SYNC_INTERVAL_SECS))?
            .unwrap_or(Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS));
        let gc_interval = positive_secs(GC_INTERVAL_SECS, get(GC_INTERVAL_SECS))?
            .unwrap_or(Duration::from_secs(DEFAULT_GC_INTERVAL_SECS));

        let events_max_age = parse::<u64>(EVENTS_MAX_AGE_SECS, get(EVENTS_MAX_AGE_SECS))?
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        let webhook_secret = WebhookSecret::new(get(WEBHOOK_SECRET).unwrap_or_default());
        let allow_unsigned = parse::<bool>(ALLOW_UNSIGNED, get(ALLOW_UNSIGNED))?.unwrap_or(false);
        if webhook_secret.is_empty() && !allow_unsigned {
            return Err(ConfigError::MissingSecret);
        }

        Ok(Config {
            listen_addr,
            webhook_secret,
            merge_status_url: get(MERGE_STATUS_URL),
            sync_interval,
            store: StoreConfig {
                data_path: get(DATA_PATH).map(PathBuf::from),
                max_events: parse(MAX_EVENTS, get(MAX_EVENTS))?.unwrap_or(0),
                events_max_age,
                gc_interval,
            },
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value
        .map(|v| v.trim().parse::<T>().map_err(|e| invalid(var, &v, e)))
        .transpose()
}

fn positive_secs(
    var: &'static str,
    value: Option<String>,
) -> Result<Option<Duration>, ConfigError> {
    match parse::<u64>(var, value)? {
        Some(0) => Err(invalid(var, "0", "must be greater than zero")),
        secs => Ok(secs.map(Duration::from_secs)),
    }
}
