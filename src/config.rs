use std::{env, path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use crate::{
    error::AppError,
    models::actor::ActorRole,
    services::{
        pricing::FareTable, reconcile::SyncSettings, session_store::DEFAULT_COUNTERPART_NAME,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreLocation {
    Directory(PathBuf),
    Sqlite(String),
}

impl StoreLocation {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("sqlite:") {
            StoreLocation::Sqlite(raw.to_string())
        } else {
            StoreLocation::Directory(PathBuf::from(raw))
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreLocation,
    pub api_base_url: Url,
    pub request_timeout: Duration,
    pub sync: SyncSettings,
    pub fares: FareTable,
    /// Counterpart name on locally requested trips until the backend assigns one.
    pub counterpart_placeholder: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let store = StoreLocation::parse(
            &env::var("RIDESYNC_STORE").unwrap_or_else(|_| "ridesync-data".to_string()),
        );

        let api_base_url = env::var("RIDESYNC_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080/api".to_string());
        let api_base_url = Url::parse(&api_base_url)
            .map_err(|err| AppError::Config(format!("invalid RIDESYNC_API_URL: {err}")))?;

        let request_timeout =
            Duration::from_secs(parse_var("RIDESYNC_REQUEST_TIMEOUT_SECS", 10u64)?);

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            role: parse_var("RIDESYNC_ROLE", ActorRole::Customer)?,
            history_page_size: parse_var("RIDESYNC_HISTORY_PAGE_SIZE", defaults.history_page_size)?,
            display_limit: parse_var("RIDESYNC_DISPLAY_LIMIT", defaults.display_limit)?,
            drain_policy: parse_var("RIDESYNC_DRAIN_POLICY", defaults.drain_policy)?,
            rating_fallback: parse_var("RIDESYNC_RATING_FALLBACK", defaults.rating_fallback)?,
            currency: env::var("RIDESYNC_CURRENCY").unwrap_or(defaults.currency),
        };

        let fare_defaults = FareTable::default();
        let fares = FareTable {
            per_km: parse_var("RIDESYNC_FARE_PER_KM", fare_defaults.per_km)?,
            minimum: parse_var("RIDESYNC_FARE_MINIMUM", fare_defaults.minimum)?,
            currency: sync.currency.clone(),
        };

        let counterpart_placeholder = env::var("RIDESYNC_COUNTERPART_PLACEHOLDER")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_counterpart_placeholder(sync.role).to_string());

        Ok(Self {
            store,
            api_base_url,
            request_timeout,
            sync,
            fares,
            counterpart_placeholder,
        })
    }
}

/// Customers wait for a driver, drivers for a customer.
pub fn default_counterpart_placeholder(role: ActorRole) -> &'static str {
    match role {
        ActorRole::Customer => DEFAULT_COUNTERPART_NAME,
        ActorRole::Driver => "Waiting for customer",
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|err| AppError::Config(format!("invalid {name}: {err}"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_urls_select_the_sqlite_backend() {
        assert_eq!(
            StoreLocation::parse("sqlite://device.db"),
            StoreLocation::Sqlite("sqlite://device.db".into())
        );
        assert_eq!(
            StoreLocation::parse("data/device"),
            StoreLocation::Directory(PathBuf::from("data/device"))
        );
    }

    #[test]
    fn placeholder_names_the_other_side() {
        assert_eq!(
            default_counterpart_placeholder(ActorRole::Customer),
            DEFAULT_COUNTERPART_NAME
        );
        assert_eq!(
            default_counterpart_placeholder(ActorRole::Driver),
            "Waiting for customer"
        );
    }
}
