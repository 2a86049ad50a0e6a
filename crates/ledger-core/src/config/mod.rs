//! Client sync configuration.
//!
//! Values come from the process environment (`LEDGER_*`) through a lookup
//! closure so parsing can be tested without touching real env vars.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::EntityType;
use crate::sync::{RetryPolicy, DEFAULT_CACHE_TYPES};
use crate::util::{is_http_url, normalize_text_option};

pub const API_BASE_URL_VAR: &str = "LEDGER_API_BASE_URL";
const TIMEOUT_VAR: &str = "LEDGER_SYNC_TIMEOUT_SECS";
const MAX_ATTEMPTS_VAR: &str = "LEDGER_SYNC_MAX_ATTEMPTS";
const BASE_DELAY_VAR: &str = "LEDGER_SYNC_BASE_DELAY_MS";
const MAX_DELAY_VAR: &str = "LEDGER_SYNC_MAX_DELAY_MS";
const CACHE_TYPES_VAR: &str = "LEDGER_SYNC_CACHE_TYPES";

/// Settings for talking to the ledger API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Server root, without a trailing slash. Only needed for network commands.
    pub api_base_url: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Entity types pulled into the local cache after each pass
    pub cache_types: Vec<EntityType>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            cache_types: DEFAULT_CACHE_TYPES.to_vec(),
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let api_base_url = lookup(API_BASE_URL_VAR)
            .and_then(|value| normalize_text_option(Some(value)))
            .map(|value| validate_base_url(&value))
            .transpose()?;

        let timeout_secs = parse_in_range(&lookup, TIMEOUT_VAR, 15, 1..=300)?;
        let max_attempts = parse_in_range(&lookup, MAX_ATTEMPTS_VAR, 3, 1..=10)?;
        let base_delay_ms = parse_in_range(&lookup, BASE_DELAY_VAR, 1_000, 0..=60_000)?;
        let max_delay_ms = parse_in_range(&lookup, MAX_DELAY_VAR, 30_000, 0..=600_000)?;
        if max_delay_ms < base_delay_ms {
            return Err(Error::Config(format!(
                "{MAX_DELAY_VAR} must be >= {BASE_DELAY_VAR}"
            )));
        }

        let cache_types = match lookup(CACHE_TYPES_VAR).and_then(|value| normalize_text_option(Some(value))) {
            Some(raw) => parse_cache_types(&raw)?,
            None => defaults.cache_types,
        };

        Ok(Self {
            api_base_url,
            request_timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy {
                max_attempts: u32::try_from(max_attempts).unwrap_or(3),
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
            },
            cache_types,
        })
    }

    /// Replace the API base URL, e.g. from a command-line flag.
    pub fn with_api_base_url(mut self, url: &str) -> Result<Self> {
        self.api_base_url = Some(validate_base_url(url)?);
        Ok(self)
    }

    /// The API base URL, or a configuration error naming the variable to set.
    pub fn require_api_base_url(&self) -> Result<&str> {
        self.api_base_url.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "{API_BASE_URL_VAR} is not set (or pass --api-url)"
            ))
        })
    }
}

fn validate_base_url(value: &str) -> Result<String> {
    let value = value.trim();
    if !is_http_url(value) {
        return Err(Error::Config(format!(
            "{API_BASE_URL_VAR} must start with http:// or https://"
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64> {
    let Some(raw) = lookup(name).and_then(|value| normalize_text_option(Some(value))) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        Error::Config(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(Error::Config(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn parse_cache_types(raw: &str) -> Result<Vec<EntityType>> {
    let mut types = Vec::new();
    for segment in raw.split(',').map(str::trim).filter(|segment| !segment.is_empty()) {
        let entity_type = segment
            .parse::<EntityType>()
            .map_err(|_| Error::Config(format!("{CACHE_TYPES_VAR}: unknown entity type '{segment}'")))?;
        if !types.contains(&entity_type) {
            types.push(entity_type);
        }
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<SyncSettings> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        SyncSettings::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert!(settings.require_api_base_url().is_err());
    }

    #[test]
    fn parses_all_values() {
        let settings = settings(&[
            ("LEDGER_API_BASE_URL", " https://ledger.example.com/ "),
            ("LEDGER_SYNC_TIMEOUT_SECS", "30"),
            ("LEDGER_SYNC_MAX_ATTEMPTS", "5"),
            ("LEDGER_SYNC_BASE_DELAY_MS", "250"),
            ("LEDGER_SYNC_MAX_DELAY_MS", "4000"),
            ("LEDGER_SYNC_CACHE_TYPES", "rates, payments,rates"),
        ])
        .unwrap();

        assert_eq!(
            settings.require_api_base_url().unwrap(),
            "https://ledger.example.com"
        );
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.base_delay, Duration::from_millis(250));
        assert_eq!(settings.retry.max_delay, Duration::from_millis(4_000));
        assert_eq!(
            settings.cache_types,
            vec![EntityType::Rate, EntityType::Payment]
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        let error = settings(&[("LEDGER_SYNC_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(error.to_string().contains("LEDGER_SYNC_MAX_ATTEMPTS"));

        let error = settings(&[("LEDGER_SYNC_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(error.to_string().contains("LEDGER_SYNC_TIMEOUT_SECS"));

        let error = settings(&[
            ("LEDGER_SYNC_BASE_DELAY_MS", "5000"),
            ("LEDGER_SYNC_MAX_DELAY_MS", "1000"),
        ])
        .unwrap_err();
        assert!(error.to_string().contains("LEDGER_SYNC_MAX_DELAY_MS"));
    }

    #[test]
    fn rejects_bad_urls_and_types() {
        assert!(settings(&[("LEDGER_API_BASE_URL", "ledger.example.com")]).is_err());
        assert!(settings(&[("LEDGER_SYNC_CACHE_TYPES", "suppliers,widgets")]).is_err());
    }

    #[test]
    fn flag_overrides_env_url() {
        let settings = settings(&[("LEDGER_API_BASE_URL", "http://a.example.com")])
            .unwrap()
            .with_api_base_url("http://127.0.0.1:8080/")
            .unwrap();
        assert_eq!(settings.api_base_url.as_deref(), Some("http://127.0.0.1:8080"));
    }
}
