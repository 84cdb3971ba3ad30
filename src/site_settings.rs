//! Per-site settings.
//!
//! Persisted under `fp_site_settings` as a map from hostname to
//! `{enabled, reason?, ...overrides}`. A site with `enabled: false` is
//! whitelisted and gets no hooks at all; any other keys are config
//! overrides merged over the global config for that site.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::FingerprintConfig;
use crate::error::Result;
use crate::storage::{load_json, save_json, KeyValueStore, SITE_SETTINGS_KEY};

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Config keys overridden for this site.
    #[serde(flatten)]
    pub overrides: Map<String, Value>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            reason: None,
            overrides: Map::new(),
        }
    }
}

impl SiteSettings {
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            enabled: false,
            reason: Some(reason.into()),
            overrides: Map::new(),
        }
    }
}

/// Hostname of an origin (`https://a.example:8443` -> `a.example`).
/// Bare hostnames are returned lowercased.
pub fn host_of(origin: &str) -> String {
    let origin = origin.trim();
    let rest = match origin.find("://") {
        Some(pos) => &origin[pos + 3..],
        None => origin,
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or(authority);

    // Bracketed IPv6 literals keep their colons
    let host = if let Some(stripped) = authority.strip_prefix('[') {
        stripped.split(']').next().unwrap_or_default()
    } else {
        authority.split(':').next().unwrap_or_default()
    };
    host.to_ascii_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteSettingsStore {
    sites: BTreeMap<String, SiteSettings>,
}

impl SiteSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the stored map. A missing or unreadable document is empty.
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Self {
        match load_json::<BTreeMap<String, SiteSettings>, _>(store, SITE_SETTINGS_KEY) {
            Ok(sites) => Self {
                sites: sites.unwrap_or_default(),
            },
            Err(e) => {
                log::debug!("[fp][sites] Ignoring stored site settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<()> {
        save_json(store, SITE_SETTINGS_KEY, &self.sites)
    }

    pub fn get(&self, origin: &str) -> Option<&SiteSettings> {
        self.sites.get(&host_of(origin))
    }

    pub fn set(&mut self, domain: &str, settings: SiteSettings) {
        self.sites.insert(host_of(domain), settings);
    }

    /// `false` only for whitelisted sites.
    pub fn is_enabled(&self, origin: &str) -> bool {
        self.get(origin).map_or(true, |s| s.enabled)
    }

    /// Global config with this site's overrides merged in.
    pub fn effective_config(&self, base: &FingerprintConfig, origin: &str) -> Result<FingerprintConfig> {
        match self.get(origin) {
            Some(site) if !site.overrides.is_empty() => {
                base.merged_with(&Value::Object(site.overrides.clone()))
            }
            _ => Ok(base.clone()),
        }
    }

    /// Whitelist a domain.
    pub fn disable(&mut self, domain: &str, reason: impl Into<String>) {
        self.set(domain, SiteSettings::disabled(reason));
    }

    /// Remove a domain's entry, whitelisted or not.
    pub fn enable(&mut self, domain: &str) -> Option<SiteSettings> {
        self.sites.remove(&host_of(domain))
    }

    /// Whitelisted hostnames with their reasons, sorted by hostname.
    pub fn whitelisted(&self) -> Vec<(&str, Option<&str>)> {
        self.sites
            .iter()
            .filter(|(_, s)| !s.enabled)
            .map(|(host, s)| (host.as_str(), s.reason.as_deref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
