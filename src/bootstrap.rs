//! Context bootstrap.
//!
//! ```text
//! site settings ──▶ whitelisted? ──yes──▶ nothing
//!        │ no
//!        ▼
//! salt (read once) ──▶ seed ──▶ generator ──▶ noise ──▶ Environment
//!                                                          │
//!                                       drain installers in order
//!                                                          ▼
//!                                                       Session
//! ```
//!
//! A salt failure means no environment: the context runs unprotected
//! rather than with a guessable seed.

use std::rc::Rc;

use crate::config::FingerprintConfig;
use crate::engine::{
    Environment, EnvironmentBuilder, InstallReport, Installed, InstallerRegistry, PageHandshake,
    PatchRegistry,
};
use crate::hooks::{default_registry, Realm};
use crate::salt::{SaltSource, StoredSaltSource};
use crate::site_settings::SiteSettingsStore;
use crate::stats::StatsSink;
use crate::storage::KeyValueStore;

/// Builds and installs one context's protection.
pub struct Shuffler<Src> {
    salt: Src,
    config: FingerprintConfig,
    sites: SiteSettingsStore,
    registry: InstallerRegistry,
    stealth: Option<Rc<PatchRegistry>>,
    stats: Option<Rc<dyn StatsSink>>,
}

impl<St: KeyValueStore> Shuffler<StoredSaltSource<Rc<St>>> {
    /// Salt, config and site settings all read from `store`.
    pub fn from_store(store: Rc<St>) -> Self {
        let config = FingerprintConfig::load(&*store);
        let sites = SiteSettingsStore::load(&*store);
        Shuffler::new(StoredSaltSource::new(store), config).site_settings(sites)
    }
}

impl<Src: SaltSource> Shuffler<Src> {
    pub fn new(salt: Src, config: FingerprintConfig) -> Self {
        Self {
            salt,
            config,
            sites: SiteSettingsStore::new(),
            registry: default_registry(),
            stealth: None,
            stats: None,
        }
    }

    pub fn site_settings(mut self, sites: SiteSettingsStore) -> Self {
        self.sites = sites;
        self
    }

    /// Replace the built-in installers.
    pub fn registry(mut self, registry: InstallerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Append an installer after the built-in ones.
    pub fn with_installer(
        mut self,
        installer: impl crate::engine::HookInstaller + 'static,
    ) -> Self {
        self.registry.register(installer);
        self
    }

    pub fn patch_registry(mut self, stealth: Rc<PatchRegistry>) -> Self {
        self.stealth = Some(stealth);
        self
    }

    pub fn stats_sink(mut self, stats: Rc<dyn StatsSink>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Build the environment for `origin` without installing anything.
    ///
    /// Returns `None` when the salt cannot be read.
    pub async fn prepare(&self, origin: Option<&str>) -> Option<Rc<Environment>> {
        let config = match origin {
            Some(origin) => self
                .sites
                .effective_config(&self.config, origin)
                .unwrap_or_else(|e| {
                    log::debug!("[fp][bootstrap] Ignoring site overrides: {}", e);
                    self.config.clone()
                }),
            None => self.config.clone(),
        };

        let salt = match self.salt.get_salt().await {
            Ok(salt) => salt,
            Err(e) => {
                log::warn!("⚠️  No fingerprint environment: {}", e);
                return None;
            }
        };

        let mut builder = EnvironmentBuilder::new(config);
        if let Some(origin) = origin {
            builder = builder.origin(origin);
        }
        if let Some(stealth) = &self.stealth {
            builder = builder.patch_registry(Rc::clone(stealth));
        }
        if let Some(stats) = &self.stats {
            builder = builder.stats_sink(Rc::clone(stats));
        }
        let env = builder.build(salt);
        if env.is_debug() {
            log::debug!("🌱 Environment ready: {:?}", env);
        }
        Some(Rc::new(env))
    }

    /// Handshake for the page world of `origin`, or `None` when the site is
    /// whitelisted or no environment can be built.
    pub async fn handshake(&self, origin: Option<&str>) -> Option<PageHandshake> {
        if origin.is_some_and(|o| !self.sites.is_enabled(o)) {
            return None;
        }
        self.prepare(origin).await.map(|env| env.handshake())
    }

    /// Bootstrap `origin` and patch `realm`.
    ///
    /// `None` when the site is whitelisted or the environment could not be
    /// built; the realm is untouched in both cases.
    pub async fn run(self, origin: Option<&str>, realm: &Realm) -> Option<Session> {
        if let Some(origin) = origin {
            if !self.sites.is_enabled(origin) {
                log::info!("⏸️  Fingerprint protection disabled for {}", origin);
                return None;
            }
        }

        let env = self.prepare(origin).await?;
        let installed = self.registry.drain(&env, realm);
        if !installed.report.is_clean() {
            log::warn!(
                "⚠️  {} installer(s) failed: {}",
                installed.report.failed.len(),
                installed
                    .report
                    .failed
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        log::info!(
            "🛡️  Fingerprint protection active ({} surfaces)",
            installed.report.count()
        );
        Some(Session { env, installed })
    }
}

/// A protected context.
#[derive(Debug)]
pub struct Session {
    env: Rc<Environment>,
    installed: Installed,
}

impl Session {
    pub fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    pub fn report(&self) -> &InstallReport {
        &self.installed.report
    }

    /// Message letting the page world rebuild the same stream.
    pub fn handshake(&self) -> PageHandshake {
        self.env.handshake()
    }

    /// Undo every patch. Prunes the stealth registry afterwards.
    pub fn teardown(self, realm: &Realm) {
        let stealth = Rc::clone(self.env.stealth());
        self.installed.restore(realm);
        drop(self.env);
        stealth.prune();
    }
}
