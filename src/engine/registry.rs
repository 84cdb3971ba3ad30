//! Hook installer registry.
//!
//! Installers are registered in a fixed order and drained exactly once per
//! context. Every installer runs in isolation: an error or panic in one is
//! recorded and the rest still run.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use serde::Serialize;

use super::environment::Environment;
use crate::error::Result;
use crate::hooks::host::{PatchSet, Realm};

/// Installs the interceptions for one surface.
pub trait HookInstaller {
    fn name(&self) -> &str;

    /// Patch `realm`. An empty set means the surface was skipped
    /// (disabled or absent).
    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet>;
}

/// Closure-backed installer.
pub struct FnInstaller<F> {
    name: String,
    install: F,
}

impl<F> FnInstaller<F>
where
    F: Fn(&Rc<Environment>, &Realm) -> Result<PatchSet>,
{
    pub fn new(name: impl Into<String>, install: F) -> Self {
        Self {
            name: name.into(),
            install,
        }
    }
}

impl<F> HookInstaller for FnInstaller<F>
where
    F: Fn(&Rc<Environment>, &Realm) -> Result<PatchSet>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        (self.install)(env, realm)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of draining a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<InstallFailure>,
}

impl InstallReport {
    pub fn count(&self) -> usize {
        self.applied.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Report plus the patches to undo them.
#[derive(Debug, Default)]
pub struct Installed {
    pub report: InstallReport,
    pub patches: Vec<PatchSet>,
}

impl Installed {
    /// Undo every installer, last first.
    pub fn restore(self, realm: &Realm) {
        for set in self.patches.into_iter().rev() {
            set.restore(realm);
        }
    }
}

#[derive(Default)]
pub struct InstallerRegistry {
    installers: Vec<Box<dyn HookInstaller>>,
}

impl InstallerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, installer: impl HookInstaller + 'static) -> &mut Self {
        self.installers.push(Box::new(installer));
        self
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, install: F) -> &mut Self
    where
        F: Fn(&Rc<Environment>, &Realm) -> Result<PatchSet> + 'static,
    {
        self.register(FnInstaller::new(name, install))
    }

    pub fn len(&self) -> usize {
        self.installers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.installers.iter().map(|i| i.name()).collect()
    }

    /// Run every installer in registration order, consuming the registry.
    pub fn drain(self, env: &Rc<Environment>, realm: &Realm) -> Installed {
        let mut installed = Installed::default();

        for installer in self.installers {
            let name = installer.name().to_string();
            let outcome = catch_unwind(AssertUnwindSafe(|| installer.install(env, realm)));

            match outcome {
                Ok(Ok(set)) if set.is_empty() => {
                    if env.is_debug() {
                        log::debug!("⏭️  {} skipped", name);
                    }
                    installed.report.skipped.push(name);
                }
                Ok(Ok(set)) => {
                    if env.is_debug() {
                        log::debug!("✅ {} installed ({} patches)", name, set.len());
                    }
                    installed.report.applied.push(name);
                    installed.patches.push(set);
                }
                Ok(Err(e)) => {
                    if env.is_debug() {
                        log::debug!("❌ {} failed: {}", name, e);
                    }
                    installed.report.failed.push(InstallFailure {
                        name,
                        reason: e.to_string(),
                    });
                }
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    if env.is_debug() {
                        log::debug!("❌ {} panicked: {}", name, reason);
                    }
                    installed.report.failed.push(InstallFailure { name, reason });
                }
            }
        }

        installed
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
