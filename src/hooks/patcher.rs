//! Sub-hook helpers shared by the installers.
//!
//! A [`Patcher`] collects the patches of one installer. Each `patch_*`
//! call is a sub-hook: it checks the stealth registry, installs the
//! replacement, marks both the original and the replacement, and absorbs
//! its own failure so the remaining sub-hooks still run.

use std::rc::Rc;

use super::host::{native, NativeFn, PatchHandle, PatchSet, Realm, Slot};
use crate::engine::Environment;
use crate::error::{Result, ShufflerError};

pub struct Patcher<'a> {
    env: &'a Rc<Environment>,
    realm: &'a Realm,
    surface: &'static str,
    patches: PatchSet,
}

impl<'a> Patcher<'a> {
    pub fn new(env: &'a Rc<Environment>, realm: &'a Realm, surface: &'static str) -> Self {
        Self {
            env,
            realm,
            surface,
            patches: PatchSet::new(),
        }
    }

    pub fn env(&self) -> &Rc<Environment> {
        self.env
    }

    pub fn realm(&self) -> &Realm {
        self.realm
    }

    /// Replace `object.name`. `wrap` receives the original method.
    pub fn patch_method<W>(&mut self, object: &str, name: &str, wrap: W)
    where
        W: FnOnce(NativeFn) -> NativeFn,
    {
        let result = self.try_patch_method(object, name, wrap);
        self.absorb(object, name, result);
    }

    /// Define a configurable getter at `object.name`. `wrap` receives the
    /// current reader (getter or stored value), if any.
    pub fn patch_getter<W>(&mut self, object: &str, name: &str, wrap: W)
    where
        W: FnOnce(Option<NativeFn>) -> NativeFn,
    {
        let result = self.try_patch_getter(object, name, true, wrap);
        self.absorb(object, name, result);
    }

    /// Like [`patch_getter`](Self::patch_getter) but the new property is
    /// not configurable, so the page cannot redefine it.
    pub fn lock_getter<W>(&mut self, object: &str, name: &str, wrap: W)
    where
        W: FnOnce(Option<NativeFn>) -> NativeFn,
    {
        let result = self.try_patch_getter(object, name, false, wrap);
        self.absorb(object, name, result);
    }

    /// Run a sub-hook that does not fit the method/getter shape.
    pub fn attempt<F>(&mut self, label: &str, f: F)
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if let Err(e) = f(self) {
            if self.env.is_debug() {
                log::debug!("⚠️  [{}] {} failed: {}", self.surface, label, e);
            }
        }
    }

    pub fn finish(self) -> PatchSet {
        if self.env.is_debug() && !self.patches.is_empty() {
            log::debug!(
                "🔧 [{}] hooked {}",
                self.surface,
                self.patches.targets().join(", ")
            );
        }
        self.patches
    }

    fn try_patch_method<W>(&self, object: &str, name: &str, wrap: W) -> Result<Option<PatchHandle>>
    where
        W: FnOnce(NativeFn) -> NativeFn,
    {
        let captured = self
            .realm
            .capture(object, name)
            .ok_or_else(|| ShufflerError::missing(object, name))?;
        let stealth = self.env.stealth();
        if stealth.is_patched(captured.original()) {
            return Ok(None);
        }

        let replacement = wrap(Rc::clone(captured.original()));
        let handle = captured.install(self.realm, Rc::clone(&replacement))?;
        stealth.mark_patched(captured.original());
        stealth.mark_patched(&replacement);
        Ok(Some(handle))
    }

    fn try_patch_getter<W>(
        &self,
        object: &str,
        name: &str,
        configurable: bool,
        wrap: W,
    ) -> Result<Option<PatchHandle>>
    where
        W: FnOnce(Option<NativeFn>) -> NativeFn,
    {
        if !self.realm.has_object(object) {
            return Err(ShufflerError::missing(object, name));
        }
        let stealth = self.env.stealth();
        let existing = self.realm.property(object, name);
        if existing.as_ref().is_some_and(|p| !p.configurable) {
            return Err(ShufflerError::non_configurable(object, name));
        }

        let (reader, original) = match existing.map(|p| p.slot) {
            Some(Slot::Accessor(getter)) => {
                if stealth.is_patched(&getter) {
                    return Ok(None);
                }
                (Some(Rc::clone(&getter)), Some(getter))
            }
            Some(Slot::Data(value)) => (Some(native(move |_, _| Ok(value.clone()))), None),
            Some(Slot::Method(_)) | None => (None, None),
        };

        let replacement = wrap(reader);
        let handle =
            self.realm
                .define_getter(object, name, Rc::clone(&replacement), configurable)?;
        if let Some(original) = &original {
            stealth.mark_patched(original);
        }
        stealth.mark_patched(&replacement);
        Ok(Some(handle))
    }

    fn absorb(&mut self, object: &str, name: &str, result: Result<Option<PatchHandle>>) {
        let debug = self.env.is_debug();
        match result {
            Ok(Some(handle)) => self.patches.push(handle),
            Ok(None) => {
                if debug {
                    log::debug!("[{}] {}.{} already patched", self.surface, object, name);
                }
            }
            Err(e) if e.is_skip() => {
                if debug {
                    log::debug!("⏭️  [{}] {}", self.surface, e);
                }
            }
            Err(e) => {
                if debug {
                    log::debug!("⚠️  [{}] {}.{} failed: {}", self.surface, object, name, e);
                }
            }
        }
    }
}
