//! Navigator hardware fuzzing.
//!
//! Values are drawn once at install and then served by locked getters, so
//! a page sees one stable device for the lifetime of the context.

use std::rc::Rc;

use super::host::{native, NativeFn, PatchSet, Realm, Value};
use super::patcher::Patcher;
use crate::engine::{Environment, HookInstaller};
use crate::error::Result;
use crate::stats::StatCategory;

pub const NAVIGATOR: &str = "navigator";

const DEFAULT_CORES: f64 = 4.0;
const DEFAULT_MEMORY_GB: f64 = 8.0;
const MIN_CORES: f64 = 2.0;
const MIN_MEMORY_GB: f64 = 4.0;

/// `max(floor, real + floor((draw - 0.5) * 4))`.
pub fn fuzz_count(real: f64, floor: f64, draw: f64) -> f64 {
    (real + ((draw - 0.5) * 4.0).floor()).max(floor)
}

/// Shuffle every language after the first; the primary stays in front.
pub fn shuffle_languages(env: &Environment, languages: &mut [Value]) {
    if let Some((_, rest)) = languages.split_first_mut() {
        env.prng().shuffle(rest);
    }
}

fn real_number(realm: &Realm, name: &str, fallback: f64) -> f64 {
    realm
        .get(NAVIGATOR, name)
        .ok()
        .and_then(|v| v.as_f64())
        .filter(|n| *n != 0.0 && !n.is_nan())
        .unwrap_or(fallback)
}

fn fixed(env: &Rc<Environment>, value: Value) -> NativeFn {
    let env = Rc::clone(env);
    native(move |_, _| {
        Ok(env.timing().guard(|| {
            env.record(StatCategory::Navigator);
            value.clone()
        }))
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NavigatorInstaller;

impl HookInstaller for NavigatorInstaller {
    fn name(&self) -> &str {
        "navigator"
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        let config = env.config();
        if !config.enable_navigator_fuzz || !realm.has_object(NAVIGATOR) {
            return Ok(PatchSet::new());
        }
        let options = &config.navigator;

        // Both draws happen whatever the sub-flags say
        let cores = fuzz_count(
            real_number(realm, "hardwareConcurrency", DEFAULT_CORES),
            MIN_CORES,
            env.draw(),
        );
        let memory = fuzz_count(
            real_number(realm, "deviceMemory", DEFAULT_MEMORY_GB),
            MIN_MEMORY_GB,
            env.draw(),
        );

        let mut patcher = Patcher::new(env, realm, "navigator");

        if options.fuzz_hardware_concurrency {
            patcher.lock_getter(NAVIGATOR, "hardwareConcurrency", |_| {
                fixed(env, Value::Number(cores))
            });
        }
        if options.fuzz_device_memory && realm.has_property(NAVIGATOR, "deviceMemory") {
            patcher.lock_getter(NAVIGATOR, "deviceMemory", |_| fixed(env, Value::Number(memory)));
        }
        if options.shuffle_languages {
            patcher.attempt("languages", |patcher| {
                let Value::List(mut languages) = realm.get(NAVIGATOR, "languages")? else {
                    return Ok(());
                };
                if languages.len() < 3 {
                    return Ok(());
                }
                shuffle_languages(env, &mut languages);
                patcher.lock_getter(NAVIGATOR, "languages", |_| {
                    fixed(env, Value::List(languages))
                });
                Ok(())
            });
        }

        Ok(patcher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FingerprintConfig;
    use crate::engine::EnvironmentBuilder;

    fn realm(with_memory: bool) -> Realm {
        let realm = Realm::new();
        realm.set_value(NAVIGATOR, "hardwareConcurrency", 8u32).set_value(
            NAVIGATOR,
            "languages",
            Value::List(vec!["en-US".into(), "en".into(), "de".into(), "fr".into()]),
        );
        if with_memory {
            realm.set_value(NAVIGATOR, "deviceMemory", 16u32);
        }
        realm
    }

    fn env(seed: u32) -> Rc<Environment> {
        Rc::new(EnvironmentBuilder::new(FingerprintConfig::default()).build_with_seed(seed))
    }

    #[test]
    fn test_fuzz_count_bounds() {
        assert_eq!(fuzz_count(8.0, 2.0, 0.0), 6.0);
        assert_eq!(fuzz_count(8.0, 2.0, 0.999), 9.0);
        assert_eq!(fuzz_count(2.0, 2.0, 0.0), 2.0);
        assert_eq!(fuzz_count(4.0, 4.0, 0.5), 4.0);
    }

    #[test]
    fn test_hardware_values_fuzzed_and_stable() {
        for seed in 0..50 {
            let realm = realm(true);
            NavigatorInstaller.install(&env(seed), &realm).unwrap();
            let cores = realm.get(NAVIGATOR, "hardwareConcurrency").unwrap().as_f64().unwrap();
            assert!((6.0..=9.0).contains(&cores));
            assert_eq!(realm.get(NAVIGATOR, "hardwareConcurrency").unwrap().as_f64(), Some(cores));

            let memory = realm.get(NAVIGATOR, "deviceMemory").unwrap().as_f64().unwrap();
            assert!((14.0..=17.0).contains(&memory));
        }
    }

    #[test]
    fn test_absent_device_memory_stays_absent() {
        let realm = realm(false);
        NavigatorInstaller.install(&env(1), &realm).unwrap();
        assert!(!realm.has_property(NAVIGATOR, "deviceMemory"));
    }

    #[test]
    fn test_primary_language_kept_first() {
        for seed in 0..20 {
            let realm = realm(true);
            NavigatorInstaller.install(&env(seed), &realm).unwrap();
            let languages = realm.get(NAVIGATOR, "languages").unwrap();
            let languages = languages.as_list().unwrap();
            assert_eq!(languages.len(), 4);
            assert_eq!(languages[0], Value::from("en-US"));
        }
    }

    #[test]
    fn test_getters_are_locked() {
        let realm = realm(true);
        NavigatorInstaller.install(&env(1), &realm).unwrap();
        assert!(!realm.property(NAVIGATOR, "hardwareConcurrency").unwrap().configurable);
    }

    #[test]
    fn test_sub_flags() {
        let mut config = FingerprintConfig::default();
        config.navigator.fuzz_hardware_concurrency = false;
        config.navigator.shuffle_languages = false;
        let env = Rc::new(EnvironmentBuilder::new(config).build_with_seed(1));
        let realm = realm(true);
        let set = NavigatorInstaller.install(&env, &realm).unwrap();
        assert_eq!(set.targets(), vec!["navigator.deviceMemory"]);
        assert_eq!(realm.get(NAVIGATOR, "hardwareConcurrency").unwrap(), Value::Number(8.0));
    }
}
