//! Battery, memory, timer, network and peripheral signals.

use std::cell::Cell;
use std::rc::Rc;

use super::host::{native, NativeFn, PatchSet, Realm, Value};
use super::navigator::NAVIGATOR;
use super::patcher::Patcher;
use crate::engine::{Environment, HookInstaller};
use crate::error::Result;
use crate::stats::StatCategory;

pub const PERFORMANCE: &str = "performance";
pub const PERFORMANCE_MEMORY: &str = "performance.memory";
pub const CONNECTION: &str = "navigator.connection";
pub const KEYBOARD_EVENT: &str = "KeyboardEvent.prototype";

const DEFAULT_HEAP_LIMIT: f64 = 2_172_649_472.0;
const DEFAULT_HEAP_USED: f64 = 10_000_000.0;
const CONNECTION_TYPES: [&str; 5] = ["4g", "4g", "4g", "wifi", "wifi"];
const GAMEPAD_SLOTS: usize = 4;

/// Upper bound (exclusive) of the per-call `performance.now()` drift, in ms.
pub const NOW_DRIFT_MS: f64 = 0.1;

/// Battery level near 75%, kept within `[0.5, 1.0]`.
pub fn battery_level(env: &Environment) -> f64 {
    (0.75 + env.noise().noise(0.1)).clamp(0.5, 1.0)
}

/// Getter that only adds the sync delay and counts the read.
fn sensor_getter<F>(env: &Rc<Environment>, read: F) -> NativeFn
where
    F: Fn(&Environment) -> Value + 'static,
{
    let env = Rc::clone(env);
    native(move |_, _| {
        env.timing().random_delay_sync();
        env.record(StatCategory::Sensor);
        Ok(read(&env))
    })
}

fn positive_or(realm: &Realm, object: &str, name: &str, fallback: f64) -> f64 {
    realm
        .get(object, name)
        .ok()
        .and_then(|v| v.as_f64())
        .filter(|n| *n != 0.0 && !n.is_nan())
        .unwrap_or(fallback)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SensorInstaller;

impl SensorInstaller {
    fn battery(patcher: &mut Patcher<'_>, env: &Rc<Environment>) {
        patcher.patch_method(NAVIGATOR, "getBattery", |original| {
            let env = Rc::clone(env);
            native(move |this, args| {
                env.timing().random_delay_sync();
                env.record(StatCategory::Sensor);
                let battery = original(this, args)?;
                let level = battery_level(&env);
                if env.is_debug() {
                    log::debug!("🔋 Battery level spoofed to {:.2}", level);
                }
                Ok(Value::record([
                    ("charging", battery.get("charging").clone()),
                    ("chargingTime", Value::Number(f64::INFINITY)),
                    ("dischargingTime", Value::Number(f64::INFINITY)),
                    ("level", Value::Number(level)),
                ]))
            })
        });
    }

    fn heap(patcher: &mut Patcher<'_>, env: &Rc<Environment>, realm: &Realm) {
        if !realm.has_object(PERFORMANCE_MEMORY) {
            return;
        }
        let used = positive_or(realm, PERFORMANCE_MEMORY, "usedJSHeapSize", DEFAULT_HEAP_USED);
        let limit = positive_or(realm, PERFORMANCE_MEMORY, "jsHeapSizeLimit", DEFAULT_HEAP_LIMIT);

        patcher.patch_getter(PERFORMANCE_MEMORY, "jsHeapSizeLimit", |_| {
            sensor_getter(env, move |env| {
                Value::Number((limit + env.noise().noise(limit * 0.05)).floor())
            })
        });
        patcher.patch_getter(PERFORMANCE_MEMORY, "totalJSHeapSize", |_| {
            sensor_getter(env, move |env| {
                Value::Number((used * 1.5 + env.noise().noise(used * 0.1)).floor())
            })
        });
        patcher.patch_getter(PERFORMANCE_MEMORY, "usedJSHeapSize", |_| {
            sensor_getter(env, move |env| {
                Value::Number((used + env.noise().noise(used * 0.1)).floor())
            })
        });
    }

    fn clock(patcher: &mut Patcher<'_>, env: &Rc<Environment>) {
        patcher.patch_method(PERFORMANCE, "now", |original| {
            let env = Rc::clone(env);
            let drift = Cell::new(0.0f64);
            native(move |this, args| {
                let real = original(this, args)?.as_f64().unwrap_or(0.0);
                drift.set(drift.get() + env.draw() * NOW_DRIFT_MS);
                Ok(Value::Number(real + drift.get()))
            })
        });
    }

    fn connection(patcher: &mut Patcher<'_>, env: &Rc<Environment>, realm: &Realm) {
        if !realm.has_object(CONNECTION) {
            return;
        }
        let kind: &'static str = CONNECTION_TYPES[env.prng().index(CONNECTION_TYPES.len())];
        let downlink = if kind == "wifi" { 10.0 } else { 5.0 };
        if env.is_debug() {
            log::debug!("📶 Connection type spoofed to {}", kind);
        }

        patcher.patch_getter(CONNECTION, "effectiveType", |_| {
            sensor_getter(env, move |_| Value::from(kind))
        });
        patcher.patch_getter(CONNECTION, "downlink", |_| {
            sensor_getter(env, move |env| Value::Number(downlink + env.noise().noise(1.0)))
        });
    }

    fn keyboard(patcher: &mut Patcher<'_>, env: &Rc<Environment>) {
        patcher.patch_method(KEYBOARD_EVENT, "getModifierState", |original| {
            let env = Rc::clone(env);
            native(move |this, args| {
                env.timing().random_delay_sync();
                env.record(StatCategory::Sensor);
                original(this, args)
            })
        });
    }

    fn gamepads(patcher: &mut Patcher<'_>, env: &Rc<Environment>) {
        patcher.patch_method(NAVIGATOR, "getGamepads", |original| {
            let env = Rc::clone(env);
            native(move |this, args| {
                env.timing().random_delay_sync();
                env.record(StatCategory::Sensor);
                let gamepads = original(this, args)?;
                if env.config().sensors.hide_gamepads {
                    return Ok(Value::List(vec![Value::Null; GAMEPAD_SLOTS]));
                }
                Ok(gamepads)
            })
        });
    }

    fn plugins(patcher: &mut Patcher<'_>, env: &Rc<Environment>) {
        for name in ["plugins", "mimeTypes"] {
            patcher.patch_getter(NAVIGATOR, name, |_| {
                sensor_getter(env, |_| Value::record([("length", Value::from(0u32))]))
            });
        }
    }
}

impl HookInstaller for SensorInstaller {
    fn name(&self) -> &str {
        "sensors"
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        if !env.config().enable_sensor_protection {
            return Ok(PatchSet::new());
        }
        let mut patcher = Patcher::new(env, realm, "sensors");

        Self::battery(&mut patcher, env);
        Self::heap(&mut patcher, env, realm);
        Self::clock(&mut patcher, env);
        Self::connection(&mut patcher, env, realm);
        Self::keyboard(&mut patcher, env);
        Self::gamepads(&mut patcher, env);
        Self::plugins(&mut patcher, env);

        Ok(patcher.finish())
    }
}
