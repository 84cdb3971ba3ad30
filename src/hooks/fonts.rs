//! Font enumeration and text metric noise.

use std::rc::Rc;

use super::canvas::CONTEXT_2D;
use super::host::{native, PatchSet, Realm, Value};
use super::patcher::Patcher;
use crate::engine::{Environment, HookInstaller};
use crate::error::Result;
use crate::stats::StatCategory;

pub const FONT_FACE_SET: &str = "document.fonts";

/// Relative noise applied to text metrics.
pub const METRIC_NOISE: f64 = 0.01;

/// Chance that a `check()` answer is inverted.
pub const CHECK_FLIP_RATE: f64 = 0.1;

const NOISED_METRICS: [&str; 6] = [
    "actualBoundingBoxLeft",
    "actualBoundingBoxRight",
    "actualBoundingBoxAscent",
    "actualBoundingBoxDescent",
    "fontBoundingBoxAscent",
    "fontBoundingBoxDescent",
];

const PASSTHROUGH_METRICS: [&str; 5] = [
    "alphabeticBaseline",
    "hangingBaseline",
    "ideographicBaseline",
    "emHeightAscent",
    "emHeightDescent",
];

/// `TextMetrics` with width noised by 1% of itself and bounding boxes by a
/// flat 0.01. A draw is taken for every noised field, present or not.
pub fn noise_metrics(env: &Environment, metrics: &Value) -> Value {
    let mut out = Value::Record(Default::default());

    let width = metrics.get("width").as_f64();
    let delta = env.noise().noise(width.unwrap_or(0.0) * METRIC_NOISE);
    if let Some(width) = width {
        out.set("width", width + delta);
    }
    for name in NOISED_METRICS {
        let delta = env.noise().noise(METRIC_NOISE);
        if let Some(value) = metrics.get(name).as_f64() {
            out.set(name, value + delta);
        }
    }
    for name in PASSTHROUGH_METRICS {
        let value = metrics.get(name);
        if !value.is_nullish() {
            out.set(name, value.clone());
        }
    }
    out
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FontInstaller;

impl HookInstaller for FontInstaller {
    fn name(&self) -> &str {
        "fonts"
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        if !env.config().enable_font_protection {
            return Ok(PatchSet::new());
        }
        let mut patcher = Patcher::new(env, realm, "fonts");

        patcher.patch_method(CONTEXT_2D, "measureText", |original| {
            let env = Rc::clone(env);
            native(move |this, args| {
                env.record(StatCategory::Font);
                env.timing().guard(|| {
                    let metrics = original(this, args)?;
                    Ok(noise_metrics(&env, &metrics))
                })
            })
        });

        patcher.patch_method(FONT_FACE_SET, "check", |original| {
            let env = Rc::clone(env);
            native(move |this, args| {
                env.record(StatCategory::Font);
                env.timing().guard(|| {
                    let result = original(this, args)?;
                    if env.draw() < CHECK_FLIP_RATE {
                        return Ok(Value::Bool(!result.truthy()));
                    }
                    Ok(result)
                })
            })
        });

        // Iteration order is shuffled once and then fixed
        patcher.patch_method(FONT_FACE_SET, "values", |original| {
            let mut fonts = match original(&Value::Undefined, &[]) {
                Ok(Value::List(fonts)) => fonts,
                _ => Vec::new(),
            };
            env.prng().shuffle(&mut fonts);
            let env = Rc::clone(env);
            native(move |_, _| {
                env.record(StatCategory::Font);
                Ok(Value::List(fonts.clone()))
            })
        });

        Ok(patcher.finish())
    }
}
