//! Canvas readback noise.
//!
//! Pixel reads and serialisations see every R, G and B channel shifted by
//! `noise(canvasNoiseStrength)`. Alpha is untouched. Channels round and
//! clamp the way a `Uint8ClampedArray` store does.

use std::rc::Rc;

use super::host::{native, NativeFn, PatchSet, Realm, Value};
use super::patcher::Patcher;
use crate::engine::{Environment, HookInstaller};
use crate::error::Result;
use crate::stats::StatCategory;

pub const CONTEXT_2D: &str = "CanvasRenderingContext2D.prototype";
pub const CANVAS_ELEMENT: &str = "HTMLCanvasElement.prototype";

/// Round half to even and clamp to a byte; NaN stores as 0.
pub fn clamp_channel(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round_ties_even().clamp(0.0, 255.0) as u8
}

/// Add noise to the colour channels of RGBA `data` in place.
///
/// Three draws are taken per pixel even when a trailing pixel is short.
pub fn noise_pixels(env: &Environment, data: &mut [u8]) {
    let strength = env.config().canvas_noise_strength;
    for pixel in data.chunks_mut(4) {
        for channel in 0..3 {
            let delta = env.noise().noise(strength);
            if let Some(byte) = pixel.get_mut(channel) {
                *byte = clamp_channel(f64::from(*byte) + delta);
            }
        }
    }
}

/// `getImageData` result with noised `data`.
fn noised_image(env: &Environment, mut image: Value) -> Value {
    if let Some(Value::Bytes(data)) = image.field_mut("data") {
        noise_pixels(env, data);
    }
    image
}

/// Copy of the canvas receiver with noised `pixels`.
fn noised_canvas(env: &Environment, canvas: &Value) -> Value {
    let mut canvas = canvas.clone();
    if let Some(Value::Bytes(pixels)) = canvas.field_mut("pixels") {
        noise_pixels(env, pixels);
    }
    canvas
}

fn serializer(env: &Rc<Environment>, original: NativeFn) -> NativeFn {
    let env = Rc::clone(env);
    native(move |this, args| {
        env.timing().guard(|| {
            env.record(StatCategory::Canvas);
            let canvas = noised_canvas(&env, this);
            original(&canvas, args)
        })
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CanvasInstaller;

impl HookInstaller for CanvasInstaller {
    fn name(&self) -> &str {
        "canvas"
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        if !env.config().enable_canvas_noise {
            return Ok(PatchSet::new());
        }
        let mut patcher = Patcher::new(env, realm, "canvas");

        patcher.patch_method(CONTEXT_2D, "getImageData", |original| {
            let env = Rc::clone(env);
            native(move |this, args| {
                env.timing().guard(|| {
                    env.record(StatCategory::Canvas);
                    let image = original(this, args)?;
                    Ok(noised_image(&env, image))
                })
            })
        });
        patcher.patch_method(CANVAS_ELEMENT, "toDataURL", |original| serializer(env, original));
        patcher.patch_method(CANVAS_ELEMENT, "toBlob", |original| serializer(env, original));

        Ok(patcher.finish())
    }
}
