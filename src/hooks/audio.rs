//! Audio buffer noise.

use std::rc::Rc;

use super::host::{native, PatchSet, Realm, Value};
use super::patcher::Patcher;
use crate::engine::{Environment, HookInstaller};
use crate::error::Result;
use crate::stats::StatCategory;

pub const AUDIO_BUFFER: &str = "AudioBuffer.prototype";

/// Add `noise(audioNoiseStrength)` to every sample, storing back as f32.
pub fn noise_samples(env: &Environment, samples: &mut [f32]) {
    let strength = env.config().audio_noise_strength;
    for sample in samples.iter_mut() {
        *sample = (f64::from(*sample) + env.noise().noise(strength)) as f32;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AudioInstaller;

impl HookInstaller for AudioInstaller {
    fn name(&self) -> &str {
        "audio"
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        if !env.config().enable_audio_noise {
            return Ok(PatchSet::new());
        }
        let mut patcher = Patcher::new(env, realm, "audio");

        patcher.patch_method(AUDIO_BUFFER, "getChannelData", |original| {
            let env = Rc::clone(env);
            native(move |this, args| {
                env.timing().guard(|| {
                    env.record(StatCategory::Audio);
                    let mut data = original(this, args)?;
                    if let Value::Floats(samples) = &mut data {
                        noise_samples(&env, samples);
                    }
                    Ok(data)
                })
            })
        });

        Ok(patcher.finish())
    }
}
