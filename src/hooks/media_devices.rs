//! Media device id and label masking.

use std::rc::Rc;

use super::host::{native, PatchSet, Realm, Value};
use super::patcher::Patcher;
use super::webrtc::MEDIA_DEVICES;
use crate::engine::{Environment, HookInstaller};
use crate::error::Result;
use crate::stats::StatCategory;

/// Stable per-identity device id hash: `h = (h << 5) - h + c` over UTF-16
/// units in 32-bit arithmetic, seeded with `seed + index`; the absolute
/// value in lowercase hex.
pub fn hash_device_id(device_id: &str, seed: u32, index: usize) -> String {
    let start = seed.wrapping_add(index as u32) as i32;
    let hash = device_id.encode_utf16().fold(start, |h, c| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(c))
    });
    format!("{:x}", i64::from(hash).abs())
}

/// Generic labels for a device kind.
pub fn generic_labels(kind: &str) -> &'static [&'static str] {
    match kind {
        "audioinput" => &["Microphone", "Default Microphone", "Internal Microphone"],
        "audiooutput" => &["Speaker", "Default Speaker", "Internal Speaker"],
        "videoinput" => &["Camera", "Default Camera", "Built-in Camera"],
        _ => &["Device"],
    }
}

fn non_empty(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

/// Mask one `MediaDeviceInfo` record.
fn mask_device(env: &Environment, device: &Value, index: usize) -> Value {
    let options = &env.config().media_devices;
    let mut masked = Value::record([
        ("deviceId", device.get("deviceId").clone()),
        ("kind", device.get("kind").clone()),
        ("label", device.get("label").clone()),
        ("groupId", device.get("groupId").clone()),
    ]);

    if options.randomize_device_ids {
        if let Some(id) = non_empty(device.get("deviceId")) {
            masked.set("deviceId", format!("fp-{}", hash_device_id(id, env.seed(), index)));
            if let Some(group) = non_empty(device.get("groupId")) {
                masked.set(
                    "groupId",
                    format!("fp-group-{}", hash_device_id(group, env.seed(), index)),
                );
            }
        }
    }

    if options.spoof_device_labels && non_empty(device.get("label")).is_some() {
        let labels = generic_labels(device.get("kind").as_str().unwrap_or_default());
        masked.set("label", labels[env.prng().index(labels.len())]);
    }

    masked
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MediaDevicesInstaller;

impl HookInstaller for MediaDevicesInstaller {
    fn name(&self) -> &str {
        "mediaDevices"
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        if !env.config().enable_media_device_protection {
            return Ok(PatchSet::new());
        }
        let mut patcher = Patcher::new(env, realm, "mediaDevices");

        patcher.patch_method(MEDIA_DEVICES, "enumerateDevices", |original| {
            let env = Rc::clone(env);
            native(move |this, args| {
                env.timing().random_delay_sync();
                env.record(StatCategory::Webrtc);
                let devices = original(this, args)?;
                let options = &env.config().media_devices;
                if !options.randomize_device_ids && !options.spoof_device_labels {
                    return Ok(devices);
                }
                match devices {
                    Value::List(list) => Ok(Value::List(
                        list.iter()
                            .enumerate()
                            .map(|(index, device)| mask_device(&env, device, index))
                            .collect(),
                    )),
                    other => Ok(other),
                }
            })
        });

        Ok(patcher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FingerprintConfig;
    use crate::engine::EnvironmentBuilder;

    fn device(id: &str, kind: &str, label: &str, group: &str) -> Value {
        Value::record([
            ("deviceId", Value::from(id)),
            ("kind", Value::from(kind)),
            ("label", Value::from(label)),
            ("groupId", Value::from(group)),
        ])
    }

    fn realm() -> Realm {
        let realm = Realm::new();
        realm.set_method(MEDIA_DEVICES, "enumerateDevices", |_, _| {
            Ok(Value::List(vec![
                device("a1b2", "audioinput", "Blue Yeti (046d:0a44)", "g1"),
                device("c3d4", "videoinput", "FaceTime HD Camera", "g2"),
                device("", "audiooutput", "", ""),
            ]))
        });
        realm
    }

    #[test]
    fn test_hash_device_id() {
        // h = 0 -> ((0 << 5) - 0 + 97) = 97
        assert_eq!(hash_device_id("a", 0, 0), "61");
        // index is added to the seed
        assert_eq!(hash_device_id("a", 0, 1), hash_device_id("a", 1, 0));
        // i32::MIN magnitude does not overflow
        let wrapped = hash_device_id("", i32::MIN as u32, 0);
        assert_eq!(wrapped, "80000000");
    }

    #[test]
    fn test_devices_masked() {
        let env = Rc::new(EnvironmentBuilder::new(FingerprintConfig::default()).build_with_seed(77));
        let realm = realm();
        MediaDevicesInstaller.install(&env, &realm).unwrap();

        let out = realm
            .call(MEDIA_DEVICES, "enumerateDevices", &Value::Undefined, &[])
            .unwrap();
        let devices = out.as_list().unwrap();

        let mic_id = devices[0].get("deviceId").as_str().unwrap();
        assert_eq!(mic_id, format!("fp-{}", hash_device_id("a1b2", 77, 0)));
        assert!(devices[0].get("groupId").as_str().unwrap().starts_with("fp-group-"));
        assert!(generic_labels("audioinput").contains(&devices[0].get("label").as_str().unwrap()));
        assert!(generic_labels("videoinput").contains(&devices[1].get("label").as_str().unwrap()));

        // Empty ids and labels are left empty
        assert_eq!(devices[2].get("deviceId"), &Value::from(""));
        assert_eq!(devices[2].get("label"), &Value::from(""));
    }

    #[test]
    fn test_both_options_off_passes_through() {
        let mut config = FingerprintConfig::default();
        config.media_devices.randomize_device_ids = false;
        config.media_devices.spoof_device_labels = false;
        let env = Rc::new(EnvironmentBuilder::new(config).build_with_seed(77));
        let realm = realm();
        MediaDevicesInstaller.install(&env, &realm).unwrap();
        let out = realm
            .call(MEDIA_DEVICES, "enumerateDevices", &Value::Undefined, &[])
            .unwrap();
        assert_eq!(out.as_list().unwrap()[0].get("deviceId"), &Value::from("a1b2"));
    }
}
