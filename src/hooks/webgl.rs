//! WebGL parameter masking.

use std::cell::RefCell;
use std::rc::Rc;

use super::host::{native, NativeFn, PatchSet, Realm, Value};
use super::patcher::Patcher;
use crate::engine::{Environment, HookInstaller};
use crate::error::Result;
use crate::stats::StatCategory;

pub const WEBGL_PROTOTYPES: [&str; 2] = [
    "WebGLRenderingContext.prototype",
    "WebGL2RenderingContext.prototype",
];

pub const VENDOR: u32 = 0x1F00;
pub const RENDERER: u32 = 0x1F01;
pub const UNMASKED_VENDOR_WEBGL: u32 = 0x9245;
pub const UNMASKED_RENDERER_WEBGL: u32 = 0x9246;

fn is_vendor_param(param: &Value) -> bool {
    param.as_f64().is_some_and(|p| {
        [VENDOR, RENDERER, UNMASKED_VENDOR_WEBGL, UNMASKED_RENDERER_WEBGL]
            .iter()
            .any(|v| f64::from(*v) == p)
    })
}

/// `"<value> (fp-N)"`, `N = floor(draw * 0xFFFF)`, never 0.
pub fn mask_vendor_string(env: &Environment, value: &str) -> String {
    let suffix = match (env.draw() * f64::from(0xFFFFu32)) as u32 {
        0 => 1,
        n => n,
    };
    format!("{} (fp-{})", value, suffix)
}

fn get_parameter(env: &Rc<Environment>, original: NativeFn) -> NativeFn {
    let env = Rc::clone(env);
    native(move |this, args| {
        env.timing().guard(|| {
            env.record(StatCategory::Webgl);
            let value = original(this, args)?;
            let config = env.config();
            Ok(match value {
                Value::Number(n) => Value::Number(n + config.webgl_jitter),
                Value::Str(s)
                    if config.mask_webgl_vendor_strings
                        && args.first().is_some_and(is_vendor_param) =>
                {
                    Value::Str(mask_vendor_string(&env, &s))
                }
                other => other,
            })
        })
    })
}

/// Extension list permuted once, on the first call that returns a list.
fn supported_extensions(env: &Rc<Environment>, original: NativeFn) -> NativeFn {
    let env = Rc::clone(env);
    let order: RefCell<Option<Vec<Value>>> = RefCell::new(None);
    native(move |this, args| {
        env.timing().guard(|| {
            env.record(StatCategory::Webgl);
            if let Some(cached) = order.borrow().as_ref() {
                return Ok(Value::List(cached.clone()));
            }
            match original(this, args)? {
                Value::List(mut list) => {
                    env.prng().shuffle(&mut list);
                    *order.borrow_mut() = Some(list.clone());
                    Ok(Value::List(list))
                }
                other => Ok(other),
            }
        })
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WebGlInstaller;

impl HookInstaller for WebGlInstaller {
    fn name(&self) -> &str {
        "webgl"
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        if !env.config().enable_webgl_masking {
            return Ok(PatchSet::new());
        }
        let mut patcher = Patcher::new(env, realm, "webgl");

        for proto in WEBGL_PROTOTYPES {
            if !realm.has_object(proto) {
                continue;
            }
            patcher.patch_method(proto, "getParameter", |original| get_parameter(env, original));
            if env.config().shuffle_webgl_extensions {
                patcher.patch_method(proto, "getSupportedExtensions", |original| {
                    supported_extensions(env, original)
                });
            }
        }

        Ok(patcher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FingerprintConfig;
    use crate::engine::EnvironmentBuilder;

    const GL: &str = "WebGLRenderingContext.prototype";

    fn realm() -> Realm {
        let realm = Realm::new();
        realm
            .set_method(GL, "getParameter", |_, args| {
                let p = args.first().and_then(Value::as_f64).unwrap_or(0.0) as u32;
                Ok(match p {
                    UNMASKED_VENDOR_WEBGL => Value::from("Intel Inc."),
                    0x0D33 => Value::from(16384u32),
                    _ => Value::from("WebGL 1.0"),
                })
            })
            .set_method(GL, "getSupportedExtensions", |_, _| {
                Ok(Value::List(
                    ["ANGLE_instanced_arrays", "EXT_blend_minmax", "OES_element_index_uint", "WEBGL_lose_context"]
                        .iter()
                        .map(|s| Value::from(*s))
                        .collect(),
                ))
            });
        realm
    }

    fn install(config: FingerprintConfig) -> (Rc<Environment>, Realm) {
        let env = Rc::new(EnvironmentBuilder::new(config).build_with_seed(42));
        let realm = realm();
        WebGlInstaller.install(&env, &realm).unwrap();
        (env, realm)
    }

    fn param(realm: &Realm, p: u32) -> Value {
        realm.call(GL, "getParameter", &Value::Undefined, &[Value::from(p)]).unwrap()
    }

    #[test]
    fn test_numbers_get_jitter() {
        let (_env, realm) = install(FingerprintConfig::default());
        assert_eq!(param(&realm, 0x0D33), Value::Number(16386.0));
    }

    #[test]
    fn test_vendor_strings_masked() {
        let (_env, realm) = install(FingerprintConfig::default());
        let vendor = param(&realm, UNMASKED_VENDOR_WEBGL);
        let vendor = vendor.as_str().unwrap();
        assert!(vendor.starts_with("Intel Inc. (fp-"), "{}", vendor);
        assert!(vendor.ends_with(')'));

        // Other strings pass through
        assert_eq!(param(&realm, 0x1F02), Value::from("WebGL 1.0"));
    }

    #[test]
    fn test_vendor_masking_can_be_disabled() {
        let config = FingerprintConfig {
            mask_webgl_vendor_strings: false,
            ..Default::default()
        };
        let (_env, realm) = install(config);
        assert_eq!(param(&realm, UNMASKED_VENDOR_WEBGL), Value::from("Intel Inc."));
    }

    #[test]
    fn test_extension_order_is_stable() {
        let (_env, realm) = install(FingerprintConfig::default());
        let first = realm
            .call(GL, "getSupportedExtensions", &Value::Undefined, &[])
            .unwrap();
        let second = realm
            .call(GL, "getSupportedExtensions", &Value::Undefined, &[])
            .unwrap();
        assert_eq!(first, second);
        let mut names: Vec<&str> = first.as_list().unwrap().iter().filter_map(Value::as_str).collect();
        names.sort_unstable();
        assert_eq!(names.len(), 4);
        assert_eq!(names[0], "ANGLE_instanced_arrays");
    }

    #[test]
    fn test_missing_webgl2_is_fine() {
        let (_env, realm) = install(FingerprintConfig::default());
        assert!(!realm.has_object("WebGL2RenderingContext.prototype"));
    }

    #[test]
    fn test_suffix_never_zero() {
        let env = EnvironmentBuilder::new(FingerprintConfig::default()).build_with_seed(9);
        for _ in 0..200 {
            let masked = mask_vendor_string(&env, "x");
            assert_ne!(masked, "x (fp-0)");
        }
    }
}
