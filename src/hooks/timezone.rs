//! Timezone name spoofing.
//!
//! The reported zone is swapped for another one with the same UTC offset.
//! `getTimezoneOffset` is left untouched so wall-clock times stay correct.

use std::rc::Rc;

use super::host::{native, PatchSet, Realm, Value};
use super::patcher::Patcher;
use crate::engine::{Environment, HookInstaller};
use crate::error::Result;
use crate::stats::StatCategory;

pub const DATE_PROTOTYPE: &str = "Date.prototype";
pub const DATE_TIME_FORMAT: &str = "Intl.DateTimeFormat.prototype";

/// `Date.prototype` methods whose options get the spoofed zone.
pub const LOCALE_METHODS: [&str; 3] = ["toLocaleString", "toLocaleDateString", "toLocaleTimeString"];

/// IANA zones grouped by offset east of UTC, in minutes.
pub const TIMEZONES_BY_OFFSET: &[(i32, &[&str])] = &[
    (-720, &["Pacific/Wake", "Pacific/Wallis"]),
    (-660, &["Pacific/Midway", "Pacific/Niue", "Pacific/Pago_Pago"]),
    (-600, &["Pacific/Honolulu", "Pacific/Rarotonga", "Pacific/Tahiti"]),
    (-570, &["Pacific/Marquesas"]),
    (
        -540,
        &["America/Anchorage", "America/Juneau", "America/Nome", "America/Sitka", "America/Yakutat"],
    ),
    (
        -480,
        &[
            "America/Los_Angeles",
            "America/Vancouver",
            "America/Tijuana",
            "America/Dawson",
            "America/Whitehorse",
        ],
    ),
    (
        -420,
        &[
            "America/Denver",
            "America/Phoenix",
            "America/Edmonton",
            "America/Hermosillo",
            "America/Chihuahua",
            "America/Mazatlan",
        ],
    ),
    (
        -360,
        &[
            "America/Chicago",
            "America/Mexico_City",
            "America/Regina",
            "America/Winnipeg",
            "America/Guatemala",
            "America/Belize",
        ],
    ),
    (
        -300,
        &[
            "America/New_York",
            "America/Toronto",
            "America/Havana",
            "America/Panama",
            "America/Lima",
            "America/Bogota",
        ],
    ),
    (
        -240,
        &["America/Caracas", "America/Halifax", "America/Santiago", "America/La_Paz", "America/Manaus"],
    ),
    (-210, &["America/St_Johns"]),
    (
        -180,
        &[
            "America/Sao_Paulo",
            "America/Argentina/Buenos_Aires",
            "America/Montevideo",
            "America/Godthab",
        ],
    ),
    (-120, &["Atlantic/South_Georgia"]),
    (-60, &["Atlantic/Azores", "Atlantic/Cape_Verde"]),
    (
        0,
        &[
            "Europe/London",
            "Europe/Dublin",
            "Europe/Lisbon",
            "Africa/Casablanca",
            "Atlantic/Reykjavik",
            "UTC",
        ],
    ),
    (
        60,
        &[
            "Europe/Paris",
            "Europe/Berlin",
            "Europe/Rome",
            "Europe/Madrid",
            "Europe/Brussels",
            "Europe/Amsterdam",
            "Europe/Stockholm",
            "Africa/Lagos",
        ],
    ),
    (
        120,
        &[
            "Europe/Athens",
            "Europe/Helsinki",
            "Europe/Kiev",
            "Africa/Cairo",
            "Asia/Jerusalem",
            "Europe/Bucharest",
            "Africa/Johannesburg",
        ],
    ),
    (
        180,
        &["Europe/Moscow", "Asia/Baghdad", "Asia/Riyadh", "Africa/Nairobi", "Asia/Kuwait"],
    ),
    (210, &["Asia/Tehran"]),
    (240, &["Asia/Dubai", "Asia/Baku", "Asia/Tbilisi", "Asia/Muscat"]),
    (270, &["Asia/Kabul"]),
    (300, &["Asia/Karachi", "Asia/Tashkent", "Asia/Yekaterinburg"]),
    (330, &["Asia/Kolkata", "Asia/Colombo"]),
    (345, &["Asia/Kathmandu"]),
    (360, &["Asia/Dhaka", "Asia/Almaty", "Asia/Omsk"]),
    (390, &["Asia/Yangon"]),
    (420, &["Asia/Bangkok", "Asia/Jakarta", "Asia/Ho_Chi_Minh"]),
    (
        480,
        &[
            "Asia/Shanghai",
            "Asia/Hong_Kong",
            "Asia/Singapore",
            "Asia/Taipei",
            "Asia/Manila",
            "Australia/Perth",
        ],
    ),
    (540, &["Asia/Tokyo", "Asia/Seoul", "Asia/Pyongyang"]),
    (570, &["Australia/Adelaide", "Australia/Darwin"]),
    (
        600,
        &["Australia/Sydney", "Australia/Melbourne", "Australia/Brisbane", "Pacific/Guam"],
    ),
    (630, &["Australia/Lord_Howe"]),
    (660, &["Pacific/Noumea", "Pacific/Guadalcanal"]),
    (720, &["Pacific/Auckland", "Pacific/Fiji"]),
    (780, &["Pacific/Tongatapu", "Pacific/Apia"]),
];

/// Zones sharing a `Date.getTimezoneOffset()` value.
///
/// That value counts minutes *behind* UTC, so it is negated before the
/// lookup.
pub fn zones_for_offset(timezone_offset: i32) -> &'static [&'static str] {
    let east = -timezone_offset;
    TIMEZONES_BY_OFFSET
        .iter()
        .find(|(offset, _)| *offset == east)
        .map(|(_, zones)| *zones)
        .unwrap_or(&[])
}

/// Copy of `options` (or an empty record) with `timeZone` forced.
fn with_zone(options: Option<&Value>, zone: &str) -> Value {
    let mut options = match options {
        Some(record @ Value::Record(_)) => record.clone(),
        _ => Value::Record(Default::default()),
    };
    options.set("timeZone", zone);
    options
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TimezoneInstaller;

impl HookInstaller for TimezoneInstaller {
    fn name(&self) -> &str {
        "timezone"
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        if !env.config().enable_timezone_protection || !realm.has_object(DATE_PROTOTYPE) {
            return Ok(PatchSet::new());
        }

        let offset = realm
            .call(DATE_PROTOTYPE, "getTimezoneOffset", &Value::Undefined, &[])?
            .as_f64()
            .unwrap_or(0.0) as i32;
        let zones = zones_for_offset(offset);
        if zones.is_empty() {
            if env.is_debug() {
                log::debug!("🕐 No alternative zones for offset {}", offset);
            }
            return Ok(PatchSet::new());
        }
        let zone: &'static str = zones[env.prng().index(zones.len())];
        if env.is_debug() {
            log::debug!("🕐 Offset {} -> {}", offset, zone);
        }

        let mut patcher = Patcher::new(env, realm, "timezone");

        patcher.patch_method(DATE_TIME_FORMAT, "resolvedOptions", |original| {
            let env = Rc::clone(env);
            native(move |this, args| {
                env.timing().random_delay_sync();
                env.record(StatCategory::Timezone);
                let mut options = original(this, args)?;
                if let Value::Record(_) = options {
                    options.set("timeZone", zone);
                }
                Ok(options)
            })
        });

        for method in LOCALE_METHODS {
            patcher.patch_method(DATE_PROTOTYPE, method, |original| {
                let env = Rc::clone(env);
                native(move |this, args| {
                    env.timing().random_delay_sync();
                    env.record(StatCategory::Timezone);
                    let locales = args.first().cloned().unwrap_or_default();
                    let options = with_zone(args.get(1), zone);
                    original(this, &[locales, options])
                })
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

    fn realm(offset: f64) -> Realm {
        let realm = Realm::new();
        realm
            .set_method(DATE_PROTOTYPE, "getTimezoneOffset", move |_, _| Ok(Value::Number(offset)))
            .set_method(DATE_TIME_FORMAT, "resolvedOptions", |_, _| {
                Ok(Value::record([
                    ("locale", Value::from("en-US")),
                    ("timeZone", Value::from("Europe/Berlin")),
                ]))
            });
        for method in LOCALE_METHODS {
            // Echo the options back so the test can inspect them
            realm.set_method(DATE_PROTOTYPE, method, |_, args| {
                Ok(args.get(1).cloned().unwrap_or_default())
            });
        }
        realm
    }

    fn env(seed: u32) -> Rc<Environment> {
        Rc::new(EnvironmentBuilder::new(FingerprintConfig::default()).build_with_seed(seed))
    }

    #[test]
    fn test_offset_sign() {
        // Berlin in winter reports -60
        assert!(zones_for_offset(-60).contains(&"Europe/Berlin"));
        assert!(zones_for_offset(300).contains(&"America/New_York"));
        assert!(zones_for_offset(0).contains(&"UTC"));
        assert!(zones_for_offset(17).is_empty());
    }

    #[test]
    fn test_resolved_zone_shares_offset() {
        for seed in 0..20 {
            let realm = realm(-60.0);
            TimezoneInstaller.install(&env(seed), &realm).unwrap();
            let options = realm
                .call(DATE_TIME_FORMAT, "resolvedOptions", &Value::Undefined, &[])
                .unwrap();
            let zone = options.get("timeZone").as_str().unwrap();
            assert!(zones_for_offset(-60).contains(&zone));
            assert_eq!(options.get("locale"), &Value::from("en-US"));
        }
    }

    #[test]
    fn test_locale_methods_force_zone() {
        let realm = realm(-60.0);
        TimezoneInstaller.install(&env(3), &realm).unwrap();
        let zone = realm
            .call(DATE_TIME_FORMAT, "resolvedOptions", &Value::Undefined, &[])
            .unwrap()
            .get("timeZone")
            .clone();

        let bare = realm
            .call(DATE_PROTOTYPE, "toLocaleString", &Value::Undefined, &[])
            .unwrap();
        assert_eq!(bare.get("timeZone"), &zone);

        let given = Value::record([
            ("hour12", Value::from(false)),
            ("timeZone", Value::from("Asia/Tokyo")),
        ]);
        let out = realm
            .call(
                DATE_PROTOTYPE,
                "toLocaleTimeString",
                &Value::Undefined,
                &[Value::from("de-DE"), given],
            )
            .unwrap();
        assert_eq!(out.get("timeZone"), &zone);
        assert_eq!(out.get("hour12"), &Value::from(false));
    }

    #[test]
    fn test_unknown_offset_installs_nothing() {
        let realm = realm(-17.0);
        let set = TimezoneInstaller.install(&env(3), &realm).unwrap();
        assert!(set.is_empty());
    }
}
