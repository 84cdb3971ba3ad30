//! Full bootstrap against a realm shaped like a desktop browser.

use std::rc::Rc;
use std::time::Duration;

use fp_shuffler::hooks::canvas::{CANVAS_ELEMENT, CONTEXT_2D};
use fp_shuffler::hooks::webgl::WEBGL_PROTOTYPES;
use fp_shuffler::hooks::Realm;
use fp_shuffler::stats::MemoryReporter;
use fp_shuffler::{
    EnvironmentBuilder, FingerprintConfig, SiteSettingsStore, Shuffler, StatCategory,
    StaticSaltSource, StatsTracker, Value,
};
use futures::executor::block_on;

const SALT: &str = "0123456789abcdef0123456789abcdef";
const ORIGIN: &str = "https://shop.example";

fn browser() -> Realm {
    let realm = Realm::new();
    realm
        .set_method(CONTEXT_2D, "getImageData", |_, _| {
            Ok(Value::record([("data", Value::Bytes(vec![120; 64]))]))
        })
        .set_method(CONTEXT_2D, "measureText", |_, _| {
            Ok(Value::record([("width", Value::from(42.0))]))
        })
        .set_method(CANVAS_ELEMENT, "toDataURL", |this, _| {
            Ok(Value::from(format!("data:{:?}", this.get("pixels"))))
        })
        .set_method(CANVAS_ELEMENT, "toBlob", |_, _| Ok(Value::Null))
        .set_method("AudioBuffer.prototype", "getChannelData", |_, _| {
            Ok(Value::Floats(vec![0.25; 32]))
        })
        .set_value("navigator", "hardwareConcurrency", 8u32)
        .set_value("navigator", "deviceMemory", 8u32)
        .set_value(
            "navigator",
            "languages",
            Value::List(vec!["en-GB".into(), "en".into(), "fr".into()]),
        )
        .set_method("navigator", "getBattery", |_, _| {
            Ok(Value::record([("charging", Value::from(false))]))
        })
        .set_method("navigator", "getGamepads", |_, _| Ok(Value::List(vec![])))
        .set_method("navigator.mediaDevices", "enumerateDevices", |_, _| {
            Ok(Value::List(vec![Value::record([
                ("deviceId", Value::from("abcdef")),
                ("kind", Value::from("videoinput")),
                ("label", Value::from("Logitech C920")),
                ("groupId", Value::from("g")),
            ])]))
        })
        .set_method("navigator.mediaDevices", "getUserMedia", |_, _| Ok(Value::Null))
        .set_value("screen", "width", 2560u32)
        .set_value("screen", "height", 1440u32)
        .set_value("screen", "colorDepth", 24u32)
        .set_value("window", "devicePixelRatio", 1u32)
        .set_value("window", "innerWidth", 2560u32)
        .set_value("window", "innerHeight", 1300u32)
        .set_method("document.fonts", "check", |_, _| Ok(Value::Bool(true)))
        .set_method("document.fonts", "values", |_, _| {
            Ok(Value::List(vec!["Arial".into(), "Georgia".into(), "Verdana".into()]))
        })
        .set_method("Date.prototype", "getTimezoneOffset", |_, _| Ok(Value::from(-60.0)))
        .set_method("Intl.DateTimeFormat.prototype", "resolvedOptions", |_, _| {
            Ok(Value::record([("timeZone", Value::from("Europe/Berlin"))]))
        })
        .set_method("performance", "now", |_, _| Ok(Value::from(10.0)));
    for proto in WEBGL_PROTOTYPES {
        realm
            .set_method(proto, "getParameter", |_, args| {
                Ok(match args.first().and_then(Value::as_f64) {
                    Some(p) if p == f64::from(0x1F00u32) => Value::from("Intel Inc."),
                    _ => Value::from(16384.0),
                })
            })
            .set_method(proto, "getSupportedExtensions", |_, _| {
                Ok(Value::List(vec![
                    "ANGLE_instanced_arrays".into(),
                    "EXT_blend_minmax".into(),
                    "OES_texture_float".into(),
                    "WEBGL_debug_renderer_info".into(),
                ]))
            });
    }
    realm
}

fn shuffler() -> Shuffler<StaticSaltSource> {
    Shuffler::new(StaticSaltSource::new(SALT), FingerprintConfig::default())
}

fn pixels(realm: &Realm) -> Value {
    realm
        .call(CONTEXT_2D, "getImageData", &Value::Undefined, &[])
        .unwrap()
        .get("data")
        .clone()
}

#[test]
fn test_every_surface_installs() {
    let realm = browser();
    let session = block_on(shuffler().run(Some(ORIGIN), &realm)).unwrap();
    let report = session.report();
    assert!(report.is_clean(), "{:?}", report.failed);
    assert_eq!(
        report.applied,
        vec![
            "canvas",
            "webgl",
            "audio",
            "navigator",
            "webrtc",
            "mediaDevices",
            "screen",
            "fonts",
            "timezone",
            "sensors"
        ]
    );
}

#[test]
fn test_same_identity_same_device() {
    let a = browser();
    let b = browser();
    block_on(shuffler().run(Some(ORIGIN), &a)).unwrap();
    block_on(shuffler().run(Some(ORIGIN), &b)).unwrap();

    assert_eq!(pixels(&a), pixels(&b));
    assert_eq!(a.get("screen", "width").unwrap(), b.get("screen", "width").unwrap());
    assert_eq!(
        a.get("navigator", "languages").unwrap(),
        b.get("navigator", "languages").unwrap()
    );
    assert_ne!(pixels(&a), Value::Bytes(vec![120; 64]));
}

#[test]
fn test_other_origin_other_device() {
    let a = browser();
    let b = browser();
    block_on(shuffler().run(Some(ORIGIN), &a)).unwrap();
    block_on(shuffler().run(Some("https://news.example"), &b)).unwrap();
    assert_ne!(pixels(&a), pixels(&b));
}

#[test]
fn test_whitelisted_origin_is_untouched() {
    let realm = browser();
    let mut sites = SiteSettingsStore::new();
    sites.disable("shop.example", "Disabled by user");
    assert!(block_on(shuffler().site_settings(sites).run(Some(ORIGIN), &realm)).is_none());

    assert_eq!(pixels(&realm), Value::Bytes(vec![120; 64]));
    assert_eq!(realm.get("screen", "width").unwrap(), Value::from(2560u32));
}

#[test]
fn test_site_override_disables_one_surface() {
    let realm = browser();
    let mut sites = SiteSettingsStore::new();
    let mut overrides = serde_json::Map::new();
    overrides.insert("enableCanvasNoise".into(), serde_json::json!(false));
    sites.set(
        "shop.example",
        fp_shuffler::SiteSettings {
            overrides,
            ..Default::default()
        },
    );
    let session = block_on(shuffler().site_settings(sites).run(Some(ORIGIN), &realm)).unwrap();
    assert!(session.report().skipped.contains(&"canvas".to_string()));
    assert_eq!(pixels(&realm), Value::Bytes(vec![120; 64]));
}

#[test]
fn test_page_world_shares_the_stream() {
    let shuffler = shuffler();
    let isolated = block_on(shuffler.prepare(Some(ORIGIN))).unwrap();
    let handshake = block_on(shuffler.handshake(Some(ORIGIN))).unwrap();
    assert!(handshake.is_valid());

    // Through JSON, as it would travel between worlds
    let wire = serde_json::to_string(&handshake).unwrap();
    assert!(wire.contains("\"type\":\"FP_INIT_PAGE_HOOKS\""));
    let page = EnvironmentBuilder::from_handshake(&serde_json::from_str(&wire).unwrap());

    assert_eq!(page.seed(), isolated.seed());
    for _ in 0..1_000 {
        assert_eq!(page.draw().to_bits(), isolated.draw().to_bits());
    }
}

#[test]
fn test_reads_are_counted() {
    let realm = browser();
    let tracker = Rc::new(StatsTracker::with_interval(
        MemoryReporter::new(),
        Duration::from_secs(3600),
    ));
    let session = block_on(
        shuffler()
            .stats_sink(tracker.clone())
            .run(Some(ORIGIN), &realm),
    )
    .unwrap();

    pixels(&realm);
    pixels(&realm);
    realm.get("screen", "width").unwrap();
    realm
        .call("document.fonts", "check", &Value::Undefined, &[Value::from("12px Arial")])
        .unwrap();

    let pending = tracker.pending();
    assert_eq!(pending.get(StatCategory::Canvas), 2);
    assert_eq!(pending.get(StatCategory::Screen), 1);
    assert_eq!(pending.get(StatCategory::Font), 1);

    tracker.flush();
    assert!(tracker.pending().is_empty());
    let messages = tracker.reporter().messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].data.total(), 4);

    session.teardown(&realm);
    assert_eq!(pixels(&realm), Value::Bytes(vec![120; 64]));
}
