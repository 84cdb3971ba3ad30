//! Screen geometry spoofing.
//!
//! One resolution is chosen per context, either from a weighted table of
//! common desktop resolutions or by nudging the real one, and every screen
//! and window dimension is derived from it so the values stay consistent
//! with each other.

use std::rc::Rc;

use super::host::{native, NativeFn, PatchSet, Realm, Value};
use super::patcher::Patcher;
use crate::engine::{Environment, HookInstaller};
use crate::error::Result;
use crate::stats::StatCategory;

pub const SCREEN: &str = "screen";
pub const WINDOW: &str = "window";

/// Typical taskbar height subtracted from the available height.
pub const TASKBAR_HEIGHT: u32 = 40;

const COLOR_DEPTHS: [u32; 5] = [24, 24, 24, 30, 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Desktop resolutions and their share of real-world traffic.
pub const COMMON_RESOLUTIONS: [(Resolution, f64); 9] = [
    (Resolution::new(1920, 1080), 0.35),
    (Resolution::new(1366, 768), 0.15),
    (Resolution::new(2560, 1440), 0.12),
    (Resolution::new(1536, 864), 0.10),
    (Resolution::new(1440, 900), 0.08),
    (Resolution::new(1600, 900), 0.07),
    (Resolution::new(3840, 2160), 0.05),
    (Resolution::new(2880, 1800), 0.04),
    (Resolution::new(1280, 720), 0.04),
];

/// Walk the cumulative weights with one draw.
pub fn sample_resolution(draw: f64) -> Resolution {
    let mut cumulative = 0.0;
    for (resolution, weight) in COMMON_RESOLUTIONS {
        cumulative += weight;
        if draw < cumulative {
            return resolution;
        }
    }
    COMMON_RESOLUTIONS[0].0
}

/// Real resolution moved by up to +-50 px, floored at 800x600.
pub fn nudge_resolution(real: Resolution, width_draw: f64, height_draw: f64) -> Resolution {
    let shift = |base: u32, draw: f64, floor: f64| -> u32 {
        (f64::from(base) + ((draw - 0.5) * 100.0).floor()).max(floor) as u32
    };
    Resolution::new(
        shift(real.width, width_draw, 800.0),
        shift(real.height, height_draw, 600.0),
    )
}

/// Everything the page will be told about its display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenProfile {
    pub resolution: Resolution,
    pub pixel_ratio: f64,
    pub color_depth: u32,
}

impl ScreenProfile {
    /// Draw a profile. Takes one or two draws for the resolution and one
    /// for the colour depth.
    pub fn draw(env: &Environment, real: Resolution) -> Self {
        let resolution = if env.config().screen.use_real_distribution {
            sample_resolution(env.draw())
        } else {
            let width_draw = env.draw();
            nudge_resolution(real, width_draw, env.draw())
        };
        let pixel_ratio = if resolution.width >= 2560 { 2.0 } else { 1.0 };
        let color_depth = COLOR_DEPTHS[env.prng().index(COLOR_DEPTHS.len())];
        Self {
            resolution,
            pixel_ratio,
            color_depth,
        }
    }

    pub fn avail_height(&self) -> u32 {
        self.resolution.height.saturating_sub(TASKBAR_HEIGHT)
    }
}

fn read_u32(realm: &Realm, object: &str, name: &str) -> Option<u32> {
    realm
        .get(object, name)
        .ok()
        .and_then(|v| v.as_f64())
        .map(|n| n as u32)
}

fn spoofed(env: &Rc<Environment>, value: f64) -> NativeFn {
    let env = Rc::clone(env);
    native(move |_, _| {
        Ok(env.timing().guard(|| {
            env.record(StatCategory::Screen);
            Value::Number(value)
        }))
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScreenInstaller;

impl HookInstaller for ScreenInstaller {
    fn name(&self) -> &str {
        "screen"
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        if !env.config().enable_screen_protection || !realm.has_object(SCREEN) {
            return Ok(PatchSet::new());
        }

        let real = Resolution::new(
            read_u32(realm, SCREEN, "width").unwrap_or(1920),
            read_u32(realm, SCREEN, "height").unwrap_or(1080),
        );
        let profile = ScreenProfile::draw(env, real);
        if env.is_debug() {
            log::debug!(
                "🖥️  Screen {}x{} -> {}x{} @{}x, depth {}",
                real.width,
                real.height,
                profile.resolution.width,
                profile.resolution.height,
                profile.pixel_ratio,
                profile.color_depth
            );
        }

        let width = f64::from(profile.resolution.width);
        let height = f64::from(profile.resolution.height);
        let avail_height = f64::from(profile.avail_height());
        let depth = f64::from(profile.color_depth);

        let mut patcher = Patcher::new(env, realm, "screen");
        patcher.lock_getter(SCREEN, "width", |_| spoofed(env, width));
        patcher.lock_getter(SCREEN, "height", |_| spoofed(env, height));
        patcher.lock_getter(SCREEN, "availWidth", |_| spoofed(env, width));
        patcher.lock_getter(SCREEN, "availHeight", |_| spoofed(env, avail_height));
        patcher.lock_getter(SCREEN, "colorDepth", |_| spoofed(env, depth));
        patcher.lock_getter(SCREEN, "pixelDepth", |_| spoofed(env, depth));

        if realm.has_object(WINDOW) {
            patcher.lock_getter(WINDOW, "devicePixelRatio", |_| spoofed(env, profile.pixel_ratio));
            // Inner size never grows past the spoofed screen
            if let Some(inner) = read_u32(realm, WINDOW, "innerWidth") {
                patcher.lock_getter(WINDOW, "innerWidth", |_| {
                    spoofed(env, f64::from(inner.min(profile.resolution.width)))
                });
            }
            if let Some(inner) = read_u32(realm, WINDOW, "innerHeight") {
                patcher.lock_getter(WINDOW, "innerHeight", |_| {
                    spoofed(env, f64::from(inner.min(profile.avail_height())))
                });
            }
        }

        Ok(patcher.finish())
    }
}
