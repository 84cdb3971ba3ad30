//! Protected API surfaces.
//!
//! Each surface is an independent [`HookInstaller`] that only talks to the
//! shared [`Environment`](crate::engine::Environment) and a [`Realm`]. They
//! never depend on each other; the one exception is that media devices
//! report under the WebRTC counter.
//!
//! | installer      | config gate                      |
//! |----------------|----------------------------------|
//! | canvas         | `enableCanvasNoise`              |
//! | webgl          | `enableWebGLMasking`             |
//! | audio          | `enableAudioNoise`               |
//! | navigator      | `enableNavigatorFuzz`            |
//! | webrtc         | `enableWebRTCProtection`         |
//! | mediaDevices   | `enableMediaDeviceProtection`    |
//! | screen         | `enableScreenProtection`         |
//! | fonts          | `enableFontProtection`           |
//! | timezone       | `enableTimezoneProtection`       |
//! | sensors        | `enableSensorProtection`         |

pub mod audio;
pub mod canvas;
pub mod fonts;
pub mod host;
pub mod media_devices;
pub mod navigator;
pub mod patcher;
pub mod screen;
pub mod sensors;
pub mod timezone;
pub mod webgl;
pub mod webrtc;

pub use audio::AudioInstaller;
pub use canvas::CanvasInstaller;
pub use fonts::FontInstaller;
pub use host::{native, Captured, NativeFn, PatchHandle, PatchSet, Property, Realm, Slot, Value};
pub use media_devices::MediaDevicesInstaller;
pub use navigator::NavigatorInstaller;
pub use patcher::Patcher;
pub use screen::ScreenInstaller;
pub use sensors::SensorInstaller;
pub use timezone::TimezoneInstaller;
pub use webgl::WebGlInstaller;
pub use webrtc::WebRtcInstaller;

use crate::engine::InstallerRegistry;

/// Registry holding every built-in installer in draw order.
///
/// All installers share one generator, so this order is part of the
/// output: moving an entry changes every value drawn after it.
pub fn default_registry() -> InstallerRegistry {
    let mut registry = InstallerRegistry::new();
    registry
        .register(CanvasInstaller)
        .register(WebGlInstaller)
        .register(AudioInstaller)
        .register(NavigatorInstaller)
        .register(WebRtcInstaller)
        .register(MediaDevicesInstaller)
        .register(ScreenInstaller)
        .register(FontInstaller)
        .register(TimezoneInstaller)
        .register(SensorInstaller);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        assert_eq!(
            default_registry().names(),
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
}
