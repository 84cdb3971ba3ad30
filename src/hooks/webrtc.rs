//! WebRTC leak protection and SDP randomisation.
//!
//! Local descriptions lose their host and server-reflexive candidates, so
//! the real address never reaches the page. With `randomizeSDP` the DTLS
//! fingerprint bytes and ICE credentials are shifted deterministically.

use std::rc::Rc;

use super::host::{native, NativeFn, PatchSet, Realm, Value};
use super::patcher::Patcher;
use crate::config::WebRtcOptions;
use crate::engine::{Environment, HookInstaller, SharedPrng};
use crate::error::Result;
use crate::stats::StatCategory;

pub const WINDOW: &str = "window";
pub const PEER_CONNECTION: &str = "RTCPeerConnection.prototype";
pub const MEDIA_DEVICES: &str = "navigator.mediaDevices";

const CANDIDATE_PREFIX: &str = "a=candidate:";
const FINGERPRINT_PREFIX: &str = "a=fingerprint:";
const UFRAG_PREFIX: &str = "a=ice-ufrag:";
const PWD_PREFIX: &str = "a=ice-pwd:";

/// Whether an ICE candidate exposes a local or reflexive address.
pub fn is_leaky_candidate(candidate: &str) -> bool {
    candidate.contains("typ host") || candidate.contains("typ srflx")
}

/// Apply `f` to each line's content, keeping `\n` / `\r\n` terminators.
/// `None` keeps the line as is.
fn map_lines<F>(sdp: &str, mut f: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(sdp.len() + 16);
    for (i, line) in sdp.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let (content, cr) = match line.strip_suffix('\r') {
            Some(content) => (content, "\r"),
            None => (line, ""),
        };
        match f(content) {
            Some(rewritten) => out.push_str(&rewritten),
            None => out.push_str(content),
        }
        out.push_str(cr);
    }
    out
}

/// Split `a=fingerprint:<hash-func> <HEX:HEX:...>` into algorithm and
/// digest. Hash function names carry hyphens (`sha-256`).
fn parse_fingerprint(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix(FINGERPRINT_PREFIX)?;
    let alg_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    if alg_len == 0 {
        return None;
    }
    let (algorithm, tail) = rest.split_at(alg_len);
    let digest = tail.trim_start();
    if digest.len() == tail.len() || digest.is_empty() {
        return None;
    }
    let valid = digest
        .chars()
        .all(|c| c == ':' || c.is_ascii_digit() || ('A'..='F').contains(&c));
    valid.then_some((algorithm, digest))
}

/// Shift every digest byte by `floor(draw * 16)` mod 256.
///
/// A part that does not parse keeps its text; its draw is still taken.
fn shift_digest(digest: &str, prng: &SharedPrng) -> String {
    digest
        .split(':')
        .map(|part| {
            let offset = (prng.draw() * 16.0) as u64;
            match u64::from_str_radix(part, 16) {
                Ok(n) => format!("{:02X}", (n % 256 + offset) % 256),
                Err(_) => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

fn credential_suffix(prng: &SharedPrng) -> String {
    format!("{:x}", (prng.draw() * f64::from(0xFFFFu32)) as u32)
}

/// Rewrite a local SDP blob.
///
/// Passes run in a fixed order (candidates, fingerprints, ufrag, pwd) so
/// the draws they take line up across worlds.
pub fn rewrite_sdp(sdp: &str, options: &WebRtcOptions, prng: &SharedPrng) -> String {
    let mut sdp = sdp.to_string();

    if options.block_ip_leak {
        sdp = map_lines(&sdp, |line| {
            line.strip_prefix(CANDIDATE_PREFIX)
                .filter(|rest| is_leaky_candidate(rest))
                .map(|_| String::new())
        });
    }

    if options.randomize_sdp {
        sdp = map_lines(&sdp, |line| {
            let (algorithm, digest) = parse_fingerprint(line)?;
            Some(format!(
                "{}{} {}",
                FINGERPRINT_PREFIX,
                algorithm,
                shift_digest(digest, prng)
            ))
        });
        for prefix in [UFRAG_PREFIX, PWD_PREFIX] {
            sdp = map_lines(&sdp, |line| {
                let value = line.strip_prefix(prefix).filter(|v| !v.is_empty())?;
                Some(format!("{}{}{}", prefix, value, credential_suffix(prng)))
            });
        }
    }

    sdp
}

/// Copy of `options` with `iceTransportPolicy = "relay"`.
fn force_relay(options: &Value) -> Value {
    let mut options = options.clone();
    options.set("iceTransportPolicy", "relay");
    options
}

fn timed(env: &Rc<Environment>, original: NativeFn) -> NativeFn {
    let env = Rc::clone(env);
    native(move |this, args| {
        env.timing().random_delay_sync();
        env.record(StatCategory::Webrtc);
        original(this, args)
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcInstaller;

impl HookInstaller for WebRtcInstaller {
    fn name(&self) -> &str {
        "webrtc"
    }

    fn install(&self, env: &Rc<Environment>, realm: &Realm) -> Result<PatchSet> {
        if !env.config().enable_webrtc_protection {
            return Ok(PatchSet::new());
        }
        let options = env.config().webrtc.clone();
        let mut patcher = Patcher::new(env, realm, "webrtc");

        if realm.has_property(WINDOW, "RTCPeerConnection") {
            let relay = options.force_relay;
            patcher.patch_method(WINDOW, "RTCPeerConnection", |original| {
                let env = Rc::clone(env);
                native(move |this, args| {
                    env.record(StatCategory::Webrtc);
                    let mut args = args.to_vec();
                    if let Some(configuration) = args.first_mut() {
                        if relay && configuration.as_record().is_some() {
                            *configuration = force_relay(configuration);
                        }
                    }
                    original(this, &args)
                })
            });

            patcher.patch_method(PEER_CONNECTION, "createOffer", |original| {
                let env = Rc::clone(env);
                native(move |this, args| {
                    env.timing().random_delay_sync();
                    env.record(StatCategory::Webrtc);
                    let mut args = args.to_vec();
                    if let Some(offer_options) = args.first_mut() {
                        if relay && offer_options.as_record().is_some() {
                            *offer_options = force_relay(offer_options);
                        }
                    }
                    original(this, &args)
                })
            });

            patcher.patch_method(PEER_CONNECTION, "createAnswer", |original| timed(env, original));

            let sdp_options = options.clone();
            patcher.patch_method(PEER_CONNECTION, "setLocalDescription", |original| {
                let env = Rc::clone(env);
                native(move |this, args| {
                    env.timing().random_delay_sync();
                    env.record(StatCategory::Webrtc);
                    let description = args.first().cloned().unwrap_or_default();
                    let Some(sdp) = description.get("sdp").as_str().filter(|s| !s.is_empty()) else {
                        return original(this, args);
                    };
                    let rewritten = rewrite_sdp(sdp, &sdp_options, env.prng());
                    let modified = Value::record([
                        ("type", description.get("type").clone()),
                        ("sdp", Value::Str(rewritten)),
                    ]);
                    original(this, &[modified])
                })
            });

            patcher.patch_method(PEER_CONNECTION, "setRemoteDescription", |original| {
                timed(env, original)
            });

            let block = options.block_ip_leak;
            patcher.patch_method(PEER_CONNECTION, "addIceCandidate", |original| {
                let env = Rc::clone(env);
                native(move |this, args| {
                    env.timing().random_delay_sync();
                    env.record(StatCategory::Webrtc);
                    let leaky = args
                        .first()
                        .and_then(|c| c.get("candidate").as_str())
                        .is_some_and(is_leaky_candidate);
                    if block && leaky {
                        return Ok(Value::Undefined);
                    }
                    original(this, args)
                })
            });
        }

        patcher.patch_method(MEDIA_DEVICES, "getUserMedia", |original| timed(env, original));

        Ok(patcher.finish())
    }
}
