// Lifecycle gate.
//
// Decides whether a session may decode at all, keeps the advertised
// Accept-Encoding list consistent with the enabled flag, and owns the
// one-time process initialization that must precede the first decoder.

use crate::config::ConfigSource;
use crate::integrity::{self, Checksums};

/// Content-coding token this crate decodes.
pub const XZ_TOKEN: &str = "xz";

/// Permission check captured when a session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleGate {
    enabled: bool,
}

impl LifecycleGate {
    pub fn new(source: &impl ConfigSource) -> Self {
        Self {
            enabled: source.enabled(),
        }
    }

    /// Whether decoding is permitted.
    pub fn permit(&self) -> bool {
        self.enabled
    }
}

/// Run process-wide initialization. Idempotent; every call after the first
/// returns the same checksum engines.
pub fn ensure_initialized() -> &'static Checksums {
    integrity::tables()
}

/// Whether `token` is the xz content-coding.
pub fn is_xz_encoding(token: &str) -> bool {
    names_coding(token, XZ_TOKEN)
}

/// Whether the comma-separated `list` advertises `token`.
pub fn advertises(list: &str, token: &str) -> bool {
    list.split(',').any(|e| names_coding(e, token))
}

/// Bring the Accept-Encoding list in line with a change of the xz enabled
/// flag. See [`reconcile_token`].
pub fn reconcile(old_enabled: bool, new_enabled: bool, current: &str) -> String {
    reconcile_token(XZ_TOKEN, old_enabled, new_enabled, current)
}

/// Bring a comma-separated coding list in line with a change of the enabled
/// flag for `token`.
///
/// Enabling appends `token` unless an element already names it. Disabling
/// drops every element naming it. Elements that are kept are copied verbatim,
/// so disabling undoes exactly what enabling added. An unchanged flag leaves
/// the list untouched.
pub fn reconcile_token(token: &str, old_enabled: bool, new_enabled: bool, current: &str) -> String {
    match (old_enabled, new_enabled) {
        (false, true) => add_token(token, current),
        (true, false) => remove_token(token, current),
        _ => current.to_string(),
    }
}

/// An element names `token` when its coding, ignoring parameters such as
/// `;q=0.5` and surrounding whitespace, matches case-insensitively.
fn names_coding(element: &str, token: &str) -> bool {
    let coding = element.split(';').next().unwrap_or_default().trim();
    coding.eq_ignore_ascii_case(token)
}

fn add_token(token: &str, current: &str) -> String {
    if advertises(current, token) {
        return current.to_string();
    }
    if current.trim().is_empty() {
        format!("{current}{token}")
    } else {
        format!("{current}, {token}")
    }
}

fn remove_token(token: &str, current: &str) -> String {
    let mut removed_first = None;
    let mut removed_any = false;
    let mut kept = Vec::new();
    for (i, element) in current.split(',').enumerate() {
        if names_coding(element, token) {
            removed_any = true;
            if i == 0 {
                // Leading whitespace of a blank list the token was appended to.
                let trimmed = element.trim_start();
                removed_first = Some(&element[..element.len() - trimmed.len()]);
            }
        } else {
            kept.push(element);
        }
    }
    if !removed_any {
        return current.to_string();
    }
    match removed_first {
        Some(lead) if kept.is_empty() => lead.to_string(),
        Some(_) => kept.join(",").trim_start().to_string(),
        None => kept.join(","),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderConfig;

    fn count_xz(list: &str) -> usize {
        list.split(',').filter(|e| names_coding(e, XZ_TOKEN)).count()
    }

    #[test]
    fn gate_follows_enabled_flag() {
        let on = DecoderConfig::default();
        assert!(LifecycleGate::new(&on).permit());

        let off = DecoderConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(!LifecycleGate::new(&off).permit());
    }

    #[test]
    fn enable_appends_token() {
        assert_eq!(reconcile(false, true, "gzip, deflate"), "gzip, deflate, xz");
        assert_eq!(reconcile(false, true, ""), "xz");
        assert_eq!(reconcile(false, true, "  "), "  xz");
    }

    #[test]
    fn enable_is_idempotent_when_present() {
        assert_eq!(reconcile(false, true, "gzip, xz"), "gzip, xz");
        assert_eq!(reconcile(false, true, "gzip, xz;q=0.5"), "gzip, xz;q=0.5");
        assert_eq!(reconcile(false, true, "gzip,  XZ "), "gzip,  XZ ");
    }

    #[test]
    fn unchanged_flag_is_noop() {
        assert_eq!(reconcile(true, true, "gzip"), "gzip");
        assert_eq!(reconcile(false, false, "gzip, xz"), "gzip, xz");
    }

    #[test]
    fn disable_removes_every_xz_element() {
        assert_eq!(reconcile(true, false, "gzip, deflate, xz"), "gzip, deflate");
        assert_eq!(reconcile(true, false, "xz, gzip"), "gzip");
        assert_eq!(reconcile(true, false, "gzip, xz;q=0.1, br"), "gzip, br");
        assert_eq!(reconcile(true, false, "xz"), "");
        assert_eq!(reconcile(true, false, "xz, xz"), "");
    }

    #[test]
    fn disable_keeps_lookalike_codings() {
        assert_eq!(reconcile(true, false, "xzip, gzip"), "xzip, gzip");
        assert_eq!(reconcile(true, false, "x-xz"), "x-xz");
    }

    #[test]
    fn toggle_round_trip_restores_list() {
        for start in [
            "gzip, deflate",
            "gzip,deflate",
            "",
            "  ",
            "\t",
            " , ",
            "br;q=1.0 , gzip",
            "gzip,",
        ] {
            let on = reconcile(false, true, start);
            assert_eq!(count_xz(&on), 1, "enabled list {on:?}");
            let off = reconcile(true, false, &on);
            assert_eq!(off, start);
            assert_eq!(count_xz(&off), 0);
        }
    }

    #[test]
    fn recognizes_encoding_token() {
        assert!(is_xz_encoding("xz"));
        assert!(is_xz_encoding(" XZ "));
        assert!(!is_xz_encoding("gzip"));
        assert!(advertises("gzip, xz", XZ_TOKEN));
        assert!(!advertises("gzip", XZ_TOKEN));
    }

    #[test]
    fn initialization_is_shared() {
        let a = ensure_initialized() as *const Checksums;
        let b = ensure_initialized() as *const Checksums;
        assert_eq!(a, b);
    }
}
