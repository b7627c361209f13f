//! Padding-target extraction from resource URLs.
//!
//! The proxy appends `alpaca-padding=<N>` to the query string of every object
//! it pads (`?alpaca-padding=N`, or `&alpaca-padding=N` when a query already
//! exists). Decoy images carry extra parameters after it:
//! `/__alpaca_fake_image.png?alpaca-padding=N&i=K`.

use std::sync::LazyLock;

use regex::Regex;

/// Query parameter carrying the expected decoded size
pub const PADDING_PARAM: &str = "alpaca-padding";

/// Match: "?alpaca-padding=1234" or "&alpaca-padding=1234", ending at `&`, `#` or end of URL
static PADDING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[?&]alpaca-padding=([0-9]+)(?:[&#]|$)").expect("Invalid padding marker regex")
});

/// Expected decoded size encoded in `url`, if any.
///
/// Absence is the normal case for unpadded resources; a marker whose value is
/// not a base-10 integer counts as absent.
pub fn parse_padding_target(url: &str) -> Option<u64> {
    let caps = PADDING_MARKER.captures(url)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Append the padding marker to `url`, mirroring how the proxy rewrites links
pub fn with_padding_target(url: &str, target: u64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, separator, PADDING_PARAM, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_marker() {
        assert_eq!(
            parse_padding_target("http://localhost:8888/img/a.png?alpaca-padding=4096"),
            Some(4096)
        );
    }

    #[test]
    fn test_parse_marker_after_existing_query() {
        assert_eq!(
            parse_padding_target("http://localhost:8888/app.js?v=3&alpaca-padding=77"),
            Some(77)
        );
    }

    #[test]
    fn test_parse_fake_image_marker() {
        assert_eq!(
            parse_padding_target("http://localhost:8888/__alpaca_fake_image.png?alpaca-padding=512&i=2"),
            Some(512)
        );
    }

    #[test]
    fn test_round_trip() {
        for n in [0u64, 1, 9, 10, 1023, 65_536, 1_000_000_007, u64::MAX] {
            let url = with_padding_target("http://localhost:8888/style.css", n);
            assert_eq!(parse_padding_target(&url), Some(n), "url: {}", url);

            let url = with_padding_target("http://localhost:8888/style.css?theme=dark", n);
            assert_eq!(parse_padding_target(&url), Some(n), "url: {}", url);
        }
    }

    #[test]
    fn test_absent_marker() {
        assert_eq!(parse_padding_target("http://localhost:8888/"), None);
        assert_eq!(parse_padding_target("http://localhost:8888/a.png?size=100"), None);
        assert_eq!(parse_padding_target("data:image/png;base64,iVBORw0KGgo="), None);
    }

    #[test]
    fn test_malformed_marker_is_absent() {
        assert_eq!(parse_padding_target("http://x/a.png?alpaca-padding="), None);
        assert_eq!(parse_padding_target("http://x/a.png?alpaca-padding=12kb"), None);
        assert_eq!(parse_padding_target("http://x/a.png?alpaca-padding=-5"), None);
        assert_eq!(parse_padding_target("http://x/a.png?alpaca-padding=99999999999999999999999"), None);
    }

    #[test]
    fn test_marker_must_be_a_parameter() {
        assert_eq!(parse_padding_target("http://x/alpaca-padding=12"), None);
        assert_eq!(parse_padding_target("http://x/a.png?not-alpaca-padding=12"), None);
    }
}
