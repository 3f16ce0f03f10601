//! Wire formats for the three built-in probe handshakes, and reply
//! classification (spec.md §4.4, §6; SPEC_FULL.md §3).

use bytes::{Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

/// Which handshake, if any, a probe performs once the TCP connection is
/// established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// Bare TCP connect; the connection completing successfully *is* the
    /// check, no payload is sent (spec.md §4.3's "no protocol bit" case,
    /// lifted into its own variant per SPEC_FULL.md §3).
    Tcp,
    /// Send a pre-rendered HTTP request, classify the status line.
    Http,
    /// Send a pre-rendered SSL v3 `ClientHello`, classify the server's
    /// first reply record.
    Ssl3,
    /// Send a pre-rendered SMTP command, classify the banner.
    Smtp,
}

impl CheckKind {
    /// Whether this kind writes a payload after connecting (spec.md §4.3).
    pub fn sends_payload(self) -> bool {
        !matches!(self, CheckKind::Tcp)
    }
}

/// The result of classifying one probe reply (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Patch the 4-byte big-endian Unix timestamp into an SSL v3 probe payload
/// at the offset haproxy's `ClientHello` template reserves for it (byte 11).
///
/// Always returns a freshly allocated buffer; the template is never mutated
/// in place. This closes the spec.md §9 "double-dispose"-adjacent bug class
/// by construction — there is no shared, reused mutable buffer for two
/// concurrent probes to race on.
pub fn render_ssl3_probe(template: &Bytes, now: SystemTime) -> Bytes {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0) as u32;
    let mut buf = BytesMut::from(&template[..]);
    if buf.len() >= 15 {
        buf[11..15].copy_from_slice(&secs.to_be_bytes());
    }
    buf.freeze()
}

/// Classify a reply buffer according to the protocol in use.
///
/// Only the first `len` bytes of `buf` are valid; the remainder is leftover
/// scratch space from the caller's fixed-size read buffer and must be
/// ignored (spec.md §4.4: "the reply never needs more than a small
/// stack-allocated scratch buffer").
pub fn classify(kind: CheckKind, buf: &[u8], len: usize) -> Outcome {
    let data = &buf[..len.min(buf.len())];
    match kind {
        CheckKind::Tcp => Outcome::Success,
        CheckKind::Http => classify_http(data),
        CheckKind::Ssl3 => classify_ssl3(data),
        CheckKind::Smtp => classify_smtp(data),
    }
}

fn classify_http(data: &[u8]) -> Outcome {
    const MIN_LEN: usize = 12; // "HTTP/1.X NNN" up to (and including) the status digit
    if data.len() >= MIN_LEN && &data[..7] == b"HTTP/1." {
        match data[9] {
            b'2' | b'3' => Outcome::Success,
            _ => Outcome::Failure,
        }
    } else {
        Outcome::Failure
    }
}

fn classify_ssl3(data: &[u8]) -> Outcome {
    if data.len() >= 5 && matches!(data[0], 0x15 | 0x16) {
        Outcome::Success
    } else {
        Outcome::Failure
    }
}

fn classify_smtp(data: &[u8]) -> Outcome {
    if data.len() >= 3 && data[0] == b'2' {
        Outcome::Success
    } else {
        Outcome::Failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_2xx_and_3xx_are_success() {
        let body = b"HTTP/1.0 302 Found\r\n\r\n";
        assert_eq!(classify(CheckKind::Http, body, body.len()), Outcome::Success);
        let body = b"HTTP/1.1 200 OK\r\n\r\n";
        assert_eq!(classify(CheckKind::Http, body, body.len()), Outcome::Success);
    }

    #[test]
    fn http_4xx_is_failure() {
        let body = b"HTTP/1.1 404 Not Found\r\n\r\n";
        assert_eq!(classify(CheckKind::Http, body, body.len()), Outcome::Failure);
    }

    #[test]
    fn http_too_short_to_contain_a_status_digit_is_failure() {
        let body = b"HTTP/1.0";
        assert_eq!(classify(CheckKind::Http, body, body.len()), Outcome::Failure);
    }

    #[test]
    fn http_non_http_prefix_is_failure() {
        let body = b"GARBAGE-XYZ ";
        assert_eq!(classify(CheckKind::Http, body, body.len()), Outcome::Failure);
    }

    #[test]
    fn ssl3_alert_or_handshake_record_is_success() {
        assert_eq!(classify(CheckKind::Ssl3, &[0x15, 0, 0, 0, 0], 5), Outcome::Success);
        assert_eq!(classify(CheckKind::Ssl3, &[0x16, 0, 0, 0, 0], 5), Outcome::Success);
    }

    #[test]
    fn ssl3_short_reply_is_failure() {
        assert_eq!(classify(CheckKind::Ssl3, &[0x16, 0, 0, 0], 4), Outcome::Failure);
    }

    #[test]
    fn ssl3_wrong_leading_byte_is_failure() {
        assert_eq!(classify(CheckKind::Ssl3, &[0x01, 0, 0, 0, 0], 5), Outcome::Failure);
    }

    #[test]
    fn smtp_2xx_banner_is_success() {
        assert_eq!(classify(CheckKind::Smtp, b"250 ok", 6), Outcome::Success);
    }

    #[test]
    fn smtp_single_byte_reply_is_failure() {
        assert_eq!(classify(CheckKind::Smtp, b"2", 1), Outcome::Failure);
    }

    #[test]
    fn smtp_non_2_banner_is_failure() {
        assert_eq!(classify(CheckKind::Smtp, b"421 busy", 8), Outcome::Failure);
    }

    #[test]
    fn ssl3_patches_timestamp_into_a_fresh_buffer() {
        let template = Bytes::from_static(&[0u8; 20]);
        let now = UNIX_EPOCH + std::time::Duration::from_secs(0x0102_0304);
        let patched = render_ssl3_probe(&template, now);
        assert_eq!(&patched[11..15], &0x0102_0304u32.to_be_bytes());
        assert_eq!(&template[11..15], &[0, 0, 0, 0], "template must not be mutated");
    }

    #[test]
    fn ssl3_two_renders_do_not_alias() {
        let template = Bytes::from_static(&[0u8; 20]);
        let a = render_ssl3_probe(&template, UNIX_EPOCH + std::time::Duration::from_secs(1));
        let b = render_ssl3_probe(&template, UNIX_EPOCH + std::time::Duration::from_secs(2));
        assert_ne!(&a[11..15], &b[11..15]);
    }

    #[test]
    fn ssl3_short_template_is_left_unpatched() {
        let template = Bytes::from_static(&[0u8; 10]);
        let patched = render_ssl3_probe(&template, UNIX_EPOCH);
        assert_eq!(&patched[..], &template[..]);
    }
}
