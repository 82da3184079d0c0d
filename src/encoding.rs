//! Charset resolution for fetched pages

use crate::transport::RawResponse;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use regex::bytes::Regex;
use std::sync::OnceLock;

const UTF8_MARKER: &[u8] = b"charset=utf-8";

/// True if the headers or the raw body carry a `charset=utf-8` marker (any case)
pub fn declares_utf8(resp: &RawResponse) -> bool {
    let in_header = resp
        .content_type
        .as_deref()
        .is_some_and(|ct| contains_ignore_case(ct.as_bytes(), UTF8_MARKER));
    in_header || contains_ignore_case(&resp.body, UTF8_MARKER)
}

/// Best guess when the page does not declare UTF-8.
///
/// Header charset first, then a `<meta charset>` declaration, then UTF-8 if the
/// bytes are valid UTF-8, else windows-1252.
pub fn apparent_encoding(resp: &RawResponse) -> &'static Encoding {
    if let Some(enc) = resp.charset_hint().and_then(|l| Encoding::for_label(l.as_bytes())) {
        return enc;
    }
    if let Some(enc) = sniff_meta_charset(&resp.body) {
        return enc;
    }
    if std::str::from_utf8(&resp.body).is_ok() {
        UTF_8
    } else {
        WINDOWS_1252
    }
}

/// Decode the body with the resolved encoding
pub fn decode(resp: &RawResponse) -> String {
    let encoding = if declares_utf8(resp) {
        UTF_8
    } else {
        apparent_encoding(resp)
    };
    let (text, _, _) = encoding.decode(&resp.body);
    text.into_owned()
}

fn sniff_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    static META: OnceLock<Option<Regex>> = OnceLock::new();
    let re = META
        .get_or_init(|| Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-z0-9_\-:.]+)"#).ok())
        .as_ref()?;
    // Declarations live in <head>
    let head = &body[..body.len().min(4096)];
    let caps = re.captures(head)?;
    Encoding::for_label(caps.get(1)?.as_bytes())
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}
