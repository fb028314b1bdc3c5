use regex::RegexSet;
use std::sync::OnceLock;
use url::Url;

use crate::error::{RadioError, Result};

/// Patrones que bloquean la URL sin más: loopback, redes privadas,
/// esquemas no HTTP y nombres de ejecutables.
fn blocked_patterns() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r"localhost",
            r"127\.0\.0\.1",
            r"0\.0\.0\.0",
            r"\[::1\]",
            r"192\.168\.",
            r"//10\.",
            r"172\.(1[6-9]|2[0-9]|3[01])\.",
            r"file://",
            r"ftp://",
            r"sftp://",
            r"\.(exe|bat|cmd|scr|pif|com)($|\?)",
            r"javascript:",
            r"data:",
            r"vbscript:",
        ])
        .expect("patrones de bloqueo inválidos")
    })
}

/// Firmas que identifican una URL como stream de audio legítimo.
fn streaming_patterns() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r"\.(mp3|aac|ogg|wav|flac|m4a)($|\?)",
            r"\.(m3u|m3u8|pls)($|\?)",
            r"(icecast|shoutcast|stream)",
            r"/(live|radio|stream)/",
        ])
        .expect("patrones de streaming inválidos")
    })
}

/// Dominios de emisoras conocidas que se aceptan aunque la URL no tenga
/// ninguna firma de streaming reconocible.
const TRUSTED_DOMAINS: &[&str] = &[
    "bbc.co.uk",
    "ndr.de",
    "wdr.de",
    "swr.de",
    "br.de",
    "ard.de",
    "deutschlandfunk.de",
    "ffn.de",
    "absolutradio.de",
    "ilovemusic.de",
    "pride1.de",
    "radio.de",
    "tune.in",
    "stream.live",
    "icecast",
];

/// Valida una URL candidata antes de persistirla como estación.
///
/// Orden de comprobación: esquema HTTP(S), patrones bloqueados, y por
/// último clasificación positiva (firma de streaming o dominio conocido).
pub fn validate_stream_url(raw: &str) -> Result<()> {
    let lower = raw.to_lowercase();

    if !lower.starts_with("http://") && !lower.starts_with("https://") {
        return Err(RadioError::UnsafeUrl {
            reason: "URL must start with http:// or https://".to_string(),
        });
    }

    // Una URL que ni siquiera parsea no se persiste
    if Url::parse(raw).is_err() {
        return Err(RadioError::UnsafeUrl {
            reason: "URL is not well-formed".to_string(),
        });
    }

    if blocked_patterns().is_match(&lower) {
        return Err(RadioError::UnsafeUrl {
            reason: "URL appears to be unsafe or blocked".to_string(),
        });
    }

    if streaming_patterns().is_match(&lower) {
        return Ok(());
    }

    if TRUSTED_DOMAINS.iter().any(|domain| lower.contains(domain)) {
        return Ok(());
    }

    Err(RadioError::UnsafeUrl {
        reason: "URL doesn't appear to be from a recognized streaming service".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_safe(url: &str) -> bool {
        validate_stream_url(url).is_ok()
    }

    #[test]
    fn test_scheme_must_be_http() {
        assert!(!is_safe("ftp://stream.example/radio.mp3"));
        assert!(!is_safe("stream.example/radio.mp3"));
        assert!(is_safe("http://stream.example/radio.mp3"));
        assert!(is_safe("https://stream.example/radio.mp3"));
    }

    #[test]
    fn test_private_hosts_blocked() {
        assert!(!is_safe("http://localhost:8000/x"));
        assert!(!is_safe("http://127.0.0.1/stream.mp3"));
        assert!(!is_safe("http://192.168.1.5/radio.mp3"));
        assert!(!is_safe("http://10.0.0.1/radio.mp3"));
        assert!(!is_safe("http://172.16.4.4/radio.mp3"));
        assert!(!is_safe("http://[::1]/radio.mp3"));
    }

    #[test]
    fn test_executables_blocked() {
        assert!(!is_safe("https://files.example/setup.exe"));
        assert!(!is_safe("https://files.example/run.bat?x=1"));
    }

    #[test]
    fn test_streaming_signatures_accepted() {
        assert!(is_safe("https://stream.example.com/live/radio.mp3"));
        assert!(is_safe("https://host.example/playlist.m3u8"));
        assert!(is_safe("https://icecast.example/mount"));
        assert!(is_safe("https://host.example/list.pls?id=3"));
    }

    #[test]
    fn test_trusted_domains_accepted() {
        assert!(is_safe("https://www.bbc.co.uk/sounds/player"));
        assert!(is_safe("https://www.deutschlandfunk.de/player"));
    }

    #[test]
    fn test_unrecognized_service_rejected() {
        assert!(!is_safe("https://example.com/index.html"));
    }
}
