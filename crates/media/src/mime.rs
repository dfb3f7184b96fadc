//! Content-type detection.
//!
//! Sniffed magic bytes win over an HTTP header, which wins over a declared
//! type, which wins over the file extension.

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Detect a content type from leading magic bytes.
#[must_use]
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xFF\xD8\xFF", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"OggS", "audio/ogg"),
        (b"ID3", "audio/mpeg"),
        (b"fLaC", "audio/flac"),
        (b"\x1A\x45\xDF\xA3", "video/webm"),
        (b"PK\x03\x04", "application/zip"),
    ];

    if let Some(&(_, mime)) = SIGNATURES.iter().find(|(sig, _)| bytes.starts_with(sig)) {
        return Some(mime);
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" {
        match &bytes[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/wav"),
            _ => {},
        }
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(match &bytes[8..12] {
            b"M4A " => "audio/mp4",
            b"heic" | b"heix" => "image/heic",
            _ => "video/mp4",
        });
    }
    None
}

/// Lowercased content type without parameters, or `None` when empty or
/// generic (`application/octet-stream`).
#[must_use]
pub fn normalize(content_type: &str) -> Option<String> {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();
    if base.is_empty() || base == OCTET_STREAM || !base.contains('/') {
        None
    } else {
        Some(base)
    }
}

/// Map a file extension to its content type.
#[must_use]
pub fn from_extension(ext: &str) -> Option<&'static str> {
    Some(match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "json" => "application/json",
        "mp3" => "audio/mpeg",
        "ogg" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "zip" => "application/zip",
        _ => return None,
    })
}

/// Map a content type to a file extension.
#[must_use]
pub fn extension_for(content_type: &str) -> &'static str {
    let base = content_type.split(';').next().unwrap_or(content_type).trim();
    match base {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        "application/json" => "json",
        "application/zip" => "zip",
        "text/plain" => "txt",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/mp4" | "audio/m4a" => "m4a",
        "audio/flac" => "flac",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        _ => "bin",
    }
}

/// Pick the best content type for a buffer from every available hint.
#[must_use]
pub fn resolve(
    bytes: &[u8],
    header: Option<&str>,
    declared: Option<&str>,
    file_name: Option<&str>,
) -> String {
    if let Some(sniffed) = sniff(bytes) {
        return sniffed.to_string();
    }
    header
        .and_then(normalize)
        .or_else(|| declared.and_then(normalize))
        .or_else(|| {
            file_name
                .and_then(|n| n.rsplit_once('.'))
                .and_then(|(_, ext)| from_extension(ext))
                .map(str::to_string)
        })
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}
