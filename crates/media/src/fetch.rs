//! Turning media references into bytes under a size ceiling.

use std::path::Path;

use {
    base64::{
        Engine as _,
        engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    },
    futures::StreamExt,
    reqwest::header::CONTENT_TYPE,
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    mime,
};

/// Bytes plus the best-known content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: Option<String>,
}

/// Download `url`, refusing anything larger than `max_bytes`.
///
/// A `Content-Length` above the ceiling is rejected before the body is read;
/// otherwise the body is streamed and the download aborted as soon as the
/// ceiling is crossed.
pub async fn fetch_remote(client: &reqwest::Client, url: &str, max_bytes: u64) -> Result<FetchedMedia> {
    let parsed = url::Url::parse(url).map_err(|_| Error::UnsupportedReference {
        reference: url.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::UnsupportedReference {
            reference: url.to_string(),
        });
    }

    let resp = client
        .get(parsed.clone())
        .send()
        .await
        .map_err(|e| Error::external(format!("fetch {url}"), e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    if resp.content_length().is_some_and(|len| len > max_bytes) {
        return Err(Error::TooLarge { limit: max_bytes });
    }

    let header = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let file_name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let mut bytes = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::external(format!("read body of {url}"), e))?;
        if (bytes.len() + chunk.len()) as u64 > max_bytes {
            return Err(Error::TooLarge { limit: max_bytes });
        }
        bytes.extend_from_slice(&chunk);
    }

    debug!(url, size = bytes.len(), "fetched remote media");
    let content_type = mime::resolve(&bytes, header.as_deref(), None, file_name.as_deref());
    Ok(FetchedMedia {
        bytes,
        content_type,
        file_name,
    })
}

/// Split a `data:` URL into its media type and base64 payload.
///
/// Returns `None` for anything that is not a base64 `data:` URL.
#[must_use]
pub fn parse_data_url(value: &str) -> Option<(Option<String>, &str)> {
    let rest = value.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mut parts = meta.split(';');
    let media_type = parts
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return None;
    }
    Some((media_type, payload))
}

/// Decode a base64 payload, refusing anything larger than `max_bytes`.
pub fn decode_inline(data: &str, declared: Option<&str>, max_bytes: u64) -> Result<FetchedMedia> {
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if (cleaned.len() as u64 / 4).saturating_mul(3) > max_bytes.saturating_add(3) {
        return Err(Error::TooLarge { limit: max_bytes });
    }

    let bytes = [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .into_iter()
        .find_map(|engine| engine.decode(&cleaned).ok())
        .ok_or_else(|| Error::Message {
            message: "inline media is not valid base64".into(),
        })?;
    if bytes.len() as u64 > max_bytes {
        return Err(Error::TooLarge { limit: max_bytes });
    }

    let content_type = mime::resolve(&bytes, None, declared, None);
    Ok(FetchedMedia {
        bytes,
        content_type,
        file_name: None,
    })
}

async fn read_local(path: &Path, max_bytes: u64) -> Result<FetchedMedia> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::external(format!("stat {}", path.display()), e))?;
    if meta.len() > max_bytes {
        return Err(Error::TooLarge { limit: max_bytes });
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::external(format!("read {}", path.display()), e))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string);
    let content_type = mime::resolve(&bytes, None, None, file_name.as_deref());
    Ok(FetchedMedia {
        bytes,
        content_type,
        file_name,
    })
}

/// Load any supported reference: `http(s)://`, `data:`, `file://`, or a
/// local path.
pub async fn load_reference(client: &reqwest::Client, reference: &str, max_bytes: u64) -> Result<FetchedMedia> {
    let reference = reference.trim();
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return fetch_remote(client, reference, max_bytes).await;
    }
    if reference.starts_with("data:") {
        let (media_type, payload) =
            parse_data_url(reference).ok_or_else(|| Error::UnsupportedReference {
                reference: "data: URL without base64 payload".into(),
            })?;
        return decode_inline(payload, media_type.as_deref(), max_bytes);
    }
    if reference.starts_with("file://") {
        let path = url::Url::parse(reference)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| Error::UnsupportedReference {
                reference: reference.to_string(),
            })?;
        return read_local(&path, max_bytes).await;
    }
    if reference.contains("://") || reference.is_empty() {
        return Err(Error::UnsupportedReference {
            reference: reference.to_string(),
        });
    }
    read_local(Path::new(reference), max_bytes).await
}
