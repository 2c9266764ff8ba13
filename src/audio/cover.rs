// ncm-core - NCM container decoder
// Copyright (C) 2025 ncm-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Cover image extraction, sniffing and remote fetching
//!
//! The container's cover section is plaintext: the bytes are handed out
//! verbatim whatever they turn out to be. [`classify`] only advises the
//! caller which tag field or MIME type to use.
//!
//! When a container carries no embedded image the metadata may still name a
//! remote cover URL. Fetching it is an optional collaborator behind the
//! [`CoverFetcher`] trait and always happens after decoding, never inside the
//! parser.

use crate::audio::metadata::Metadata;
use crate::error::{NcmError, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default limit for remotely fetched covers (20 MiB)
pub const DEFAULT_MAX_COVER_SIZE: usize = 20 * 1024 * 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Image type recognised from magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageKind {
    Png,
    Jpeg,
    Bmp,
    Webp,
    Gif,
    Unknown,
}

impl ImageKind {
    /// MIME type, `application/octet-stream` when unknown
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Bmp => "image/bmp",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// File extension, `bin` when unknown
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Bmp => "bmp",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Unknown => "bin",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }
}

/// Classify image bytes by their magic prefix
///
/// Pure and infallible: anything shorter than two bytes or without a known
/// signature is `Unknown`.
///
/// # Example
/// ```
/// use ncm_core::audio::cover::{classify, ImageKind};
///
/// assert_eq!(classify(b"\xFF\xD8\xFF\xE0"), ImageKind::Jpeg);
/// assert_eq!(classify(&[]), ImageKind::Unknown);
/// ```
pub fn classify(bytes: &[u8]) -> ImageKind {
    if bytes.len() < 2 {
        return ImageKind::Unknown;
    }
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        ImageKind::Png
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ImageKind::Jpeg
    } else if bytes.starts_with(b"BM") {
        ImageKind::Bmp
    } else if bytes.starts_with(b"RIFF") {
        ImageKind::Webp
    } else if bytes.starts_with(b"GIF8") {
        ImageKind::Gif
    } else {
        ImageKind::Unknown
    }
}

/// Cover image bytes with their classified kind
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoverArt {
    bytes: Vec<u8>,
    kind: ImageKind,
}

impl Default for ImageKind {
    fn default() -> Self {
        Self::Unknown
    }
}

impl CoverArt {
    /// Wrap image bytes, classifying them
    pub fn new(bytes: Vec<u8>) -> Self {
        let kind = classify(&bytes);
        Self { bytes, kind }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Remote cover image source
pub trait CoverFetcher: Send + Sync {
    /// Download the image at `url`
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Cover fetcher over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpCoverFetcher {
    client: Client,
    max_size: usize,
}

impl HttpCoverFetcher {
    /// Create a fetcher with the default size limit and a 30 second timeout
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self::with_client(client, DEFAULT_MAX_COVER_SIZE))
    }

    /// Use an existing client (shared connection pool) and size limit
    pub fn with_client(client: Client, max_size: usize) -> Self {
        Self { client, max_size }
    }
}

impl CoverFetcher for HttpCoverFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = validate_cover_url(url)?;
        debug!(%url, "fetching remote cover");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            NcmError::network_error(
                format!("Failed to fetch cover {}: {}", url, e),
                e.is_timeout() || e.is_connect(),
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NcmError::network_error(
                format!("HTTP {} when fetching cover {}", status, url),
                status.is_server_error(),
            ));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_size as u64 {
                return Err(NcmError::CoverTooLarge { limit: self.max_size });
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                NcmError::network_error(format!("Failed to read cover bytes: {}", e), true)
            })?;
            if bytes.len() + chunk.len() > self.max_size {
                return Err(NcmError::CoverTooLarge { limit: self.max_size });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }
}

/// Accept only absolute http(s) URLs
pub fn validate_cover_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| NcmError::InvalidCoverUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(NcmError::InvalidCoverUrl(format!(
            "unsupported scheme '{}' in {}",
            other, url
        ))),
    }
}

/// Pick the cover to embed
///
/// The embedded image wins when non-empty. Otherwise the metadata's remote
/// URL is fetched. A failed fetch is logged and yields `None`: a missing cover
/// never fails a decode.
pub async fn resolve_cover<F: CoverFetcher>(
    embedded: &CoverArt,
    metadata: Option<&Metadata>,
    fetcher: &F,
) -> Option<CoverArt> {
    if !embedded.is_empty() {
        return Some(embedded.clone());
    }

    let url = metadata.and_then(Metadata::cover_url)?;
    match fetcher.fetch(url).await {
        Ok(bytes) if !bytes.is_empty() => Some(CoverArt::new(bytes)),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, url, "remote cover unavailable");
            None
        }
    }
}
