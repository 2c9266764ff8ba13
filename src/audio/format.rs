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


//! Audio format of the decrypted payload
//!
//! # Sources of Truth
//! 1. The metadata `format` field (e.g. "mp3", "flac") decides the output
//!    extension.
//! 2. An empty metadata section means the file is FLAC; historically only
//!    lossless downloads were written without metadata.
//! 3. Metadata without a `format` field falls back to MP3.
//!
//! [`AudioFormat::sniff`] inspects the header preview captured by the
//! streaming decoder. It is advisory: callers may cross-check with it, the
//! decoder never overrides the metadata-derived format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Audio format of a decoded container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum AudioFormat {
    /// MPEG Audio Layer 3
    Mp3,
    /// Free Lossless Audio Codec
    Flac,
    /// Any other tag the metadata names, lowercased
    Other(String),
}

impl AudioFormat {
    /// Parse the metadata `format` tag (case-insensitive)
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_lowercase();
        match tag.as_str() {
            "mp3" => Self::Mp3,
            "flac" => Self::Flac,
            "" => Self::Mp3,
            _ => Self::Other(tag),
        }
    }

    /// Get file extension for this format
    pub fn extension(&self) -> &str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Other(tag) => tag.as_str(),
        }
    }

    /// Check if format is lossless
    pub fn is_lossless(&self) -> bool {
        match self {
            Self::Flac => true,
            Self::Mp3 => false,
            Self::Other(tag) => matches!(tag.as_str(), "wav" | "ape" | "alac"),
        }
    }

    /// Classify a decrypted header preview by its magic bytes
    ///
    /// Returns `None` when nothing is recognised.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.starts_with(b"ID3") {
            return Some(Self::Mp3);
        }
        if header.starts_with(b"fLaC") {
            return Some(Self::Flac);
        }
        if header.starts_with(b"OggS") {
            return Some(Self::Other("ogg".to_string()));
        }
        if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"WAVE" {
            return Some(Self::Other("wav".to_string()));
        }
        if header.len() >= 8 && &header[4..8] == b"ftyp" {
            return Some(Self::Other("m4a".to_string()));
        }
        // Bare MPEG frame sync: 11 set bits, layer bits non-zero
        if header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0 && header[1] & 0x06 != 0 {
            return Some(Self::Mp3);
        }
        None
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::Mp3
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl From<String> for AudioFormat {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<AudioFormat> for String {
    fn from(format: AudioFormat) -> Self {
        format.extension().to_string()
    }
}
