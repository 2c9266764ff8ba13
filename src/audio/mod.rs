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


//! Decoded audio, metadata and cover art
//!
//! # Module Organization
//!
//! ## format
//! - `AudioFormat` - format tag of the decrypted payload (mp3, flac, ...)
//! - Header-preview sniffing
//!
//! ## metadata
//! - `Metadata` - `MusicTrack` or `DjProgram`
//! - `decrypt_metadata` / `parse_metadata` - base64 + AES + JSON decoding
//! - `TagFields` - title/artist/album/comment projection for tag writers
//!
//! ## cover
//! - `classify` / `ImageKind` - magic-byte image sniffing
//! - `CoverArt` - image bytes with their kind
//! - `CoverFetcher` / `HttpCoverFetcher` - optional remote cover source
//!
//! ## tags
//! - `TagWriter` - interface to the external tag-writing component

pub mod cover;
pub mod format;
pub mod metadata;
pub mod tags;

// Re-export commonly used types for convenience
pub use cover::{classify, resolve_cover, CoverArt, CoverFetcher, HttpCoverFetcher, ImageKind};
pub use format::AudioFormat;
pub use metadata::{
    decrypt_metadata, parse_metadata, Artist, DjProgram, Metadata, MusicTrack, TagFields,
};
pub use tags::{NoopTagWriter, TagWriter};
