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


//! Tag-writing collaborator interface
//!
//! Embedding tags into mp3/flac files is not done here. The converter hands
//! the decoded audio path, the projected [`TagFields`] and the cover to
//! whatever [`TagWriter`] the caller supplies.

use crate::audio::cover::CoverArt;
use crate::audio::metadata::TagFields;
use crate::error::Result;
use std::path::Path;

/// Consumer of decoded output that embeds tags into the audio file
pub trait TagWriter: Send + Sync {
    /// Write `fields` and `cover` into the audio file at `audio_path`
    fn write_tags(&self, audio_path: &Path, fields: &TagFields, cover: Option<&CoverArt>)
        -> Result<()>;
}

/// Tag writer that leaves files untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTagWriter;

impl TagWriter for NoopTagWriter {
    fn write_tags(&self, _audio_path: &Path, _fields: &TagFields, _cover: Option<&CoverArt>)
        -> Result<()> {
        Ok(())
    }
}
