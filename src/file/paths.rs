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


//! Output path generation and naming templates
//!
//! # Template System
//! - Placeholders: `{stem}` (input file name without extension), `{title}`,
//!   `{artist}` (first artist), `{artists}` (all, comma separated),
//!   `{album}`, `{id}`
//! - `/` in a template creates subdirectories
//! - If any placeholder has no value (no metadata, empty field) the whole
//!   template falls back to `{stem}`
//! - Every component is sanitized for the filesystem and capped at 255 bytes
//!   including the extension

use crate::audio::cover::ImageKind;
use crate::audio::format::AudioFormat;
use crate::audio::metadata::Metadata;
use crate::error::{NcmError, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const MAX_COMPONENT_LENGTH: usize = 255;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([a-z_]+)\}").unwrap();
    static ref INVALID_CHARS: Regex = Regex::new(r#"[\\/:*?"<>|\x00-\x1F\x7F]"#).unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Path template for naming decoded files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    template: String,
}

impl PathTemplate {
    pub fn new<S: Into<String>>(template: S) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Keep the input name: `{stem}`
    pub fn keep_name() -> Self {
        Self::new("{stem}")
    }

    /// `{artists} - {title}`
    pub fn artist_title() -> Self {
        Self::new("{artists} - {title}")
    }

    /// `{artist}/{album}/{title}`
    pub fn by_album() -> Self {
        Self::new("{artist}/{album}/{title}")
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Render to path components (no extension)
    pub fn render(&self, stem: &str, metadata: Option<&Metadata>) -> Vec<String> {
        let tags = Self::extract_tags(stem, metadata);

        // Single pass over the template; substituted values are never rescanned
        let mut unresolved = false;
        let result = PLACEHOLDER.replace_all(&self.template, |caps: &Captures| {
            match tags.get(&caps[1]) {
                Some(value) => sanitize_component(value),
                None => {
                    unresolved = true;
                    String::new()
                }
            }
        });
        if unresolved {
            return vec![sanitize_component(stem)];
        }

        let components: Vec<String> = result
            .split('/')
            .map(sanitize_component)
            .filter(|c| !c.is_empty())
            .collect();

        if components.is_empty() {
            vec![sanitize_component(stem)]
        } else {
            components
        }
    }

    fn extract_tags(stem: &str, metadata: Option<&Metadata>) -> HashMap<&'static str, String> {
        let mut tags = HashMap::new();
        tags.insert("stem", stem.to_string());

        let track = match metadata {
            Some(metadata) => metadata.track(),
            None => return tags,
        };

        if !track.title.is_empty() {
            tags.insert("title", track.title.clone());
        }
        let names = track.artist_names();
        if let Some(first) = names.first() {
            tags.insert("artist", first.clone());
            tags.insert("artists", names.join(", "));
        }
        if !track.album.is_empty() {
            tags.insert("album", track.album.clone());
        }
        if track.id != 0 {
            tags.insert("id", track.id.to_string());
        }

        tags
    }
}

impl Default for PathTemplate {
    fn default() -> Self {
        Self::keep_name()
    }
}

/// Make one path component safe for common filesystems
///
/// Path separators, reserved characters and control characters become `_`,
/// whitespace runs collapse to one space, and leading/trailing spaces and
/// trailing dots are trimmed.
pub fn sanitize_component(value: &str) -> String {
    let replaced = INVALID_CHARS.replace_all(value, "_");
    let collapsed = WHITESPACE_RUN.replace_all(&replaced, " ");
    let trimmed = collapsed.trim().trim_end_matches('.').trim_end();
    if trimmed == "." || trimmed == ".." {
        return String::new();
    }
    truncate_on_char_boundary(trimmed, MAX_COMPONENT_LENGTH).to_string()
}

fn truncate_on_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Builds output paths for decoded containers
#[derive(Debug, Clone)]
pub struct PathBuilder {
    output_directory: Option<PathBuf>,
    template: PathTemplate,
}

impl PathBuilder {
    /// Output next to the input unless `output_directory` is given
    pub fn new(output_directory: Option<PathBuf>, template: PathTemplate) -> Self {
        Self {
            output_directory,
            template,
        }
    }

    /// Audio output path for `input`
    ///
    /// # Errors
    /// - InvalidPath if `input` has no file name
    pub fn audio_path(
        &self,
        input: &Path,
        metadata: Option<&Metadata>,
        format: &AudioFormat,
    ) -> Result<PathBuf> {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NcmError::InvalidPath(format!("No file name in {}", input.display())))?;

        let base = match &self.output_directory {
            Some(dir) => dir.clone(),
            None => input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        let mut components = self.template.render(&stem, metadata);
        let extension = format.extension();
        // Leave room for ".ext" in the file name component
        if let Some(last) = components.last_mut() {
            let budget = MAX_COMPONENT_LENGTH.saturating_sub(extension.len() + 1);
            let truncated = truncate_on_char_boundary(last, budget).to_string();
            *last = format!("{}.{}", truncated, extension);
        }

        let mut path = base;
        for component in components {
            path.push(component);
        }
        Ok(path)
    }

    /// Cover image path next to an audio output
    pub fn cover_path(audio_path: &Path, kind: ImageKind) -> PathBuf {
        audio_path.with_extension(kind.extension())
    }
}
