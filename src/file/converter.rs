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


//! Container to audio file conversion
//!
//! # Conversion Process
//! 1. Open the container and parse the header (format, metadata, cover)
//! 2. Build the output path from the naming template
//! 3. Decrypt the payload straight into the output file (streaming) or
//!    through memory (whole-buffer), removing the partial file on failure
//! 4. Optionally write the cover image next to the audio file
//! 5. Hand the result to the caller's [`TagWriter`]
//!
//! [`BatchConverter`] runs many conversions at once. Every file gets its own
//! decode session on the blocking pool; a semaphore caps how many run in
//! parallel. A failed file is reported in its own result and never stops the
//! rest of the batch. Nothing is retried.

use crate::audio::cover::{resolve_cover, CoverArt, CoverFetcher, HttpCoverFetcher};
use crate::audio::format::AudioFormat;
use crate::audio::metadata::{Metadata, TagFields};
use crate::audio::tags::TagWriter;
use crate::container::{NcmReader, HEADER_PREVIEW_LEN};
use crate::error::{NcmError, Result};
use crate::file::paths::{PathBuilder, PathTemplate};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Conversion configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Output directory (None = next to each input file)
    pub output_directory: Option<PathBuf>,

    /// Naming template, see [`PathTemplate`]
    pub file_naming_template: String,

    /// Maximum concurrent conversions in a batch
    pub max_concurrent_conversions: usize,

    /// Decode in 4096-byte windows straight to disk instead of through memory
    pub streaming: bool,

    /// Replace existing output files
    pub overwrite: bool,

    /// Write the cover image next to the audio file
    pub write_cover_file: bool,

    /// Fetch the metadata's cover URL when no cover is embedded (batch only)
    pub fetch_remote_cover: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            output_directory: None,
            file_naming_template: "{stem}".to_string(),
            max_concurrent_conversions: 4,
            streaming: true,
            overwrite: false,
            write_cover_file: false,
            fetch_remote_cover: false,
        }
    }
}

impl ConvertConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            NcmError::InvalidConfiguration(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_conversions == 0 {
            return Err(NcmError::InvalidConfiguration(
                "max_concurrent_conversions must be at least 1".to_string(),
            ));
        }
        if self.file_naming_template.trim().is_empty() {
            return Err(NcmError::InvalidConfiguration(
                "file_naming_template must not be empty".to_string(),
            ));
        }
        if let Some(dir) = &self.output_directory {
            if dir.is_file() {
                return Err(NcmError::InvalidConfiguration(format!(
                    "output_directory is a file: {}",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    pub fn path_builder(&self) -> PathBuilder {
        PathBuilder::new(
            self.output_directory.clone(),
            PathTemplate::new(self.file_naming_template.clone()),
        )
    }
}

/// Result of converting one container
#[derive(Debug, Clone)]
pub struct ConvertOutcome {
    pub input: PathBuf,
    pub audio_path: PathBuf,
    /// Set when a cover file was written
    pub cover_path: Option<PathBuf>,
    pub format: AudioFormat,
    pub metadata: Option<Metadata>,
    pub cover: CoverArt,
    pub comment_key: Option<String>,
    /// Decrypted payload bytes written
    pub bytes_written: u64,
    /// First decrypted bytes of the payload
    pub header_preview: Vec<u8>,
}

impl ConvertOutcome {
    /// Files this conversion put on disk
    pub fn written_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.audio_path.clone()];
        paths.extend(self.cover_path.clone());
        paths
    }

    /// Cover to embed, if there is one
    pub fn cover_art(&self) -> Option<&CoverArt> {
        if self.cover.is_empty() {
            None
        } else {
            Some(&self.cover)
        }
    }

    /// Fields for the tag writer
    ///
    /// Without metadata the title is the input file stem. A comment set on
    /// the metadata wins over the container's comment key.
    pub fn tag_fields(&self) -> TagFields {
        let mut fields = match &self.metadata {
            Some(metadata) => metadata.tag_fields(),
            None => TagFields {
                title: self
                    .input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                ..TagFields::default()
            },
        };
        if fields.comment.is_none() {
            fields.comment = self.comment_key.clone();
        }
        fields
    }
}

/// Convert one container file
///
/// Remote covers are not fetched here; see [`BatchConverter`].
///
/// # Errors
/// - InvalidPath if the input does not exist
/// - FileAlreadyExists if the output exists and overwrite is off
/// - any decoder error, or TagWriteFailed from the tag writer
pub fn convert_file(
    input: &Path,
    config: &ConvertConfig,
    tag_writer: Option<&dyn TagWriter>,
) -> Result<ConvertOutcome> {
    let outcome = decode_to_file(input, config)?;
    if let Some(writer) = tag_writer {
        if let Err(e) = apply_tags(&outcome, writer) {
            discard_outputs(&outcome.written_paths());
            return Err(e);
        }
    }
    Ok(outcome)
}

/// Decode `input` and write the audio (and cover, if configured) to disk
///
/// On any error after the audio file was created, everything written so far
/// is removed again.
pub fn decode_to_file(input: &Path, config: &ConvertConfig) -> Result<ConvertOutcome> {
    let source = File::open(input).map_err(|e| open_error(input, e))?;
    let reader = NcmReader::open(BufReader::new(source))?;

    let audio_path = config.path_builder().audio_path(
        input,
        reader.header().metadata(),
        reader.header().format(),
    )?;
    create_parent(&audio_path)?;
    let output = create_output(&audio_path, config.overwrite)?;

    let outcome = match write_outputs(reader, output, input, &audio_path, config) {
        Ok(outcome) => outcome,
        Err(e) => {
            discard_outputs(&[audio_path]);
            return Err(e);
        }
    };

    info!(
        input = %input.display(),
        output = %outcome.audio_path.display(),
        format = %outcome.format,
        bytes = outcome.bytes_written,
        "container converted"
    );
    Ok(outcome)
}

fn write_outputs<R: io::Read>(
    reader: NcmReader<R>,
    output: File,
    input: &Path,
    audio_path: &Path,
    config: &ConvertConfig,
) -> Result<ConvertOutcome> {
    let decoded = if config.streaming {
        decode_streaming(reader, output)?
    } else {
        decode_buffered(reader, output)?
    };
    let mut outcome = decoded.into_outcome(input.to_path_buf(), audio_path.to_path_buf());

    if config.write_cover_file && !outcome.cover.is_empty() {
        let cover_path = PathBuilder::cover_path(&outcome.audio_path, outcome.cover.kind());
        write_new_file(&cover_path, outcome.cover.bytes(), config.overwrite)?;
        outcome.cover_path = Some(cover_path);
    }
    Ok(outcome)
}

/// Pass a finished conversion to the tag writer
pub fn apply_tags(outcome: &ConvertOutcome, writer: &dyn TagWriter) -> Result<()> {
    writer.write_tags(&outcome.audio_path, &outcome.tag_fields(), outcome.cover_art())
}

struct Decoded {
    metadata: Option<Metadata>,
    format: AudioFormat,
    cover: CoverArt,
    comment_key: Option<String>,
    bytes_written: u64,
    header_preview: Vec<u8>,
}

impl Decoded {
    fn into_outcome(self, input: PathBuf, audio_path: PathBuf) -> ConvertOutcome {
        ConvertOutcome {
            input,
            audio_path,
            cover_path: None,
            format: self.format,
            metadata: self.metadata,
            cover: self.cover,
            comment_key: self.comment_key,
            bytes_written: self.bytes_written,
            header_preview: self.header_preview,
        }
    }
}

fn decode_streaming<R: io::Read>(reader: NcmReader<R>, output: File) -> Result<Decoded> {
    let mut writer = BufWriter::new(output);
    let (header, summary) = reader.decode_to(&mut writer)?;
    Ok(Decoded {
        metadata: header.metadata().cloned(),
        format: header.format().clone(),
        cover: header.cover().clone(),
        comment_key: header.comment_key().map(str::to_string),
        bytes_written: summary.bytes_written,
        header_preview: summary.header_preview,
    })
}

fn decode_buffered<R: io::Read>(reader: NcmReader<R>, mut output: File) -> Result<Decoded> {
    let parts = reader.decode()?.into_parts();
    output
        .write_all(&parts.audio)
        .and_then(|_| output.flush())
        .map_err(NcmError::SinkWriteError)?;
    Ok(Decoded {
        metadata: parts.metadata,
        format: parts.format,
        cover: parts.cover,
        comment_key: parts.comment_key,
        bytes_written: parts.audio.len() as u64,
        header_preview: parts.audio[..parts.audio.len().min(HEADER_PREVIEW_LEN)].to_vec(),
    })
}

fn open_error(path: &Path, err: io::Error) -> NcmError {
    if err.kind() == io::ErrorKind::NotFound {
        NcmError::InvalidPath(format!("Input does not exist: {}", path.display()))
    } else {
        NcmError::SourceReadError(err)
    }
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(NcmError::SinkWriteError)
        }
        _ => Ok(()),
    }
}

fn create_output(path: &Path, overwrite: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options.open(path).map_err(|e| output_open_error(path, e))
}

async fn create_output_async(path: &Path, overwrite: bool) -> Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options.open(path).await.map_err(|e| output_open_error(path, e))
}

fn output_open_error(path: &Path, err: io::Error) -> NcmError {
    if err.kind() == io::ErrorKind::AlreadyExists {
        NcmError::FileAlreadyExists(path.display().to_string())
    } else {
        NcmError::SinkWriteError(err)
    }
}

/// Write a whole file; a file left half-written is removed
fn write_new_file(path: &Path, bytes: &[u8], overwrite: bool) -> Result<()> {
    let mut file = create_output(path, overwrite)?;
    if let Err(e) = file.write_all(bytes).and_then(|_| file.flush()) {
        drop(file);
        discard_outputs(&[path.to_path_buf()]);
        return Err(NcmError::SinkWriteError(e));
    }
    Ok(())
}

async fn write_new_file_async(path: &Path, bytes: &[u8], overwrite: bool) -> Result<()> {
    let mut file = create_output_async(path, overwrite).await?;
    let written = match file.write_all(bytes).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(file);
        discard_outputs_async(&[path.to_path_buf()]).await;
        return Err(NcmError::SinkWriteError(e));
    }
    Ok(())
}

fn discard_outputs(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            debug!(path = %path.display(), error = %e, "output not removed");
        }
    }
}

async fn discard_outputs_async(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!(path = %path.display(), error = %e, "output not removed");
        }
    }
}

/// Per-file result of a batch
#[derive(Debug)]
pub struct BatchItem {
    pub input: PathBuf,
    pub result: Result<ConvertOutcome>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Concurrent converter for many containers
pub struct BatchConverter<F: CoverFetcher + 'static = HttpCoverFetcher> {
    config: Arc<ConvertConfig>,
    semaphore: Arc<Semaphore>,
    fetcher: Option<Arc<F>>,
    tag_writer: Option<Arc<dyn TagWriter>>,
}

impl BatchConverter<HttpCoverFetcher> {
    /// Create a batch converter; an HTTP cover fetcher is set up when the
    /// configuration asks for remote covers
    pub fn new(config: ConvertConfig) -> Result<Self> {
        let fetcher = if config.fetch_remote_cover {
            Some(HttpCoverFetcher::new()?)
        } else {
            None
        };
        Self::build(config, fetcher)
    }
}

impl<F: CoverFetcher + 'static> BatchConverter<F> {
    /// Create a batch converter with a custom cover fetcher
    pub fn with_fetcher(config: ConvertConfig, fetcher: F) -> Result<Self> {
        Self::build(config, Some(fetcher))
    }

    fn build(config: ConvertConfig, fetcher: Option<F>) -> Result<Self> {
        config.validate()?;
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_conversions));
        Ok(Self {
            config: Arc::new(config),
            semaphore,
            fetcher: fetcher.map(Arc::new),
            tag_writer: None,
        })
    }

    pub fn with_tag_writer(mut self, writer: Arc<dyn TagWriter>) -> Self {
        self.tag_writer = Some(writer);
        self
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Convert every input, returning results in input order
    pub async fn run(&self, inputs: Vec<PathBuf>) -> Vec<BatchItem> {
        info!(
            files = inputs.len(),
            max_concurrent = self.config.max_concurrent_conversions,
            "batch started"
        );

        let mut handles = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let input = input.clone();
            let semaphore = Arc::clone(&self.semaphore);
            let config = Arc::clone(&self.config);
            let fetcher = self.fetcher.clone();
            let tag_writer = self.tag_writer.clone();

            handles.push(tokio::spawn(async move {
                // Wait for a conversion slot
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| NcmError::internal(format!("Semaphore closed: {}", e)))?;
                convert_one(input, config, fetcher, tag_writer).await
            }));
        }

        let mut items = Vec::with_capacity(handles.len());
        for (input, handle) in inputs.into_iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(NcmError::from(e)),
            };
            if let Err(e) = &result {
                warn!(input = %input.display(), error = %e, "conversion failed");
            }
            items.push(BatchItem { input, result });
        }

        let converted = items.iter().filter(|item| item.is_ok()).count();
        info!(
            converted,
            failed = items.len() - converted,
            "batch finished"
        );
        items
    }
}

async fn convert_one<F: CoverFetcher + 'static>(
    input: PathBuf,
    config: Arc<ConvertConfig>,
    fetcher: Option<Arc<F>>,
    tag_writer: Option<Arc<dyn TagWriter>>,
) -> Result<ConvertOutcome> {
    let decode_config = Arc::clone(&config);
    let outcome =
        tokio::task::spawn_blocking(move || decode_to_file(&input, &decode_config)).await??;

    let mut written = outcome.written_paths();
    match finish_one(outcome, &config, fetcher, tag_writer, &mut written).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            discard_outputs_async(&written).await;
            Err(e)
        }
    }
}

/// Remote cover and tags for a decoded file; every new file lands in `written`
async fn finish_one<F: CoverFetcher + 'static>(
    mut outcome: ConvertOutcome,
    config: &ConvertConfig,
    fetcher: Option<Arc<F>>,
    tag_writer: Option<Arc<dyn TagWriter>>,
    written: &mut Vec<PathBuf>,
) -> Result<ConvertOutcome> {
    if let Some(fetcher) = fetcher.filter(|_| outcome.cover.is_empty()) {
        if let Some(cover) =
            resolve_cover(&outcome.cover, outcome.metadata.as_ref(), fetcher.as_ref()).await
        {
            debug!(input = %outcome.input.display(), len = cover.len(), "remote cover fetched");
            if config.write_cover_file {
                let cover_path = PathBuilder::cover_path(&outcome.audio_path, cover.kind());
                write_new_file_async(&cover_path, cover.bytes(), config.overwrite).await?;
                written.push(cover_path.clone());
                outcome.cover_path = Some(cover_path);
            }
            outcome.cover = cover;
        }
    }

    match tag_writer {
        Some(writer) => {
            tokio::task::spawn_blocking(move || apply_tags(&outcome, writer.as_ref()).map(|_| outcome))
                .await?
        }
        None => Ok(outcome),
    }
}
