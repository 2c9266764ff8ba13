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


//! File conversion and batch processing over temporary directories

mod common;

use common::*;
use ncm_core::audio::{CoverArt, CoverFetcher, ImageKind, TagFields, TagWriter};
use ncm_core::error::{NcmError, Result};
use ncm_core::file::{convert_file, scan_for_containers, BatchConverter, ConvertConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Records every tag write
#[derive(Default)]
struct RecordingWriter {
    calls: Mutex<Vec<(PathBuf, TagFields, Option<ImageKind>)>>,
}

impl TagWriter for RecordingWriter {
    fn write_tags(&self, audio_path: &Path, fields: &TagFields, cover: Option<&CoverArt>) -> Result<()> {
        self.calls.lock().unwrap().push((
            audio_path.to_path_buf(),
            fields.clone(),
            cover.map(CoverArt::kind),
        ));
        Ok(())
    }
}

/// Rejects every file
struct FailingWriter;

impl TagWriter for FailingWriter {
    fn write_tags(&self, _audio_path: &Path, _fields: &TagFields, _cover: Option<&CoverArt>) -> Result<()> {
        Err(NcmError::TagWriteFailed("read-only file".to_string()))
    }
}

struct StaticFetcher {
    calls: AtomicUsize,
    bytes: Vec<u8>,
}

impl CoverFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.bytes.clone())
    }
}

fn write_container(dir: &Path, name: &str, builder: &ContainerBuilder) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, builder.build()).unwrap();
    path
}

#[test]
fn test_convert_streaming_and_whole_file_agree() {
    let dir = TempDir::new().unwrap();
    let builder = ContainerBuilder::new().audio(mp3_payload(40_000));
    let input = write_container(dir.path(), "song.ncm", &builder);

    let streamed = convert_file(&input, &ConvertConfig::default(), None).unwrap();
    assert_eq!(streamed.audio_path, dir.path().join("song.mp3"));
    assert_eq!(streamed.bytes_written, 40_000);
    assert_eq!(std::fs::read(&streamed.audio_path).unwrap(), builder.plain_audio());

    let config = ConvertConfig {
        streaming: false,
        output_directory: Some(dir.path().join("whole")),
        ..ConvertConfig::default()
    };
    let whole = convert_file(&input, &config, None).unwrap();
    assert_eq!(whole.audio_path, dir.path().join("whole").join("song.mp3"));
    assert_eq!(std::fs::read(&whole.audio_path).unwrap(), builder.plain_audio());
    assert_eq!(whole.header_preview, streamed.header_preview);
}

#[test]
fn test_convert_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let input = write_container(dir.path(), "song.ncm", &ContainerBuilder::new());
    std::fs::write(dir.path().join("song.mp3"), b"keep me").unwrap();

    let err = convert_file(&input, &ConvertConfig::default(), None).unwrap_err();
    assert!(matches!(err, NcmError::FileAlreadyExists(_)));
    assert_eq!(std::fs::read(dir.path().join("song.mp3")).unwrap(), b"keep me");

    let config = ConvertConfig {
        overwrite: true,
        ..ConvertConfig::default()
    };
    convert_file(&input, &config, None).unwrap();
    assert_ne!(std::fs::read(dir.path().join("song.mp3")).unwrap(), b"keep me");
}

#[test]
fn test_convert_with_template_cover_and_tags() {
    let dir = TempDir::new().unwrap();
    let input = write_container(dir.path(), "x.ncm", &ContainerBuilder::new());
    let config = ConvertConfig {
        file_naming_template: "{artists} - {title}".to_string(),
        write_cover_file: true,
        ..ConvertConfig::default()
    };
    let writer = RecordingWriter::default();

    let outcome = convert_file(&input, &config, Some(&writer)).unwrap();
    assert_eq!(outcome.audio_path, dir.path().join("JVKE - Golden Hour.mp3"));
    assert_eq!(
        outcome.cover_path.as_deref(),
        Some(dir.path().join("JVKE - Golden Hour.png").as_path())
    );
    assert_eq!(std::fs::read(outcome.cover_path.unwrap()).unwrap(), PNG_COVER);

    let calls = writer.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (path, fields, cover) = &calls[0];
    assert_eq!(path, &outcome.audio_path);
    assert_eq!(fields.title, "Golden Hour");
    assert_eq!(fields.artist_line(), "JVKE");
    assert!(fields.comment.as_deref().unwrap().starts_with("163 key(Don't modify):"));
    assert_eq!(*cover, Some(ImageKind::Png));
}

#[test]
fn test_failed_decode_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let builder = ContainerBuilder::new().no_metadata().audio(flac_payload(1000));
    let mut bytes = builder.build();
    bytes[KEY_DATA_OFFSET] ^= 0xFF;
    let input = dir.path().join("broken.ncm");
    std::fs::write(&input, bytes).unwrap();

    let err = convert_file(&input, &ConvertConfig::default(), None).unwrap_err();
    assert!(err.is_crypto_error());
    assert!(!dir.path().join("broken.flac").exists());
}

#[test]
fn test_cover_collision_leaves_no_audio() {
    let dir = TempDir::new().unwrap();
    let input = write_container(dir.path(), "song.ncm", &ContainerBuilder::new());
    std::fs::write(dir.path().join("song.png"), b"keep me").unwrap();
    let config = ConvertConfig {
        write_cover_file: true,
        ..ConvertConfig::default()
    };

    let err = convert_file(&input, &config, None).unwrap_err();
    assert!(matches!(err, NcmError::FileAlreadyExists(_)));
    assert!(!dir.path().join("song.mp3").exists());
    assert_eq!(std::fs::read(dir.path().join("song.png")).unwrap(), b"keep me");

    // Nothing stale blocks a second attempt
    std::fs::remove_file(dir.path().join("song.png")).unwrap();
    let outcome = convert_file(&input, &config, None).unwrap();
    assert!(outcome.audio_path.exists());
    assert_eq!(std::fs::read(dir.path().join("song.png")).unwrap(), PNG_COVER);
}

#[test]
fn test_tag_failure_removes_outputs() {
    let dir = TempDir::new().unwrap();
    let input = write_container(dir.path(), "song.ncm", &ContainerBuilder::new());
    let config = ConvertConfig {
        write_cover_file: true,
        ..ConvertConfig::default()
    };

    let err = convert_file(&input, &config, Some(&FailingWriter)).unwrap_err();
    assert!(matches!(err, NcmError::TagWriteFailed(_)));
    assert!(!dir.path().join("song.mp3").exists());
    assert!(!dir.path().join("song.png").exists());
}

#[tokio::test]
async fn test_batch_remote_cover_collision() {
    let dir = TempDir::new().unwrap();
    let input = write_container(dir.path(), "song.ncm", &ContainerBuilder::new().cover(&[]));
    std::fs::write(dir.path().join("song.gif"), b"keep me").unwrap();

    let fetcher = StaticFetcher {
        calls: AtomicUsize::new(0),
        bytes: b"GIF89a\x01\x00\x01\x00".to_vec(),
    };
    let config = ConvertConfig {
        write_cover_file: true,
        fetch_remote_cover: true,
        ..ConvertConfig::default()
    };
    let converter = BatchConverter::with_fetcher(config, fetcher).unwrap();

    let items = converter.run(vec![input]).await;
    assert!(matches!(
        items[0].result,
        Err(NcmError::FileAlreadyExists(_))
    ));
    assert!(!dir.path().join("song.mp3").exists());
    assert_eq!(std::fs::read(dir.path().join("song.gif")).unwrap(), b"keep me");
}

#[tokio::test]
async fn test_batch_tag_failure_removes_outputs() {
    let dir = TempDir::new().unwrap();
    let input = write_container(dir.path(), "song.ncm", &ContainerBuilder::new().cover(&[]));

    let fetcher = StaticFetcher {
        calls: AtomicUsize::new(0),
        bytes: b"GIF89a\x01\x00\x01\x00".to_vec(),
    };
    let config = ConvertConfig {
        write_cover_file: true,
        fetch_remote_cover: true,
        ..ConvertConfig::default()
    };
    let converter = BatchConverter::with_fetcher(config, fetcher)
        .unwrap()
        .with_tag_writer(Arc::new(FailingWriter));

    let items = converter.run(vec![input]).await;
    assert!(matches!(items[0].result, Err(NcmError::TagWriteFailed(_))));
    assert!(!dir.path().join("song.mp3").exists());
    assert!(!dir.path().join("song.gif").exists());
}

#[tokio::test]
async fn test_batch_reports_each_file() {
    let dir = TempDir::new().unwrap();
    write_container(dir.path(), "a.ncm", &ContainerBuilder::new());
    write_container(
        dir.path(),
        "b.ncm",
        &ContainerBuilder::new().no_metadata().audio(flac_payload(9000)),
    );
    std::fs::write(dir.path().join("c.ncm"), b"not a container at all").unwrap();

    let inputs = scan_for_containers(dir.path(), false).await.unwrap();
    assert_eq!(inputs.len(), 3);

    let config = ConvertConfig {
        max_concurrent_conversions: 2,
        ..ConvertConfig::default()
    };
    let converter = BatchConverter::new(config).unwrap();
    let items = converter.run(inputs).await;

    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok());
    assert!(items[1].is_ok());
    assert!(matches!(
        items[2].result,
        Err(NcmError::NotContainerFormat(_))
    ));
    assert!(dir.path().join("a.mp3").exists());
    assert!(dir.path().join("b.flac").exists());
}

#[tokio::test]
async fn test_batch_fetches_missing_cover() {
    let dir = TempDir::new().unwrap();
    let input = write_container(dir.path(), "song.ncm", &ContainerBuilder::new().cover(&[]));
    let embedded = write_container(dir.path(), "embedded.ncm", &ContainerBuilder::new());

    let fetcher = StaticFetcher {
        calls: AtomicUsize::new(0),
        bytes: b"GIF89a\x01\x00\x01\x00".to_vec(),
    };
    let config = ConvertConfig {
        write_cover_file: true,
        fetch_remote_cover: true,
        ..ConvertConfig::default()
    };
    let writer = Arc::new(RecordingWriter::default());
    let converter = BatchConverter::with_fetcher(config, fetcher)
        .unwrap()
        .with_tag_writer(writer.clone());

    let items = converter.run(vec![input, embedded]).await;
    let fetched = items[0].result.as_ref().unwrap();
    assert_eq!(fetched.cover.kind(), ImageKind::Gif);
    assert_eq!(fetched.cover_path, Some(dir.path().join("song.gif")));

    let kept = items[1].result.as_ref().unwrap();
    assert_eq!(kept.cover.kind(), ImageKind::Png);
    assert_eq!(kept.cover_path, Some(dir.path().join("embedded.png")));

    assert_eq!(writer.calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_batch_rejects_invalid_config() {
    let config = ConvertConfig {
        max_concurrent_conversions: 0,
        ..ConvertConfig::default()
    };
    assert!(matches!(
        BatchConverter::new(config),
        Err(NcmError::InvalidConfiguration(_))
    ));
}
