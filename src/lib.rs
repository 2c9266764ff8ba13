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


//! ncm-core: decoder for NCM encrypted audio containers
//!
//! An NCM file wraps an mp3 or flac stream together with its key material,
//! encrypted track metadata and a cover image. This crate parses the
//! container, recovers the keybox and metadata, and decrypts the audio either
//! into memory or streamed into any writer.
//!
//! # Modules
//! - [`crypto`] - AES-128-ECB with PKCS7 and the keybox stream cipher
//! - [`container`] - section parser and the two decode paths
//! - [`audio`] - metadata model, format detection, cover art, tag writer seam
//! - [`file`] - scanning, output naming and batch conversion
//! - [`error`] - the error type shared by all of the above
//!
//! # Example
//! ```no_run
//! # fn example() -> ncm_core::error::Result<()> {
//! let container = ncm_core::decode_file("song.ncm")?;
//! println!("{} ({} bytes)", container.format(), container.audio_bytes().len());
//! if let Some(metadata) = container.metadata() {
//!     println!("{}", metadata.track().title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod container;
pub mod crypto;
pub mod error;
pub mod file;

pub use audio::{AudioFormat, CoverArt, ImageKind, Metadata, TagFields, TagWriter};
pub use container::{decode, Container, ContainerHeader, NcmReader, StreamSummary};
pub use error::{NcmError, Result};
pub use file::{convert_file, BatchConverter, ConvertConfig, ConvertOutcome};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Decode a container file into memory
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<Container> {
    let file = File::open(path.as_ref())?;
    decode(BufReader::new(file))
}

/// Read only the header of a container file (no audio is decrypted)
pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<ContainerHeader> {
    let file = File::open(path.as_ref())?;
    Ok(NcmReader::open(BufReader::new(file))?.header().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_missing_file() {
        let err = decode_file("/nonexistent/song.ncm").unwrap_err();
        assert!(matches!(err, NcmError::SourceReadError(_)));
    }

    #[test]
    fn test_inspect_rejects_other_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plain.mp3");
        std::fs::write(&path, b"ID3\x03\x00\x00\x00\x00\x00\x00").unwrap();
        assert!(matches!(
            inspect_file(&path).unwrap_err(),
            NcmError::NotContainerFormat(_)
        ));
    }
}
