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


//! NCM container parser
//!
//! # Layout
//! ```text
//! magic      8 bytes   "CTENFDAM"
//! gap        2 bytes   unused
//! key        u32 LE length + bytes   XOR 0x64, AES-ECB(core key),
//!                                    "neteasecloudmusic" + keybox seed
//! metadata   u32 LE length + bytes   XOR 0x63, "163 key(Don't modify):"
//!                                    + base64(AES-ECB(modify key, prefix + JSON))
//! gap + crc  9 bytes   unused
//! cover      u32 LE length + bytes   plaintext image
//! audio      rest of stream          keybox stream cipher
//! ```
//!
//! # Decode Process
//! 1. MagicCheck: wrong signature is `NotContainerFormat`
//! 2. KeySection: recover the seed, build the keybox once
//! 3. MetadataSection: length 0 short-circuits to "flac, no metadata"
//!    without touching base64 or AES
//! 4. CoverSection: bytes kept verbatim and classified
//! 5. AudioSection: whole-buffer ([`NcmReader::decode`], 32768-byte windows)
//!    or streaming ([`NcmReader::decode_to`], 4096-byte windows)
//!
//! The pass is strictly forward; no section is revisited. Each decode
//! session owns its reader, keybox and buffers, so independent files can be
//! decoded on independent threads with nothing shared.

use crate::audio::cover::{CoverArt, ImageKind};
use crate::audio::format::AudioFormat;
use crate::audio::metadata::{decrypt_metadata, Metadata};
use crate::container::section::{fill_window, SectionReader};
use crate::container::stream::{decode_stream, StreamSummary};
use crate::crypto::{build_keybox, decrypt_ecb, KeyBox, WHOLE_FILE_WINDOW_SIZE};
use crate::error::{NcmError, Result};
use std::io::{Read, Write};
use tracing::{debug, trace};

/// File signature
pub const MAGIC: &[u8; 8] = b"CTENFDAM";

/// AES key of the key section ("hzHRAmso5kInbaxW")
const CORE_KEY: [u8; 16] = [
    0x68, 0x7A, 0x48, 0x52, 0x41, 0x6D, 0x73, 0x6F, 0x35, 0x6B, 0x49, 0x6E, 0x62, 0x61, 0x78, 0x57,
];

const KEY_XOR: u8 = 0x64;
const METADATA_XOR: u8 = 0x63;

/// Plaintext prefix in front of the keybox seed
const KEY_PREFIX: &[u8] = b"neteasecloudmusic";

/// Line prefix of the metadata section
const METADATA_PREFIX: &[u8] = b"163 key(Don't modify):";

const HEADER_GAP: u64 = 2;
/// 5 unused bytes plus a 4-byte CRC
const COVER_GAP: u64 = 9;

/// Everything in front of the audio payload
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    keybox: KeyBox,
    metadata: Option<Metadata>,
    format: AudioFormat,
    cover: CoverArt,
    comment_key: Option<String>,
    audio_offset: u64,
}

impl ContainerHeader {
    /// Keybox derived from the key section
    pub fn key_box(&self) -> &KeyBox {
        &self.keybox
    }

    /// Decoded metadata, `None` for an empty metadata section
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Audio format: from metadata, or FLAC when metadata is absent
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Embedded cover (possibly empty)
    pub fn cover(&self) -> &CoverArt {
        &self.cover
    }

    /// The metadata section as text (`163 key(Don't modify):...`)
    ///
    /// Tag writers conventionally store this line as the comment tag.
    pub fn comment_key(&self) -> Option<&str> {
        self.comment_key.as_deref()
    }

    /// Absolute offset of the first audio byte
    pub fn audio_offset(&self) -> u64 {
        self.audio_offset
    }
}

/// A fully decoded container
///
/// Immutable once built; read the fields or take them with
/// [`into_parts`](Self::into_parts).
#[derive(Debug, Clone)]
pub struct Container {
    header: ContainerHeader,
    audio: Vec<u8>,
}

/// Owned fields of a decoded container
#[derive(Debug, Clone)]
pub struct ContainerParts {
    pub metadata: Option<Metadata>,
    pub format: AudioFormat,
    pub cover: CoverArt,
    pub comment_key: Option<String>,
    pub audio: Vec<u8>,
}

impl Container {
    pub fn key_box(&self) -> &KeyBox {
        self.header.key_box()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.header.metadata()
    }

    pub fn format(&self) -> &AudioFormat {
        self.header.format()
    }

    pub fn cover(&self) -> &CoverArt {
        self.header.cover()
    }

    pub fn cover_bytes(&self) -> &[u8] {
        self.header.cover().bytes()
    }

    pub fn cover_kind(&self) -> ImageKind {
        self.header.cover().kind()
    }

    pub fn comment_key(&self) -> Option<&str> {
        self.header.comment_key()
    }

    /// Decrypted audio payload
    pub fn audio_bytes(&self) -> &[u8] {
        &self.audio
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Format sniffed from the decrypted audio header, for cross-checking
    pub fn sniffed_format(&self) -> Option<AudioFormat> {
        AudioFormat::sniff(&self.audio[..self.audio.len().min(16)])
    }

    pub fn into_parts(self) -> ContainerParts {
        ContainerParts {
            metadata: self.header.metadata,
            format: self.header.format,
            cover: self.header.cover,
            comment_key: self.header.comment_key,
            audio: self.audio,
        }
    }
}

/// Container reader positioned at the audio payload
///
/// # Example
/// ```no_run
/// use ncm_core::container::NcmReader;
/// use std::fs::File;
/// use std::io::BufWriter;
///
/// # fn example() -> ncm_core::error::Result<()> {
/// let reader = NcmReader::open(File::open("song.ncm")?)?;
/// println!("format: {}", reader.header().format());
///
/// let output = BufWriter::new(File::create("song.mp3")?);
/// let (_header, summary) = reader.decode_to(output)?;
/// println!("wrote {} bytes", summary.bytes_written);
/// # Ok(())
/// # }
/// ```
pub struct NcmReader<R: Read> {
    source: SectionReader<R>,
    header: ContainerHeader,
}

impl<R: Read> NcmReader<R> {
    /// Parse every section in front of the audio payload
    ///
    /// # Errors
    /// - NotContainerFormat on a wrong signature
    /// - TruncatedContainer if any section is cut short
    /// - InvalidPadding if the key or metadata layer fails to decrypt
    /// - MalformedMetadata if decrypted metadata does not decode
    /// - SourceReadError if the reader fails
    pub fn open(reader: R) -> Result<Self> {
        let mut source = SectionReader::new(reader);

        check_magic(&mut source)?;
        source.skip("header gap", HEADER_GAP)?;

        let keybox = read_key_section(&mut source)?;
        let (metadata, comment_key) = read_metadata_section(&mut source)?;
        let format = match &metadata {
            Some(metadata) => metadata.audio_format(),
            None => AudioFormat::Flac,
        };
        let cover = read_cover_section(&mut source)?;

        let audio_offset = source.position();
        debug!(
            audio_offset,
            format = %format,
            has_metadata = metadata.is_some(),
            cover_len = cover.len(),
            "container header parsed"
        );

        Ok(Self {
            source,
            header: ContainerHeader {
                keybox,
                metadata,
                format,
                cover,
                comment_key,
                audio_offset,
            },
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Decrypt the remaining payload into memory (32768-byte windows)
    pub fn decode(mut self) -> Result<Container> {
        let mut audio = Vec::new();
        let mut window = vec![0u8; WHOLE_FILE_WINDOW_SIZE];

        loop {
            let n = fill_window(&mut self.source, &mut window)?;
            if n == 0 {
                break;
            }
            self.header.keybox.apply_window(&mut window[..n]);
            audio.extend_from_slice(&window[..n]);
            trace!(window_len = n, total = audio.len(), "audio window decrypted");
            if n < window.len() {
                break;
            }
        }

        debug!(audio_len = audio.len(), "audio payload decrypted");
        Ok(Container {
            header: self.header,
            audio,
        })
    }

    /// Stream the decrypted payload into `output` (4096-byte windows)
    ///
    /// Memory use stays bounded by one window whatever the file size.
    pub fn decode_to<W: Write>(mut self, output: W) -> Result<(ContainerHeader, StreamSummary)> {
        let summary = decode_stream(&self.header.keybox, &mut self.source, output)?;
        Ok((self.header, summary))
    }
}

/// Decode a whole container from a reader
pub fn decode<R: Read>(reader: R) -> Result<Container> {
    NcmReader::open(reader)?.decode()
}

fn check_magic<R: Read>(source: &mut SectionReader<R>) -> Result<()> {
    let magic = match source.read_array::<8>("magic") {
        Ok(magic) => magic,
        Err(NcmError::TruncatedContainer { available, .. }) => {
            return Err(NcmError::NotContainerFormat(format!(
                "stream holds only {} bytes",
                available
            )))
        }
        Err(e) => return Err(e),
    };

    if &magic != MAGIC {
        return Err(NcmError::NotContainerFormat(format!(
            "unexpected signature {:02X?}",
            magic
        )));
    }
    Ok(())
}

fn read_key_section<R: Read>(source: &mut SectionReader<R>) -> Result<KeyBox> {
    let mut data = source.read_length_prefixed("key")?;
    debug!(len = data.len(), "key section read");

    for byte in data.iter_mut() {
        *byte ^= KEY_XOR;
    }
    let plaintext = decrypt_ecb(&CORE_KEY, &data)?;

    // Padding alone only vouches for the last block. The seed is printable
    // ASCII behind a fixed signature, so a garbled block anywhere shows up.
    let seed = plaintext
        .strip_prefix(KEY_PREFIX)
        .ok_or_else(|| NcmError::invalid_padding("key material lacks its signature"))?;
    if seed.is_empty() || !seed.iter().all(u8::is_ascii_graphic) {
        return Err(NcmError::invalid_padding("key material failed integrity check"));
    }

    Ok(build_keybox(seed))
}

fn read_metadata_section<R: Read>(
    source: &mut SectionReader<R>,
) -> Result<(Option<Metadata>, Option<String>)> {
    let len = source.read_u32_le("metadata")?;
    if len == 0 {
        debug!("empty metadata section, assuming flac");
        return Ok((None, None));
    }

    let mut data = source.read_vec("metadata", len as usize)?;
    debug!(len = data.len(), "metadata section read");

    for byte in data.iter_mut() {
        *byte ^= METADATA_XOR;
    }
    if !data.starts_with(METADATA_PREFIX) {
        return Err(NcmError::malformed_metadata("metadata section lacks its key line prefix"));
    }

    let metadata = decrypt_metadata(&data[METADATA_PREFIX.len()..])?;
    let comment_key = String::from_utf8(data).ok();
    Ok((Some(metadata), comment_key))
}

fn read_cover_section<R: Read>(source: &mut SectionReader<R>) -> Result<CoverArt> {
    source.skip("cover gap", COVER_GAP)?;
    let image = source.read_length_prefixed("cover")?;
    let cover = CoverArt::new(image);
    debug!(len = cover.len(), kind = ?cover.kind(), "cover section read");
    Ok(cover)
}
