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


//! Container metadata model and decoder
//!
//! # Wire Format
//! After the container framing is removed (XOR 0x63, 22-byte
//! `163 key(Don't modify):` line prefix) the section holds base64 text. That
//! text decodes to AES-128-ECB ciphertext under a fixed key; the plaintext is
//! a short ASCII prefix followed by JSON:
//! - `music:{...}` - a single track ([`MusicTrack`])
//! - `dj:{...}` - a radio program wrapping its track under `mainMusic`
//!   ([`DjProgram`])
//!
//! # Field Quirks
//! The producer is inconsistent about JSON types:
//! - ids and counters arrive as numbers or as numeric strings (`"mvId": ""`
//!   means no video)
//! - `albumPicDocId` is a number in some files and a string in others; it is
//!   always kept as a string
//! - artists are `[name, id]` pairs in practice, objects in some producers
//! - list fields (`alias`, `transNames`) may be missing or `null`
//!
//! Any failure to decode a successfully decrypted payload is a hard
//! `MalformedMetadata` error.

use crate::audio::format::AudioFormat;
use crate::crypto::decrypt_ecb;
use crate::error::{NcmError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// AES key of the metadata layer ("#14ljk_!\]&0U<'(")
const MODIFY_KEY: [u8; 16] = [
    0x23, 0x31, 0x34, 0x6C, 0x6A, 0x6B, 0x5F, 0x21, 0x5C, 0x5D, 0x26, 0x30, 0x55, 0x3C, 0x27, 0x28,
];

/// Plaintext prefix of a single-track payload
pub const MUSIC_PREFIX: &[u8] = b"music:";

/// Plaintext prefix of a radio-program payload
pub const DJ_PREFIX: &[u8] = b"dj:";

/// Decoded metadata, one of the two payload shapes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Metadata {
    MusicTrack(MusicTrack),
    DjProgram(DjProgram),
}

/// Artist credit: display name and numeric id (0 when unknown)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawArtist")]
pub struct Artist {
    pub name: String,
    pub id: u64,
}

/// Single track metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicTrack {
    #[serde(rename = "musicId", deserialize_with = "lenient::number")]
    pub id: u64,
    #[serde(rename = "musicName")]
    pub title: String,
    #[serde(rename = "artist", default)]
    pub artists: Vec<Artist>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub album_id: u64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub album: String,
    /// Remote album cover URL
    #[serde(rename = "albumPic", default, deserialize_with = "lenient::text")]
    pub album_pic_url: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub album_pic_doc_id: String,
    /// Bits per second
    #[serde(default, deserialize_with = "lenient::number")]
    pub bitrate: u64,
    /// Internal document id of the raw media
    #[serde(default, deserialize_with = "lenient::text")]
    pub mp3_doc_id: String,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub mv_id: Option<u64>,
    #[serde(rename = "duration", default, deserialize_with = "lenient::number")]
    pub duration_ms: u64,
    /// Audio format tag, e.g. "mp3" or "flac"
    #[serde(default, deserialize_with = "lenient::text")]
    pub format: String,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub alias: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub trans_names: Vec<String>,
    /// Caller-supplied comment for tag writing; never on the wire
    #[serde(skip)]
    pub comment: Option<String>,
}

/// Radio program metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DjProgram {
    #[serde(rename = "mainMusic")]
    pub main_track: MusicTrack,
    #[serde(default, deserialize_with = "lenient::number")]
    pub program_id: u64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub program_name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub program_desc: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub dj_id: u64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub dj_name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub dj_avatar_url: String,
    /// Creation time, milliseconds since the Unix epoch
    #[serde(rename = "createTime", default, deserialize_with = "lenient::number")]
    pub create_time_ms: u64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub brand: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub serial: u64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub program_fee_type: u64,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub program_buyed: bool,
    #[serde(default, deserialize_with = "lenient::number")]
    pub radio_id: u64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub radio_name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub radio_category: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub radio_category_id: u64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub radio_desc: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub radio_fee_type: u64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub radio_fee_scope: u64,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub radio_buyed: bool,
    #[serde(default, deserialize_with = "lenient::number")]
    pub radio_price: u64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub radio_purchase_count: u64,
}

/// Fields a tag writer needs for title/album/artist/comment tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFields {
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub comment: Option<String>,
}

impl TagFields {
    /// Artists joined with "/" (the common ID3 multi-value convention)
    pub fn artist_line(&self) -> String {
        self.artists.join("/")
    }
}

impl MusicTrack {
    /// Audio format named by the `format` field ("mp3" when missing)
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::from_tag(&self.format)
    }

    /// Artist names in credit order
    pub fn artist_names(&self) -> Vec<String> {
        self.artists.iter().map(|a| a.name.clone()).collect()
    }

    /// Remote cover URL if present
    pub fn cover_url(&self) -> Option<&str> {
        let url = self.album_pic_url.trim();
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }

    /// Set the out-of-band comment used for tag writing
    pub fn set_comment<S: Into<String>>(&mut self, comment: S) {
        self.comment = Some(comment.into());
    }
}

impl DjProgram {
    /// Program creation time
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let ms = i64::try_from(self.create_time_ms).ok()?;
        Utc.timestamp_millis_opt(ms).single()
    }
}

impl Metadata {
    /// The track carried by either shape
    pub fn track(&self) -> &MusicTrack {
        match self {
            Metadata::MusicTrack(track) => track,
            Metadata::DjProgram(program) => &program.main_track,
        }
    }

    /// Mutable access to the carried track (e.g. to set a comment)
    pub fn track_mut(&mut self) -> &mut MusicTrack {
        match self {
            Metadata::MusicTrack(track) => track,
            Metadata::DjProgram(program) => &mut program.main_track,
        }
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.track().audio_format()
    }

    pub fn cover_url(&self) -> Option<&str> {
        self.track().cover_url()
    }

    /// Project the tag fields
    ///
    /// Radio programs are tagged with the program name as title and the
    /// radio name as album, as players list them that way.
    pub fn tag_fields(&self) -> TagFields {
        let track = self.track();
        match self {
            Metadata::MusicTrack(_) => TagFields {
                title: track.title.clone(),
                artists: track.artist_names(),
                album: track.album.clone(),
                comment: track.comment.clone(),
            },
            Metadata::DjProgram(program) => TagFields {
                title: non_empty_or(&program.program_name, &track.title),
                artists: if program.dj_name.is_empty() {
                    track.artist_names()
                } else {
                    vec![program.dj_name.clone()]
                },
                album: non_empty_or(&program.radio_name, &track.album),
                comment: track.comment.clone(),
            },
        }
    }
}

fn non_empty_or(preferred: &str, fallback: &str) -> String {
    if preferred.trim().is_empty() {
        fallback.to_string()
    } else {
        preferred.to_string()
    }
}

/// Decrypt and parse the base64 body of a metadata section
///
/// `encoded` is the section after XOR and line-prefix removal.
///
/// # Errors
/// - MalformedMetadata if the base64, the prefix or the JSON is invalid
/// - InvalidPadding if the AES layer rejects the ciphertext
pub fn decrypt_metadata(encoded: &[u8]) -> Result<Metadata> {
    let encoded = trim_ascii_whitespace(encoded);
    let ciphertext = BASE64
        .decode(encoded)
        .map_err(|e| NcmError::malformed_metadata(format!("base64 decode failed: {}", e)))?;
    let plaintext = decrypt_ecb(&MODIFY_KEY, &ciphertext)?;
    parse_metadata(&plaintext)
}

/// Parse decrypted metadata plaintext (`music:` or `dj:` prefixed JSON)
pub fn parse_metadata(plaintext: &[u8]) -> Result<Metadata> {
    if let Some(json) = plaintext.strip_prefix(MUSIC_PREFIX) {
        let track: MusicTrack = serde_json::from_slice(json)
            .map_err(|e| NcmError::malformed_metadata(format!("track JSON: {}", e)))?;
        debug!(track_id = track.id, format = %track.format, "decoded track metadata");
        Ok(Metadata::MusicTrack(track))
    } else if let Some(json) = plaintext.strip_prefix(DJ_PREFIX) {
        let program: DjProgram = serde_json::from_slice(json)
            .map_err(|e| NcmError::malformed_metadata(format!("program JSON: {}", e)))?;
        debug!(program_id = program.program_id, "decoded program metadata");
        Ok(Metadata::DjProgram(program))
    } else {
        let shown = &plaintext[..plaintext.len().min(8)];
        Err(NcmError::malformed_metadata(format!(
            "unknown payload prefix {:?}",
            String::from_utf8_lossy(shown)
        )))
    }
}

fn trim_ascii_whitespace(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(data.len());
    let end = data.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &data[start..end]
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawArtist {
    Pair(String, lenient::NumberOrString),
    NameOnly((String,)),
    Object {
        name: String,
        #[serde(default)]
        id: Option<lenient::NumberOrString>,
    },
}

impl TryFrom<RawArtist> for Artist {
    type Error = String;

    fn try_from(raw: RawArtist) -> std::result::Result<Self, Self::Error> {
        let (name, id) = match raw {
            RawArtist::Pair(name, id) => (name, Some(id)),
            RawArtist::NameOnly((name,)) => (name, None),
            RawArtist::Object { name, id } => (name, id),
        };
        let id = match id {
            Some(id) => id.to_u64()?.unwrap_or(0),
            None => 0,
        };
        Ok(Artist { name, id })
    }
}

/// Deserializers tolerating the producer's number/string mixing
mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum NumberOrString {
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Bool(bool),
        Text(String),
    }

    impl NumberOrString {
        /// `Ok(None)` for an empty string
        pub(super) fn to_u64(&self) -> Result<Option<u64>, String> {
            match self {
                NumberOrString::Unsigned(n) => Ok(Some(*n)),
                NumberOrString::Signed(n) => u64::try_from(*n)
                    .map(Some)
                    .map_err(|_| format!("negative id {}", n)),
                NumberOrString::Float(f) if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 => {
                    Ok(Some(*f as u64))
                }
                NumberOrString::Float(f) => Err(format!("non-integral id {}", f)),
                NumberOrString::Bool(b) => Ok(Some(u64::from(*b))),
                NumberOrString::Text(s) => {
                    let s = s.trim();
                    if s.is_empty() {
                        Ok(None)
                    } else {
                        s.parse::<u64>()
                            .map(Some)
                            .map_err(|_| format!("non-numeric id {:?}", s))
                    }
                }
            }
        }

        fn into_string(self) -> String {
            match self {
                NumberOrString::Unsigned(n) => n.to_string(),
                NumberOrString::Signed(n) => n.to_string(),
                NumberOrString::Float(f) if f.fract() == 0.0 && f.abs() < 1e17 => {
                    format!("{}", f as i64)
                }
                NumberOrString::Float(f) => f.to_string(),
                NumberOrString::Bool(b) => b.to_string(),
                NumberOrString::Text(s) => s,
            }
        }
    }

    pub(super) fn number<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        match Option::<NumberOrString>::deserialize(d)? {
            Some(value) => Ok(value.to_u64().map_err(D::Error::custom)?.unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// Missing, null, empty string and 0 all mean "none"
    pub(super) fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        match Option::<NumberOrString>::deserialize(d)? {
            Some(value) => Ok(value
                .to_u64()
                .map_err(D::Error::custom)?
                .filter(|&id| id != 0)),
            None => Ok(None),
        }
    }

    pub(super) fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(Option::<NumberOrString>::deserialize(d)?
            .map(NumberOrString::into_string)
            .unwrap_or_default())
    }

    pub(super) fn text_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
    }

    pub(super) fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match Option::<NumberOrString>::deserialize(d)? {
            Some(NumberOrString::Bool(b)) => Ok(b),
            Some(NumberOrString::Text(s)) => Ok(matches!(s.trim(), "true" | "1")),
            Some(other) => Ok(other.to_u64().map_err(D::Error::custom)?.unwrap_or(0) != 0),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN_HOUR: &str = r#"{
        "musicId": 1958557540,
        "musicName": "golden hour",
        "artist": [["JVKE", 32988392]],
        "albumId": 152231212,
        "album": "this is what ____ feels like (Vol. 1-4)",
        "albumPicDocId": "109951167909857256",
        "albumPic": "https://p3.music.126.net/xKRQRZxEClE6653o7NbHiw==/109951167909857256.jpg",
        "bitrate": 320000,
        "mp3DocId": "d919d45cba30d6d5e5daff43b71cca8a",
        "duration": 209259,
        "mvId": 14570752,
        "alias": [],
        "transNames": [],
        "format": "mp3",
        "flag": 260
    }"#;

    fn music(json: &str) -> Vec<u8> {
        let mut plaintext = MUSIC_PREFIX.to_vec();
        plaintext.extend_from_slice(json.as_bytes());
        plaintext
    }

    #[test]
    fn test_parse_music_track() {
        let metadata = parse_metadata(&music(GOLDEN_HOUR)).unwrap();
        let track = match &metadata {
            Metadata::MusicTrack(track) => track,
            other => panic!("unexpected variant {:?}", other),
        };
        assert_eq!(track.id, 1958557540);
        assert_eq!(track.title, "golden hour");
        assert_eq!(track.artists, vec![Artist { name: "JVKE".to_string(), id: 32988392 }]);
        assert_eq!(track.album_id, 152231212);
        assert_eq!(track.album_pic_doc_id, "109951167909857256");
        assert_eq!(track.bitrate, 320000);
        assert_eq!(track.duration_ms, 209259);
        assert_eq!(track.mv_id, Some(14570752));
        assert_eq!(track.comment, None);
        assert_eq!(metadata.audio_format(), AudioFormat::Mp3);
        assert!(metadata.cover_url().unwrap().ends_with(".jpg"));
    }

    #[test]
    fn test_numeric_strings_and_numeric_doc_id() {
        let json = r#"{
            "musicId": "2062898402",
            "musicName": "Endless Summer",
            "artist": [["Alan Walker", "1045123"], ["Zak Abel", "1053190"]],
            "albumId": "178429151",
            "album": "Walkerworld",
            "albumPicDocId": 109951169035717968,
            "bitrate": 320000,
            "duration": 187040,
            "mvId": "",
            "format": "flac"
        }"#;
        let metadata = parse_metadata(&music(json)).unwrap();
        let track = metadata.track();
        assert_eq!(track.id, 2062898402);
        assert_eq!(track.artists[1], Artist { name: "Zak Abel".to_string(), id: 1053190 });
        assert_eq!(track.album_pic_doc_id, "109951169035717968");
        assert_eq!(track.mv_id, None);
        assert!(track.alias.is_empty());
        assert!(track.trans_names.is_empty());
        assert_eq!(metadata.audio_format(), AudioFormat::Flac);
    }

    #[test]
    fn test_artist_objects_and_null_lists() {
        let json = r#"{
            "musicId": 1,
            "musicName": "t",
            "artist": [{"name": "A", "id": 5}, {"name": "B"}],
            "alias": null,
            "transNames": ["译名"]
        }"#;
        let metadata = parse_metadata(&music(json)).unwrap();
        let track = metadata.track();
        assert_eq!(track.artist_names(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(track.artists[1].id, 0);
        assert!(track.alias.is_empty());
        assert_eq!(track.trans_names, vec!["译名".to_string()]);
        // No format field
        assert_eq!(metadata.audio_format(), AudioFormat::Mp3);
        assert_eq!(metadata.cover_url(), None);
    }

    #[test]
    fn test_parse_dj_program() {
        let json = format!(
            r#"{{
                "programId": "2065000000",
                "programName": "Evening Show",
                "djId": 42,
                "djName": "Host",
                "djAvatarUrl": "http://example.com/a.jpg",
                "createTime": 1700000000000,
                "brand": "Station",
                "serial": 12,
                "programBuyed": false,
                "radioId": 7,
                "radioName": "Night Radio",
                "radioCategory": "Music",
                "radioCategoryId": 2,
                "radioFeeType": 0,
                "radioBuyed": 1,
                "radioPrice": 0,
                "mainMusic": {}
            }}"#,
            GOLDEN_HOUR
        );
        let mut plaintext = DJ_PREFIX.to_vec();
        plaintext.extend_from_slice(json.as_bytes());

        let metadata = parse_metadata(&plaintext).unwrap();
        let program = match &metadata {
            Metadata::DjProgram(program) => program,
            other => panic!("unexpected variant {:?}", other),
        };
        assert_eq!(program.program_id, 2065000000);
        assert_eq!(program.dj_id, 42);
        assert!(!program.program_buyed);
        assert!(program.radio_buyed);
        assert_eq!(program.main_track.id, 1958557540);
        assert_eq!(
            program.created_at().unwrap().timestamp_millis(),
            1_700_000_000_000
        );

        let tags = metadata.tag_fields();
        assert_eq!(tags.title, "Evening Show");
        assert_eq!(tags.artists, vec!["Host".to_string()]);
        assert_eq!(tags.album, "Night Radio");
    }

    #[test]
    fn test_tag_fields_carry_comment() {
        let mut metadata = parse_metadata(&music(GOLDEN_HOUR)).unwrap();
        metadata.track_mut().set_comment("163 key(Don't modify):abc");
        let tags = metadata.tag_fields();
        assert_eq!(tags.title, "golden hour");
        assert_eq!(tags.artist_line(), "JVKE");
        assert_eq!(tags.comment.as_deref(), Some("163 key(Don't modify):abc"));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            parse_metadata(b"video:{}").unwrap_err(),
            NcmError::MalformedMetadata(_)
        ));
        assert!(matches!(
            parse_metadata(b"music:{not json").unwrap_err(),
            NcmError::MalformedMetadata(_)
        ));
        // Required title missing
        assert!(matches!(
            parse_metadata(b"music:{\"musicId\": 1}").unwrap_err(),
            NcmError::MalformedMetadata(_)
        ));
        // Non-numeric id
        assert!(matches!(
            parse_metadata(b"music:{\"musicId\": \"abc\", \"musicName\": \"x\"}").unwrap_err(),
            NcmError::MalformedMetadata(_)
        ));
    }

    #[test]
    fn test_decrypt_metadata_rejects_bad_base64() {
        assert!(matches!(
            decrypt_metadata(b"!!!not base64!!!").unwrap_err(),
            NcmError::MalformedMetadata(_)
        ));
    }

    #[test]
    fn test_comment_is_not_serialized() {
        let mut metadata = parse_metadata(&music(GOLDEN_HOUR)).unwrap();
        metadata.track_mut().set_comment("local note");
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["type"], "music_track");
        assert!(json.get("comment").is_none());
        assert_eq!(json["musicName"], "golden hour");
    }
}
