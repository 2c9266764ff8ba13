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


//! Synthetic container fixtures
//!
//! Builds containers the way a producer would: AES-ECB with PKCS7 for the
//! key and metadata layers, and a keystream computed here independently of
//! the crate for the audio payload.

#![allow(dead_code)]

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub const CORE_KEY: [u8; 16] = *b"hzHRAmso5kInbaxW";
pub const MODIFY_KEY: [u8; 16] = *b"#14ljk_!\\]&0U<'(";

/// Offset of the first key-section data byte (magic + gap + length)
pub const KEY_DATA_OFFSET: usize = 8 + 2 + 4;

pub const DEFAULT_SEED: &[u8] = b"123456789012345678901234567890E7fT49x7dof9OKCgg9cdvhEuezy3iZCL1nFvBFd1T4uSktAJKmwZXsijPbijliionVUXXg9plTbXEclAE9Lb";

pub const MUSIC_JSON: &str = r#"{"musicId":1859245776,"musicName":"Golden Hour","artist":[["JVKE",35006488]],"albumId":134804567,"album":"this is what ____ feels like (Vol. 1-4)","albumPicDocId":"109951167588573297","albumPic":"https://p3.music.126.net/cover.jpg","bitrate":320000,"mp3DocId":"5e2f1b3c","duration":209259,"mvId":0,"alias":[],"transNames":[],"format":"mp3"}"#;

pub const DJ_JSON: &str = r#"{"programId":2495214093,"programName":"Episode 12","djId":77,"djName":"Host","createTime":1650000000000,"radioName":"Late Night Radio","mainMusic":{"musicId":1967053372,"musicName":"Episode 12 audio","artist":[["Host",77]],"album":"","albumPic":"","bitrate":128000,"duration":1800000,"format":"mp3"}}"#;

/// A fake flac payload of `len` bytes
pub fn flac_payload(len: usize) -> Vec<u8> {
    let mut audio = b"fLaC\x00\x00\x00\x22".to_vec();
    audio.extend((0..len.saturating_sub(audio.len())).map(|i| (i * 7 % 251) as u8));
    audio.truncate(len);
    audio
}

/// A fake mp3 payload (ID3 header) of `len` bytes
pub fn mp3_payload(len: usize) -> Vec<u8> {
    let mut audio = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    audio.extend((0..len.saturating_sub(audio.len())).map(|i| (i * 13 % 256) as u8));
    audio.truncate(len);
    audio
}

pub const PNG_COVER: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR";

fn encrypt_ecb(key: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let pad = 16 - plaintext.len() % 16;
    let mut data = plaintext.to_vec();
    data.extend(std::iter::repeat(pad as u8).take(pad));

    let cipher = Aes128::new(key.into());
    for chunk in data.chunks_exact_mut(16) {
        cipher.encrypt_block(Block::from_mut_slice(chunk));
    }
    data
}

/// Keystream for one window, straight from the key schedule
pub fn reference_keystream(seed: &[u8]) -> [u8; 256] {
    let mut table: Vec<u8> = (0..=255u8).collect();
    let mut last = 0u8;
    for i in 0..256 {
        let key = if seed.is_empty() { 0 } else { seed[i % seed.len()] };
        let c = table[i].wrapping_add(last).wrapping_add(key);
        table.swap(i, c as usize);
        last = c;
    }

    let mut stream = [0u8; 256];
    for (i, k) in stream.iter_mut().enumerate() {
        let j = (i + 1) & 0xFF;
        let a = table[j] as usize;
        let b = table[(a + j) & 0xFF] as usize;
        *k = table[(a + b) & 0xFF];
    }
    stream
}

/// Encrypt (or decrypt) audio with the keystream, restarting every 4096 bytes
pub fn transform_audio(seed: &[u8], audio: &[u8]) -> Vec<u8> {
    let stream = reference_keystream(seed);
    audio
        .chunks(0x1000)
        .flat_map(|window| {
            window
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ stream[i & 0xFF])
                .collect::<Vec<_>>()
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    seed: Vec<u8>,
    /// Plaintext metadata including its "music:"/"dj:" prefix; None = empty section
    metadata: Option<Vec<u8>>,
    cover: Vec<u8>,
    audio: Vec<u8>,
    key_trailing: Vec<u8>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED.to_vec(),
            metadata: Some(format!("music:{}", MUSIC_JSON).into_bytes()),
            cover: PNG_COVER.to_vec(),
            audio: mp3_payload(10_000),
            key_trailing: Vec::new(),
        }
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, seed: &[u8]) -> Self {
        self.seed = seed.to_vec();
        self
    }

    pub fn music(mut self, json: &str) -> Self {
        self.metadata = Some(format!("music:{}", json).into_bytes());
        self
    }

    pub fn dj(mut self, json: &str) -> Self {
        self.metadata = Some(format!("dj:{}", json).into_bytes());
        self
    }

    pub fn raw_metadata(mut self, plaintext: &[u8]) -> Self {
        self.metadata = Some(plaintext.to_vec());
        self
    }

    pub fn no_metadata(mut self) -> Self {
        self.metadata = None;
        self
    }

    pub fn cover(mut self, cover: &[u8]) -> Self {
        self.cover = cover.to_vec();
        self
    }

    pub fn audio(mut self, audio: Vec<u8>) -> Self {
        self.audio = audio;
        self
    }

    /// Stray bytes after the last AES block of the key section
    pub fn key_trailing(mut self, bytes: &[u8]) -> Self {
        self.key_trailing = bytes.to_vec();
        self
    }

    pub fn key_section(&self) -> Vec<u8> {
        let mut plaintext = b"neteasecloudmusic".to_vec();
        plaintext.extend_from_slice(&self.seed);
        let mut data = encrypt_ecb(&CORE_KEY, &plaintext);
        data.extend_from_slice(&self.key_trailing);
        data.iter().map(|b| b ^ 0x64).collect()
    }

    pub fn metadata_section(&self) -> Vec<u8> {
        let plaintext = match &self.metadata {
            Some(plaintext) => plaintext,
            None => return Vec::new(),
        };
        let mut line = b"163 key(Don't modify):".to_vec();
        line.extend(BASE64.encode(encrypt_ecb(&MODIFY_KEY, plaintext)).into_bytes());
        line.iter().map(|b| b ^ 0x63).collect()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = b"CTENFDAM".to_vec();
        out.extend_from_slice(&[0x01, 0x70]);

        let key = self.key_section();
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(&key);

        let metadata = self.metadata_section();
        out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
        out.extend_from_slice(&metadata);

        // 5 unused bytes + CRC
        out.extend_from_slice(&[0u8; 9]);

        out.extend_from_slice(&(self.cover.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.cover);

        out.extend(transform_audio(&self.seed, &self.audio));
        out
    }

    /// The plaintext audio this container carries
    pub fn plain_audio(&self) -> &[u8] {
        &self.audio
    }
}
