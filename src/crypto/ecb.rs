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


//! AES-128-ECB decryption with PKCS7 unpadding
//!
//! # Format Details
//! - Cipher: AES-128, raw ECB (every 16-byte block decrypted independently)
//! - Padding: PKCS7 on the final block, pad byte in `1..=16`
//! - Quirk: ciphertext that is not block aligned is truncated to the nearest
//!   lower multiple of 16. Some producers append stray bytes after the last
//!   block; they carry no data and are dropped instead of rejected.
//!
//! Two entry points share these rules:
//! - [`decrypt_ecb`] for a ciphertext already in memory
//! - [`EcbDecryptor`] for ciphertext arriving in arbitrary pieces; it only
//!   decrypts fully available blocks and holds back the newest block until
//!   [`EcbDecryptor::finish`] knows it is the final one

use crate::error::{NcmError, Result};
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::{Aes128, Block};
use tracing::warn;

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Decrypt `ciphertext` with AES-128-ECB and strip PKCS7 padding
///
/// # Errors
/// - InvalidPadding if the padding is malformed or no complete block exists
///
/// # Example
/// ```
/// use ncm_core::crypto::decrypt_ecb;
///
/// // Shorter than one block: nothing survives truncation, so the padding
/// // check has nothing to look at.
/// assert!(decrypt_ecb(&[0u8; 16], &[1, 2, 3]).is_err());
/// ```
pub fn decrypt_ecb(key: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let aligned = ciphertext.len() - ciphertext.len() % AES_BLOCK_SIZE;
    if aligned != ciphertext.len() {
        warn!(
            dropped = ciphertext.len() - aligned,
            "discarding trailing partial AES block"
        );
    }

    let cipher = Aes128::new(key.into());
    let mut plaintext = ciphertext[..aligned].to_vec();
    for chunk in plaintext.chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.decrypt_block(Block::from_mut_slice(chunk));
    }

    strip_pkcs7(&mut plaintext)?;
    Ok(plaintext)
}

/// Remove PKCS7 padding in place
///
/// The last byte names the pad length `n`; it must be in `1..=16` and the
/// last `n` bytes must all equal `n`.
pub fn strip_pkcs7(data: &mut Vec<u8>) -> Result<()> {
    let pad = match data.last() {
        Some(&pad) => pad as usize,
        None => return Err(NcmError::invalid_padding("no complete AES block to unpad")),
    };

    if pad == 0 || pad > AES_BLOCK_SIZE || pad > data.len() {
        return Err(NcmError::invalid_padding(format!(
            "pad length {} outside 1..={}",
            pad, AES_BLOCK_SIZE
        )));
    }

    let body_len = data.len() - pad;
    if data[body_len..].iter().any(|&b| b as usize != pad) {
        return Err(NcmError::invalid_padding(format!(
            "pad bytes do not all equal {}",
            pad
        )));
    }

    data.truncate(body_len);
    Ok(())
}

/// Incremental AES-128-ECB decryptor
///
/// Feed ciphertext with [`update`](Self::update) in pieces of any size and
/// collect plaintext as it becomes final. The newest complete block is held
/// back because only the last block carries padding.
pub struct EcbDecryptor {
    cipher: Aes128,
    /// Ciphertext bytes not yet forming a full block
    pending: Vec<u8>,
    /// Most recent decrypted block, released once a later block arrives
    held: Option<Block>,
}

impl EcbDecryptor {
    pub fn new(key: &[u8; 16]) -> Self {
        Self {
            cipher: Aes128::new(key.into()),
            pending: Vec::with_capacity(AES_BLOCK_SIZE),
            held: None,
        }
    }

    /// Consume a piece of ciphertext, returning plaintext known not to be final
    pub fn update(&mut self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len() + AES_BLOCK_SIZE);
        let mut input = input;

        // Complete a partially buffered block first
        if !self.pending.is_empty() {
            let need = AES_BLOCK_SIZE - self.pending.len();
            let take = need.min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];

            if self.pending.len() == AES_BLOCK_SIZE {
                let block = Block::clone_from_slice(&self.pending);
                self.pending.clear();
                self.push_block(block, &mut out);
            }
        }

        let mut chunks = input.chunks_exact(AES_BLOCK_SIZE);
        for chunk in &mut chunks {
            self.push_block(Block::clone_from_slice(chunk), &mut out);
        }
        self.pending.extend_from_slice(chunks.remainder());

        out
    }

    /// Decrypt the held final block and strip its padding
    ///
    /// Bytes that never formed a complete block are discarded (see the module
    /// notes on truncation).
    ///
    /// # Errors
    /// - InvalidPadding if no block was ever completed or the padding is bad
    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.pending.is_empty() {
            warn!(
                dropped = self.pending.len(),
                "discarding trailing partial AES block"
            );
        }

        let mut last = match self.held {
            Some(block) => block.to_vec(),
            None => return Err(NcmError::invalid_padding("no complete AES block to unpad")),
        };
        strip_pkcs7(&mut last)?;
        Ok(last)
    }

    fn push_block(&mut self, mut block: Block, out: &mut Vec<u8>) {
        self.cipher.decrypt_block(&mut block);
        if let Some(previous) = self.held.replace(block) {
            out.extend_from_slice(&previous);
        }
    }
}
