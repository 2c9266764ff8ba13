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


//! Cryptographic primitives of the NCM container
//!
//! # Layers
//! - **AES-128-ECB** (`ecb`): protects the key section and the metadata
//!   section. Raw ECB, no IV, PKCS7 padding. Both keys are fixed constants of
//!   the format.
//! - **Keybox stream cipher** (`keybox`): an RC4-style key schedule builds a
//!   256-byte permutation from the recovered seed; the audio payload is XORed
//!   against a keystream derived from it.
//!
//! Neither layer holds secrets of the user. Nothing in here is configurable.

pub mod ecb;
pub mod keybox;

pub use ecb::{decrypt_ecb, strip_pkcs7, EcbDecryptor, AES_BLOCK_SIZE};
pub use keybox::{
    build_keybox, KeyBox, STREAM_WINDOW_SIZE, WHOLE_FILE_WINDOW_SIZE,
};
