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


//! Keybox stream cipher for the audio payload
//!
//! # Key Schedule
//! An RC4-style schedule over the recovered seed:
//! 1. `T[i] = i` for all 256 entries
//! 2. for each `i`: `c = T[i] + last + seed[i % seed.len()]` (mod 256),
//!    swap `T[i]` and `T[c]`, `last = c`
//!
//! # Stream Transform
//! For the byte at window-relative position `i`:
//! `j = (i + 1) & 0xFF`, `out[i] = in[i] ^ T[(T[j] + T[(T[j] + j) & 0xFF]) & 0xFF]`
//!
//! Unlike RC4 the table is never mutated after the schedule, so the keystream
//! only depends on `i mod 256`. The position counter restarts at zero for
//! every window; because both window sizes used by the format (4096 for
//! streaming, 32768 for whole-file decode) are multiples of 256, the two paths
//! produce identical output as long as every window except the last is full.

use std::fmt;

/// Window size of the streaming decode path
pub const STREAM_WINDOW_SIZE: usize = 0x1000;

/// Window size of the whole-file decode path
pub const WHOLE_FILE_WINDOW_SIZE: usize = 0x8000;

/// 256-entry permutation derived once per container
///
/// Immutable after construction. The 256-byte keystream is precomputed
/// alongside the table since it is all the transform ever reads.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBox {
    table: [u8; 256],
    keystream: [u8; 256],
}

/// Build the keybox from seed bytes
///
/// An empty seed behaves as a single zero byte.
pub fn build_keybox(seed: &[u8]) -> KeyBox {
    KeyBox::new(seed)
}

impl KeyBox {
    pub fn new(seed: &[u8]) -> Self {
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }

        let mut last: u8 = 0;
        let mut key_offset = 0usize;
        for i in 0..256 {
            let seed_byte = if seed.is_empty() { 0 } else { seed[key_offset] };
            let c = table[i].wrapping_add(last).wrapping_add(seed_byte);
            key_offset += 1;
            if key_offset >= seed.len() {
                key_offset = 0;
            }
            table.swap(i, c as usize);
            last = c;
        }

        let mut keystream = [0u8; 256];
        for (i, k) in keystream.iter_mut().enumerate() {
            let j = (i + 1) & 0xFF;
            let bj = table[j] as usize;
            *k = table[(bj + table[(bj + j) & 0xFF] as usize) & 0xFF];
        }

        Self { table, keystream }
    }

    /// The permutation table
    pub fn table(&self) -> &[u8; 256] {
        &self.table
    }

    /// Keystream byte for window-relative position `i`
    #[inline]
    pub fn keystream_byte(&self, i: usize) -> u8 {
        self.keystream[i & 0xFF]
    }

    /// Transform one window in place, position counter starting at zero
    pub fn apply_window(&self, window: &mut [u8]) {
        for (i, byte) in window.iter_mut().enumerate() {
            *byte ^= self.keystream[i & 0xFF];
        }
    }

    /// Transform a whole buffer as consecutive windows of `window_size`
    ///
    /// # Panics
    /// Panics if `window_size` is zero.
    pub fn apply_windows(&self, data: &mut [u8], window_size: usize) {
        assert!(window_size > 0, "window size must be positive");
        for window in data.chunks_mut(window_size) {
            self.apply_window(window);
        }
    }
}

// Key material stays out of logs and panic messages.
impl fmt::Debug for KeyBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBox").finish_non_exhaustive()
    }
}
