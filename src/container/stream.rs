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


//! Streaming decode of the audio payload
//!
//! Reads fixed 4096-byte windows, transforms each with the keybox (position
//! counter restarting at every window) and writes it out immediately. The
//! first bytes of the first window are kept as a header preview so callers
//! can inspect the frame header; this module does not interpret them.

use crate::container::section::fill_window;
use crate::crypto::{KeyBox, STREAM_WINDOW_SIZE};
use crate::error::{NcmError, Result};
use std::io::{Read, Write};
use tracing::{debug, trace};

/// Length of the header preview
pub const HEADER_PREVIEW_LEN: usize = 11;

/// Outcome of a streaming decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /// First decrypted bytes (up to 11, fewer for a tiny payload)
    pub header_preview: Vec<u8>,
    /// Total decrypted bytes written to the sink
    pub bytes_written: u64,
}

/// Decrypt `input` into `output` window by window
///
/// # Errors
/// - SourceReadError if `input` fails (e.g. the caller closed it to cancel)
/// - SinkWriteError if `output` fails
pub fn decode_stream<R: Read, W: Write>(
    keybox: &KeyBox,
    mut input: R,
    mut output: W,
) -> Result<StreamSummary> {
    let mut window = [0u8; STREAM_WINDOW_SIZE];
    let mut header_preview = Vec::with_capacity(HEADER_PREVIEW_LEN);
    let mut bytes_written = 0u64;

    loop {
        let n = fill_window(&mut input, &mut window)?;
        if n == 0 {
            break;
        }

        keybox.apply_window(&mut window[..n]);
        if bytes_written == 0 {
            header_preview.extend_from_slice(&window[..n.min(HEADER_PREVIEW_LEN)]);
        }
        output
            .write_all(&window[..n])
            .map_err(NcmError::SinkWriteError)?;
        bytes_written += n as u64;
        trace!(window_len = n, total = bytes_written, "audio window streamed");

        if n < window.len() {
            break;
        }
    }

    output.flush().map_err(NcmError::SinkWriteError)?;
    debug!(bytes_written, "audio payload streamed");

    Ok(StreamSummary {
        header_preview,
        bytes_written,
    })
}
