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


//! Container parsing and audio decoding
//!
//! - `section` - fail-closed length-prefixed reads
//! - `parser` - the section state machine, `NcmReader`, `Container`
//! - `stream` - bounded-memory streaming decode of the audio payload

pub mod parser;
pub mod section;
pub mod stream;

pub use parser::{decode, Container, ContainerHeader, ContainerParts, NcmReader, MAGIC};
pub use section::SectionReader;
pub use stream::{decode_stream, StreamSummary, HEADER_PREVIEW_LEN};
