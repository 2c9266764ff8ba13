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


//! File layer around the decoder
//!
//! Discovery of containers on disk, output naming, and conversion of single
//! files or whole batches.

pub mod converter;
pub mod paths;
pub mod scanner;

pub use converter::{
    apply_tags, convert_file, decode_to_file, BatchConverter, BatchItem, ConvertConfig,
    ConvertOutcome,
};
pub use paths::{sanitize_component, PathBuilder, PathTemplate};
pub use scanner::{has_container_extension, is_container_file, scan_for_containers};
