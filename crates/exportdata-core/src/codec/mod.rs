//! Export data codec: version dispatch, decoding and encoding.
//!
//! ## Section layout
//!
//! A section starts with a version tag: the byte `i` followed by a uvarint
//! version number. The body that follows is read strictly front to back:
//!
//! 1. string table (every later name is an index into it)
//! 2. target unit name
//! 3. file table, merged into the caller's [`PositionTable`] by file name
//! 4. imported units; each one is declared in the [`Namespace`] up front
//! 5. type table: named declarations, structural types, named definitions
//! 6. members of the target unit
//!
//! Named declarations come first and act as placeholders, so a struct can
//! point at a named type whose definition has not been read yet.
//!
//! ## Versions
//!
//! | version | positions              | alias members |
//! |---------|------------------------|---------------|
//! | 1       | file, line             | no            |
//! | 2       | file, line, column     | yes           |
//!
//! Only the current version is ever written.

mod decoder;
mod encoder;
mod wire;

use crate::error::{Error, Result};
use crate::model::{Namespace, PositionTable, Unit};
use bytes::Bytes;
use std::io::{Read, Write};
use tracing::debug;

/// First byte of every indexed-format section
pub const INDEXED_TAG: u8 = b'i';

/// Tag bytes of the retired non-indexed binary formats
pub const LEGACY_TAGS: &[u8] = b"cdv";

/// Supported wire-format versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    /// Indexed format, version 1
    V1,
    /// Indexed format, version 2 (current)
    V2,
}

impl FormatVersion {
    /// The version the encoder writes
    pub const CURRENT: FormatVersion = FormatVersion::V2;

    /// Version number as written after the tag byte
    pub fn number(self) -> u64 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
        }
    }

    /// Maps a version number to a supported version
    pub fn from_number(n: u64) -> Option<Self> {
        match n {
            1 => Some(FormatVersion::V1),
            2 => Some(FormatVersion::V2),
            _ => None,
        }
    }

    pub(crate) fn has_columns(self) -> bool {
        matches!(self, FormatVersion::V2)
    }

    pub(crate) fn has_aliases(self) -> bool {
        matches!(self, FormatVersion::V2)
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "indexed v{}", self.number())
    }
}

/// Reads the version tag at the start of a section.
///
/// Returns the version and the number of bytes the tag occupied. Unknown
/// tags are reported as [`Error::UnsupportedVersion`]; an empty or cut-off
/// tag is an [`Error::Format`].
pub fn detect(data: &[u8]) -> Result<(FormatVersion, usize)> {
    let mut r = wire::Reader::new(data);
    let tag = r.u8("version tag")?;

    if tag != INDEXED_TAG {
        if LEGACY_TAGS.contains(&tag) {
            debug!("retired export data format '{}'", tag.escape_ascii());
        }
        return Err(Error::unsupported_version(vec![tag]));
    }

    let number = r.uvarint("version number")?;
    match FormatVersion::from_number(number) {
        Some(version) => {
            debug!("detected export data format {}", version);
            Ok((version, r.offset() as usize))
        }
        None => {
            let mut raw = vec![tag];
            raw.extend_from_slice(number.to_string().as_bytes());
            Err(Error::unsupported_version(raw))
        }
    }
}

/// Decodes a section read from `reader` into `namespace` under `path`.
///
/// The reader may run past the end of the section; trailing bytes are
/// ignored. See [`decode_bytes`].
pub fn decode<'ns, R: Read>(
    mut reader: R,
    positions: &mut PositionTable,
    namespace: &'ns mut Namespace,
    path: &str,
) -> Result<&'ns Unit> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    decode_bytes(&data, positions, namespace, path)
}

/// Decodes an in-memory section into `namespace` under `path`.
///
/// Units referenced by the section are declared in the namespace (incomplete)
/// if they are missing, and named types already known there are reused so
/// identity is shared across decodes. On success the unit at `path` is
/// complete. On failure it is absent or incomplete, never complete.
///
/// It is a [`Error::Consistency`] error if `path` already holds a complete
/// unit.
pub fn decode_bytes<'ns>(
    data: &[u8],
    positions: &mut PositionTable,
    namespace: &'ns mut Namespace,
    path: &str,
) -> Result<&'ns Unit> {
    if namespace.unit(path).is_some_and(Unit::is_complete) {
        return Err(Error::consistency(
            path,
            "a complete unit is already present; refusing to decode over it",
        ));
    }

    let (version, body) = detect(data).map_err(|e| e.in_unit(path))?;
    decoder::Decoder::new(data, body, version, positions, namespace, path)
        .and_then(decoder::Decoder::run)
        .map_err(|e| e.in_unit(path))?;

    namespace
        .unit(path)
        .ok_or_else(|| Error::internal(format!("decoded unit '{path}' missing from namespace")))
}

/// Encodes the complete unit at `path` with the current format version.
///
/// Indices are assigned in first-seen order, so encoding the same graph
/// twice yields identical bytes.
pub fn encode(namespace: &Namespace, path: &str, positions: &PositionTable) -> Result<Bytes> {
    encoder::Encoder::new(namespace, path, positions, FormatVersion::CURRENT)?.run()
}

/// Encodes the unit at `path` and writes the section to `out`
pub fn write<W: Write>(
    mut out: W,
    namespace: &Namespace,
    path: &str,
    positions: &PositionTable,
) -> Result<()> {
    let data = encode(namespace, path, positions)?;
    out.write_all(&data)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn encode_with_version(
    namespace: &Namespace,
    path: &str,
    positions: &PositionTable,
    version: FormatVersion,
) -> Result<Bytes> {
    encoder::Encoder::new(namespace, path, positions, version)?.run()
}
