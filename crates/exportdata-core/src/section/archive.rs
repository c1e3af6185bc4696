//! `ar` archive member headers.
//!
//! ```text
//! name[16] mtime[12] uid[6] gid[6] mode[8] size[10] "`\n"
//! ```
//!
//! All fields are space-padded ASCII. Member data is padded to an even
//! length.

use crate::error::{Error, Result};
use std::io::{self, Write};

/// Length of a member header
pub(crate) const HEADER_LEN: usize = 60;

const NAME: std::ops::Range<usize> = 0..16;
const SIZE: std::ops::Range<usize> = 48..58;
const FMAG: std::ops::Range<usize> = 58..60;
const FMAG_BYTES: &[u8] = b"`\n";

/// A parsed member header
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MemberHeader {
    pub(crate) name: String,
    pub(crate) size: u64,
}

impl MemberHeader {
    /// Parses a header found at byte `offset` of the container
    pub(crate) fn parse(raw: &[u8; HEADER_LEN], offset: u64) -> Result<Self> {
        if &raw[FMAG] != FMAG_BYTES {
            return Err(Error::format(offset, "archive member header has a bad trailer"));
        }

        let name = std::str::from_utf8(&raw[NAME])
            .map_err(|_| Error::format(offset, "archive member name is not ASCII"))?
            .trim_end_matches(' ');
        // GNU ar terminates names with '/'
        let name = name.strip_suffix('/').filter(|n| !n.is_empty()).unwrap_or(name);

        let size = std::str::from_utf8(&raw[SIZE])
            .ok()
            .map(|s| s.trim_end_matches(' '))
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::format(offset + SIZE.start as u64, "archive member size is not a number"))?;

        Ok(Self {
            name: name.to_string(),
            size,
        })
    }

    /// Number of padding bytes following the member data
    pub(crate) fn padding(&self) -> u64 {
        self.size & 1
    }
}

/// Writes a member header with zeroed metadata
pub(crate) fn write_header<W: Write>(out: &mut W, name: &str, size: u64) -> io::Result<()> {
    write!(
        out,
        "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
        name, 0, 0, 0, 644, size
    )
}
