//! Locating the export data section inside a container file.
//!
//! Two container forms are understood:
//!
//! - **Archive**: an `ar` archive whose `__.PKGDEF` member holds the export
//!   data. The member size bounds the section.
//! - **Object**: a file starting with a `go object ` header line. The
//!   section runs to the end of the stream.
//!
//! In both, header lines are skipped until the `$$B` marker line; the
//! section starts right after it. The extractor never looks for the end
//! marker: the decoder stops where the encoded data stops.
//!
//! ```no_run
//! use exportdata_core::section::open_section;
//! use std::io::{BufReader, Read};
//!
//! let file = std::fs::File::open("fmt.a")?;
//! let mut section = open_section(BufReader::new(file))?;
//! let mut data = Vec::new();
//! section.read_to_end(&mut data)?;
//! # Ok::<(), exportdata_core::Error>(())
//! ```

mod archive;

use crate::error::{Error, Result};
use std::io::{self, BufRead, Read, Write};
use tracing::{debug, trace};

/// Magic bytes of an `ar` archive
pub const ARCHIVE_MAGIC: &[u8] = b"!<arch>\n";

/// Prefix of the first line of an object file
pub const OBJECT_HEADER_PREFIX: &[u8] = b"go object ";

/// Archive member carrying the export data
pub const SECTION_MEMBER: &str = "__.PKGDEF";

/// Marker line introducing binary export data
pub const BINARY_MARKER: &[u8] = b"$$B\n";

/// Marker line of retired textual export data, also used as end marker
pub const TEXT_MARKER: &[u8] = b"$$\n";

/// Configuration for the section extractor
#[derive(Debug, Clone)]
pub struct SectionConfig {
    /// Maximum number of header bytes read while looking for the marker.
    /// Data of skipped archive members does not count.
    pub scan_window: u64,
    /// Maximum number of archive members examined
    pub max_archive_members: usize,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            scan_window: 64 * 1024,
            max_archive_members: 16,
        }
    }
}

impl SectionConfig {
    /// Creates a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scan window
    pub fn scan_window(mut self, bytes: u64) -> Self {
        self.scan_window = bytes;
        self
    }

    /// Sets the archive member limit
    pub fn max_archive_members(mut self, members: usize) -> Self {
        self.max_archive_members = members;
        self
    }
}

/// How far a located section extends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Section length known from the container (archive member)
    Bounded {
        /// Bytes from the section start to the end of the member
        len: u64,
    },
    /// Section runs to the end of the stream (object file)
    Open,
}

/// A reader positioned at the start of an export data section.
///
/// It may yield bytes past the logical end of the section, such as the
/// end marker or object code that follows.
#[derive(Debug)]
pub struct Section<R> {
    inner: io::Take<R>,
    kind: SectionKind,
    offset: u64,
}

impl<R: Read> Section<R> {
    fn new(reader: R, kind: SectionKind, offset: u64) -> Self {
        let limit = match kind {
            SectionKind::Bounded { len } => len,
            SectionKind::Open => u64::MAX,
        };
        Self {
            inner: reader.take(limit),
            kind,
            offset,
        }
    }

    /// Whether the section is bounded by the container
    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// Byte offset of the section start within the container
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the underlying reader
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R: Read> Read for Section<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Finds export data sections in container streams
#[derive(Debug, Clone, Default)]
pub struct SectionLocator {
    config: SectionConfig,
}

impl SectionLocator {
    /// Creates a locator with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a locator with custom configuration
    pub fn with_config(config: SectionConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration
    pub fn config(&self) -> &SectionConfig {
        &self.config
    }

    /// Scans `reader` for the export data section.
    ///
    /// Fails with [`Error::Format`] if the stream is neither container form
    /// or the marker is not found within the scan window, and with
    /// [`Error::UnsupportedVersion`] if the container holds textual export
    /// data.
    pub fn locate<R: BufRead>(&self, mut reader: R) -> Result<Section<R>> {
        let mut scan = Scan {
            offset: 0,
            budget: self.config.scan_window,
        };

        let mut first = Vec::new();
        scan.read_line(&mut reader, &mut first, u64::MAX)
            .map_err(|e| match e {
                Error::Io(_) => e,
                _ => Error::format(0, "not an archive or object file"),
            })?;

        if first == ARCHIVE_MAGIC {
            let member_len = self.find_member(&mut reader, &mut scan)?;
            let header_len = scan.find_marker(&mut reader, member_len)?;
            let offset = scan.offset;
            debug!("found bounded export data section at offset {}", offset);
            return Ok(Section::new(
                reader,
                SectionKind::Bounded {
                    len: member_len - header_len,
                },
                offset,
            ));
        }

        if first.starts_with(OBJECT_HEADER_PREFIX) {
            scan.find_marker(&mut reader, u64::MAX)?;
            let offset = scan.offset;
            debug!("found open export data section at offset {}", offset);
            return Ok(Section::new(reader, SectionKind::Open, offset));
        }

        Err(Error::format(0, "not an archive or object file"))
    }

    /// Walks archive members up to the section member and returns its size
    fn find_member<R: BufRead>(&self, reader: &mut R, scan: &mut Scan) -> Result<u64> {
        for index in 0..self.config.max_archive_members {
            let header_offset = scan.offset;
            let mut raw = [0u8; archive::HEADER_LEN];
            scan.read_exact(reader, &mut raw, "archive member header")?;
            let header = archive::MemberHeader::parse(&raw, header_offset)?;
            trace!(
                "archive member {} '{}' ({} bytes) at offset {}",
                index,
                header.name,
                header.size,
                header_offset
            );

            if header.name == SECTION_MEMBER {
                return Ok(header.size);
            }
            scan.skip(reader, header.size + header.padding())?;
        }

        Err(Error::format(
            scan.offset,
            format!(
                "no {SECTION_MEMBER} member among the first {} archive members",
                self.config.max_archive_members
            ),
        ))
    }
}

/// Scans `reader` for an export data section with default configuration
pub fn open_section<R: BufRead>(reader: R) -> Result<Section<R>> {
    SectionLocator::new().locate(reader)
}

/// Header scanning state: absolute offset plus the remaining scan window
struct Scan {
    offset: u64,
    budget: u64,
}

impl Scan {
    fn read_exact<R: Read>(&mut self, reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
        let n = buf.len() as u64;
        if n > self.budget {
            return Err(self.window_exhausted());
        }
        reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::format(self.offset, format!("unexpected end of file reading {what}"))
            }
            _ => Error::Io(e),
        })?;
        self.offset += n;
        self.budget -= n;
        Ok(())
    }

    /// Skips member data; it does not count against the scan window
    fn skip<R: Read>(&mut self, reader: &mut R, n: u64) -> Result<()> {
        let skipped = io::copy(&mut reader.by_ref().take(n), &mut io::sink())?;
        if skipped != n {
            return Err(Error::format(
                self.offset + skipped,
                "archive member extends past end of file",
            ));
        }
        self.offset += n;
        Ok(())
    }

    /// Reads one newline-terminated line of at most `limit` bytes
    fn read_line<R: BufRead>(&mut self, reader: &mut R, line: &mut Vec<u8>, limit: u64) -> Result<()> {
        let line_offset = self.offset;
        let window_bound = self.budget <= limit;
        let max = self.budget.min(limit);

        line.clear();
        let n = reader.by_ref().take(max).read_until(b'\n', line)? as u64;
        self.offset += n;
        self.budget -= n;

        if line.last() == Some(&b'\n') {
            Ok(())
        } else if n < max {
            Err(Error::format(line_offset, "no export data marker before end of file"))
        } else if window_bound {
            Err(self.window_exhausted())
        } else {
            Err(Error::format(
                line_offset,
                "section member ends before the export data marker",
            ))
        }
    }

    /// Reads header lines until the binary marker, never reading more than
    /// `limit` bytes. Returns the number of bytes read, marker included.
    fn find_marker<R: BufRead>(&mut self, reader: &mut R, limit: u64) -> Result<u64> {
        let start = self.offset;
        let mut line = Vec::new();

        loop {
            let line_offset = self.offset;
            self.read_line(reader, &mut line, limit - (line_offset - start))?;

            if line == BINARY_MARKER {
                trace!("binary marker at offset {}", line_offset);
                return Ok(self.offset - start);
            }
            if line == TEXT_MARKER {
                return Err(Error::unsupported_version(b"$$".to_vec()));
            }
        }
    }

    fn window_exhausted(&self) -> Error {
        Error::format(self.offset, "no export data marker within the scan window")
    }
}

/// Writes `section` framed as an object file.
///
/// `header` follows the `go object ` prefix on the first line.
pub fn write_object<W: Write>(mut out: W, header: &str, section: &[u8]) -> Result<()> {
    out.write_all(&object_payload(header, section))?;
    Ok(())
}

/// Writes `section` framed as an archive with a single section member
pub fn write_archive<W: Write>(mut out: W, header: &str, section: &[u8]) -> Result<()> {
    let payload = object_payload(header, section);
    out.write_all(ARCHIVE_MAGIC)?;
    archive::write_header(&mut out, SECTION_MEMBER, payload.len() as u64)?;
    out.write_all(&payload)?;
    if payload.len() % 2 == 1 {
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn object_payload(header: &str, section: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(section.len() + header.len() + 32);
    payload.extend_from_slice(OBJECT_HEADER_PREFIX);
    payload.extend_from_slice(header.as_bytes());
    payload.extend_from_slice(b"\n\n");
    payload.extend_from_slice(BINARY_MARKER);
    payload.extend_from_slice(section);
    payload.push(b'\n');
    payload.extend_from_slice(TEXT_MARKER);
    payload
}
