//! # exportdata-core
//!
//! Locating, decoding and encoding compiler export data: the binary summary
//! of a compiled unit's public declarations and types.
//!
//! This crate provides:
//! - Finding the container file for an import path on a search path
//! - Extracting the export data section from archive and object files
//! - Decoding a section into a caller-owned [`Namespace`], and the inverse
//!   encoding of a complete unit
//!
//! ## Architecture
//!
//! - [`locator`]: import path to container file, with vendoring and aliases
//! - [`section`]: container framing and the section markers
//! - [`codec`]: version dispatch, decoder and encoder
//! - [`model`]: units, members and the arena-backed type graph
//! - [`importer`]: memoizing loader running the whole pipeline
//! - [`describe`]: visitors and a declaration listing for diagnostics
//! - [`error`]: error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use exportdata_core::{codec, open_section, Namespace, PositionTable, SearchPath};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let search = SearchPath::new().with_root("/usr/lib/exportdata");
//! let Some(found) = search.find("encoding/json", None) else {
//!     return Ok(());
//! };
//!
//! let section = open_section(BufReader::new(File::open(&found.file)?))?;
//! let mut namespace = Namespace::new();
//! let mut positions = PositionTable::new();
//! let unit = codec::decode(section, &mut positions, &mut namespace, &found.canonical_path)?;
//! println!("{} has {} members", unit.path(), unit.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Concurrency
//!
//! Nothing here locks. A namespace is mutated through `&mut`, so one decode
//! at a time per namespace; share one across threads behind your own mutex.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod codec;
pub mod describe;
pub mod error;
pub mod importer;
pub mod locator;
pub mod model;
pub mod section;

// Re-export primary types for convenience
pub use codec::{decode, encode, FormatVersion};
pub use describe::{PrinterConfig, StatsVisitor, TypeFormatter, UnitPrinter, UnitVisitor};
pub use error::{Error, Result};
pub use importer::Importer;
pub use locator::{Found, SearchPath};
pub use model::{Member, MemberKind, Namespace, PositionTable, TypeArena, TypeId, TypeKind, Unit};
pub use section::{open_section, Section, SectionConfig, SectionKind, SectionLocator};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
