//! Memoizing loader tying the locator, section extractor and decoder
//! together.

use crate::codec;
use crate::error::{Error, Result};
use crate::locator::SearchPath;
use crate::model::{Namespace, PositionTable, Unit};
use crate::section::{SectionConfig, SectionLocator};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

/// Loads units from container files into one namespace.
///
/// Each import path is decoded at most once; later imports of a complete
/// unit return it without touching the file system.
#[derive(Debug, Default)]
pub struct Importer {
    search: SearchPath,
    sections: SectionLocator,
    namespace: Namespace,
    positions: PositionTable,
}

impl Importer {
    /// Creates an importer over `search` with an empty namespace
    pub fn new(search: SearchPath) -> Self {
        Self {
            search,
            ..Self::default()
        }
    }

    /// Sets the section extractor configuration
    pub fn with_section_config(mut self, config: SectionConfig) -> Self {
        self.sections = SectionLocator::with_config(config);
        self
    }

    /// Imports `import_path` as seen from `origin_dir`.
    ///
    /// Fails with [`Error::NotFound`] when no artifact exists.
    pub fn import(&mut self, import_path: &str, origin_dir: Option<&Path>) -> Result<&Unit> {
        let found = self
            .search
            .find(import_path, origin_dir)
            .ok_or_else(|| Error::not_found(import_path))?;

        if self
            .namespace
            .unit(&found.canonical_path)
            .is_some_and(Unit::is_complete)
        {
            debug!("'{}' already imported", found.canonical_path);
            return self.complete_unit(&found.canonical_path);
        }

        self.load(&found.file, &found.canonical_path)
    }

    /// Decodes the container `file` as the unit `path`, unless `path` is
    /// already complete.
    pub fn import_file(&mut self, file: impl AsRef<Path>, path: &str) -> Result<&Unit> {
        if self.namespace.unit(path).is_some_and(Unit::is_complete) {
            return self.complete_unit(path);
        }
        self.load(file.as_ref(), path)
    }

    fn load(&mut self, file: &Path, path: &str) -> Result<&Unit> {
        info!("importing '{}' from {}", path, file.display());
        let reader = File::open(file).map_err(|e| Error::file_read(file, e))?;
        let section = self
            .sections
            .locate(BufReader::new(reader))
            .map_err(|e| e.in_unit(path))?;
        codec::decode(section, &mut self.positions, &mut self.namespace, path)
    }

    fn complete_unit(&self, path: &str) -> Result<&Unit> {
        self.namespace
            .unit(path)
            .ok_or_else(|| Error::internal(format!("unit '{path}' vanished from namespace")))
    }

    /// Returns the search path
    pub fn search_path(&self) -> &SearchPath {
        &self.search
    }

    /// Returns the namespace of everything imported so far
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the shared position table
    pub fn positions(&self) -> &PositionTable {
        &self.positions
    }

    /// Consumes the importer, returning the namespace and position table
    pub fn into_parts(self) -> (Namespace, PositionTable) {
        (self.namespace, self.positions)
    }
}
