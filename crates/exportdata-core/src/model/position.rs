//! Source positions shared across decode sessions.

use std::collections::HashMap;
use std::fmt;

/// Identity of a source file within a [`PositionTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

impl FileId {
    /// Returns the table index of this file
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An absolute source position: file, 1-based line and column.
///
/// A column of 0 means the producer did not record one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// File the position refers to
    pub file: FileId,
    /// Line number
    pub line: u32,
    /// Column number, 0 if unknown
    pub column: u32,
}

impl Position {
    /// Creates a new position
    pub fn new(file: FileId, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }
}

/// Maps file names to stable [`FileId`]s.
///
/// Files are merged by name, so several units decoded into the same table
/// share one entry per file no matter which local index each stream used.
#[derive(Debug, Clone, Default)]
pub struct PositionTable {
    files: Vec<String>,
    by_name: HashMap<String, FileId>,
}

impl PositionTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, registering it on first use
    pub fn add_file(&mut self, name: &str) -> FileId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = FileId(self.files.len() as u32);
        self.files.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Looks up a file without registering it
    pub fn file_id(&self, name: &str) -> Option<FileId> {
        self.by_name.get(name).copied()
    }

    /// Returns the name of a registered file
    pub fn file_name(&self, id: FileId) -> Option<&str> {
        self.files.get(id.index()).map(String::as_str)
    }

    /// Number of registered files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no file has been registered
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Creates a position in `name`, registering the file if needed
    pub fn position(&mut self, name: &str, line: u32, column: u32) -> Position {
        let file = self.add_file(name);
        Position::new(file, line, column)
    }

    /// Returns a `file:line:column` rendering of `pos`
    pub fn display(&self, pos: Position) -> DisplayPosition<'_> {
        DisplayPosition { table: self, pos }
    }
}

/// Helper returned by [`PositionTable::display`]
pub struct DisplayPosition<'a> {
    table: &'a PositionTable,
    pos: Position,
}

impl fmt::Display for DisplayPosition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.table.file_name(self.pos.file).unwrap_or("?");
        write!(f, "{}:{}", name, self.pos.line)?;
        if self.pos.column > 0 {
            write!(f, ":{}", self.pos.column)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_merge_by_name() {
        let mut table = PositionTable::new();
        let a = table.add_file("a.go");
        let b = table.add_file("b.go");
        assert_ne!(a, b);
        assert_eq!(table.add_file("a.go"), a);
        assert_eq!(table.len(), 2);
        assert_eq!(table.file_name(b), Some("b.go"));
        assert_eq!(table.file_id("c.go"), None);
    }

    #[test]
    fn test_display() {
        let mut table = PositionTable::new();
        let pos = table.position("x/y.go", 12, 5);
        assert_eq!(table.display(pos).to_string(), "x/y.go:12:5");
        let pos = table.position("x/y.go", 3, 0);
        assert_eq!(table.display(pos).to_string(), "x/y.go:3");
    }
}
