//! Source positions and the line map produced by the preprocessor.

use std::fmt;
use std::path::{Path, PathBuf};

/// Byte range into the flattened source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Span { start, end }
    }
}

/// Human-facing position of a diagnostic.
///
/// Lines and columns are 1-based. `file` is only known once the
/// location has been mapped back through a [`SourceMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    /// Computes line and column of `offset` inside `source`.
    pub fn from_offset(source: &str, offset: u32) -> Self {
        let offset = (offset as usize).min(source.len());
        let before = &source.as_bytes()[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count() as u32 + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        Location {
            file: None,
            line,
            column: (offset - line_start) as u32 + 1,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file.display(), self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Maps lines of the flattened text back to the file and line they
/// were read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    files: Vec<PathBuf>,
    /// One entry per flattened line: (index into `files`, original line).
    lines: Vec<(usize, u32)>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    /// Registers `path` and returns its index, reusing an existing entry.
    pub fn add_file(&mut self, path: &Path) -> usize {
        if let Some(index) = self.files.iter().position(|file| file == path) {
            return index;
        }
        self.files.push(path.to_path_buf());
        self.files.len() - 1
    }

    /// Records that the next flattened line is `line` of file `file`.
    pub fn push_line(&mut self, file: usize, line: u32) {
        self.lines.push((file, line));
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Rewrites a location in flattened coordinates into the original
    /// file coordinates. Unknown lines are returned untouched.
    pub fn resolve(&self, location: &Location) -> Location {
        let index = location.line.saturating_sub(1) as usize;
        match self.lines.get(index) {
            Some(&(file, line)) => Location {
                file: self.files.get(file).cloned(),
                line,
                column: location.column,
            },
            None => location.clone(),
        }
    }
}
