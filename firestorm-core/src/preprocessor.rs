//! Include expansion.
//!
//! A line whose first non-blank text is `$include <path>` is replaced by
//! the contents of `path`, searched in each include directory in order
//! and finally next to the including file. Every file is expanded at
//! most once; re-including a file that is still being expanded is a
//! cycle and fails.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::CoreError;
use crate::span::{Location, SourceMap};

const DIRECTIVE: &str = "$include";

/// Flattened source text plus the origin of each of its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed {
    pub text: String,
    pub source_map: SourceMap,
}

#[derive(Debug)]
pub struct Preprocessor {
    include_dirs: Vec<PathBuf>,
    included: HashSet<PathBuf>,
    /// Canonical paths of the files currently being expanded.
    stack: Vec<PathBuf>,
    lines: Vec<String>,
    source_map: SourceMap,
}

impl Preprocessor {
    pub fn new(include_dirs: Vec<PathBuf>) -> Self {
        Preprocessor {
            include_dirs,
            included: HashSet::new(),
            stack: Vec::new(),
            lines: Vec::new(),
            source_map: SourceMap::new(),
        }
    }

    /// Reads `path` and expands it.
    pub fn process_file(self, path: &Path) -> Result<Preprocessed, CoreError> {
        let source = read_source(path)?;
        self.process_source(&source, path)
    }

    /// Expands `source`, which is considered to live at `origin`.
    pub fn process_source(mut self, source: &str, origin: &Path) -> Result<Preprocessed, CoreError> {
        debug!(origin = %origin.display(), dirs = self.include_dirs.len(), "preprocessing");
        self.expand(source, origin)?;
        Ok(Preprocessed {
            text: self.lines.join("\n"),
            source_map: self.source_map,
        })
    }

    fn expand(&mut self, source: &str, origin: &Path) -> Result<(), CoreError> {
        let identity = canonical(origin);
        self.included.insert(identity.clone());
        self.stack.push(identity);
        let file = self.source_map.add_file(origin);

        for (index, line) in source.split('\n').enumerate() {
            let line_number = index as u32 + 1;
            let trimmed = line.trim_start();
            if !trimmed.starts_with(DIRECTIVE) {
                self.lines.push(line.trim_end_matches('\r').to_string());
                self.source_map.push_line(file, line_number);
                continue;
            }

            let column = (line.len() - trimmed.len()) as u32 + 1;
            let name = parse_directive(trimmed).ok_or_else(|| CoreError::Syntax {
                location: Location {
                    file: Some(origin.to_path_buf()),
                    line: line_number,
                    column,
                },
                message: format!("malformed directive, expected {DIRECTIVE} <path>"),
            })?;
            self.include(name, origin)?;
        }

        self.stack.pop();
        Ok(())
    }

    fn include(&mut self, name: &str, from: &Path) -> Result<(), CoreError> {
        let path = self
            .resolve(name, from)
            .ok_or_else(|| CoreError::UnresolvedInclude {
                name: name.to_string(),
                from: from.to_path_buf(),
            })?;
        let identity = canonical(&path);

        if self.stack.contains(&identity) {
            let mut chain = self.stack.clone();
            chain.push(identity);
            return Err(CoreError::IncludeCycle { chain });
        }
        if self.included.contains(&identity) {
            trace!(path = %path.display(), "already included");
            return Ok(());
        }

        trace!(path = %path.display(), "including");
        let source = read_source(&path)?;
        self.expand(&source, &path)
    }

    fn resolve(&self, name: &str, from: &Path) -> Option<PathBuf> {
        let sibling = from.parent().map(|dir| dir.join(name));
        self.include_dirs
            .iter()
            .map(|dir| dir.join(name))
            .chain(sibling)
            .find(|candidate| candidate.is_file())
    }
}

/// Extracts the path of `$include <path>`, allowing blanks around it.
fn parse_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(DIRECTIVE)?.trim_start();
    let rest = rest.strip_prefix('<')?;
    let close = rest.find('>')?;
    let name = rest[..close].trim();
    let trailing = rest[close + 1..].trim();
    if name.is_empty() || !(trailing.is_empty() || trailing.starts_with("//")) {
        return None;
    }
    Some(name)
}

fn read_source(path: &Path) -> Result<String, CoreError> {
    fs::read_to_string(path).map_err(|source| CoreError::ReadSource {
        path: path.to_path_buf(),
        source,
    })
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
