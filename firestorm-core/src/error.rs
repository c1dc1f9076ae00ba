use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::span::{Location, SourceMap};

/// Coarse classification of [`CoreError`], stable for callers that
/// need to branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Semantic,
    ConstExpr,
    Toolchain,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Semantic => "SemanticError",
            ErrorKind::ConstExpr => "ConstExprError",
            ErrorKind::Toolchain => "ToolchainError",
            ErrorKind::Io => "IOError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read {path}: {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not include <{name}> from {from}")]
    UnresolvedInclude { name: String, from: PathBuf },
    #[error("include cycle: {}", render_chain(chain))]
    IncludeCycle { chain: Vec<PathBuf> },
    #[error("syntax error at {location}: {message}")]
    Syntax { location: Location, message: String },
    #[error("semantic error{}: {message}", render_function(function))]
    Semantic {
        function: Option<String>,
        message: String,
    },
    #[error("unsupported target triple '{0}'")]
    UnsupportedTarget(String),
    #[error("constant expression error: {0}")]
    ConstExpr(String),
    #[error("failed to launch {program}: {source}")]
    ToolchainLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    ToolchainFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("{program} did not finish within {timeout:?} and was killed")]
    ToolchainTimeout {
        program: String,
        timeout: std::time::Duration,
    },
    #[error("package {package}@{version}: {message}")]
    Package {
        package: String,
        version: String,
        message: String,
    },
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::ReadSource { .. }
            | CoreError::WriteOutput { .. }
            | CoreError::UnresolvedInclude { .. }
            | CoreError::Package { .. } => ErrorKind::Io,
            CoreError::IncludeCycle { .. } | CoreError::Syntax { .. } => ErrorKind::Syntax,
            CoreError::Semantic { .. } | CoreError::UnsupportedTarget(_) => ErrorKind::Semantic,
            CoreError::ConstExpr(_) => ErrorKind::ConstExpr,
            CoreError::ToolchainLaunch { .. }
            | CoreError::ToolchainFailed { .. }
            | CoreError::ToolchainTimeout { .. } => ErrorKind::Toolchain,
        }
    }

    pub fn semantic(function: Option<&str>, message: impl Into<String>) -> Self {
        CoreError::Semantic {
            function: function.map(str::to_string),
            message: message.into(),
        }
    }

    /// Maps syntax locations from flattened text back to original files.
    pub fn relocate(self, map: &SourceMap) -> Self {
        match self {
            CoreError::Syntax { location, message } => CoreError::Syntax {
                location: map.resolve(&location),
                message,
            },
            other => other,
        }
    }
}

fn render_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn render_function(function: &Option<String>) -> String {
    match function {
        Some(name) => format!(" (in {name})"),
        None => String::new(),
    }
}
