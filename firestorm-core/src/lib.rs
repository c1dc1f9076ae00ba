//! Core of the firestorm compiler.
//!
//! The pipeline is strictly linear:
//!
//!   source .fl
//!     -> preprocessor (flattened text + source map)
//!     -> lexer        (tokens)
//!     -> parser       (AST)
//!     -> codegen_llvm (textual LLVM IR, constexpr for global initializers)
//!     -> toolchain    (external driver builds the object or executable)
//!
//! Front ends such as the CLI should depend on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod error;
pub mod span;

// ---------------------------------------------------------------------
// Front-end: include expansion, lexing and parsing
// ---------------------------------------------------------------------

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod preprocessor;

// ---------------------------------------------------------------------
// Semantic layers: datatypes and constant evaluation
// ---------------------------------------------------------------------

pub mod constexpr;
pub mod types;

// ---------------------------------------------------------------------
// Back-end: IR generation, targets and the native toolchain
// ---------------------------------------------------------------------

pub mod codegen_llvm;
pub mod ir;
pub mod target;
pub mod toolchain;

// ---------------------------------------------------------------------
// Packages and compiler orchestration
// ---------------------------------------------------------------------

pub mod compiler;
pub mod package;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{CompileOptions, compile, compile_source, emit_llvm_ir};
pub use error::{CoreError, ErrorKind};
pub use package::{ContentProvider, DirectoryProvider, materialize};
pub use target::{Target, detect_extension, detect_target};
pub use toolchain::ToolchainConfig;
