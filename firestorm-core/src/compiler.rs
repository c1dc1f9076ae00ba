use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, debug_span};

use crate::codegen_llvm::generate_llvm_ir;
use crate::error::CoreError;
use crate::parser::parse;
use crate::preprocessor::Preprocessor;
use crate::target::{Target, detect_target};
use crate::toolchain::{ToolchainConfig, emit_output};

/// Settings for one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Target triple; the host default is used when unset.
    pub target: Option<String>,
    /// Include search directories, tried in order.
    pub include_dirs: Vec<PathBuf>,
    pub toolchain: ToolchainConfig,
}

impl CompileOptions {
    pub fn resolve_target(&self) -> Result<Target, CoreError> {
        match &self.target {
            Some(triple) => Target::parse(triple),
            None => Target::parse(&detect_target()),
        }
    }
}

/// Compiles the file at `input` and writes the artifact to `output`.
///
/// The kind of artifact follows the extension of `output`; see
/// [`emit_output`].
pub fn compile(input: &Path, output: &Path, options: &CompileOptions) -> Result<(), CoreError> {
    let ir = emit_llvm_ir(input, options)?;
    let target = options.resolve_target()?;
    emit_output(&ir, output, &target, &options.toolchain)
}

/// Compiles the file at `input` to LLVM IR text.
pub fn emit_llvm_ir(input: &Path, options: &CompileOptions) -> Result<String, CoreError> {
    let source = fs::read_to_string(input).map_err(|source| CoreError::ReadSource {
        path: input.to_path_buf(),
        source,
    })?;
    compile_source(&source, input, options)
}

/// Compiles `source` as if it had been read from `origin`.
pub fn compile_source(
    source: &str,
    origin: &Path,
    options: &CompileOptions,
) -> Result<String, CoreError> {
    let _span = debug_span!("compile", origin = %origin.display()).entered();
    let target = options.resolve_target()?;

    let preprocessed =
        Preprocessor::new(options.include_dirs.clone()).process_source(source, origin)?;
    debug!(lines = preprocessed.source_map.line_count(), "preprocessed");

    let global = parse(&preprocessed.text).map_err(|err| err.relocate(&preprocessed.source_map))?;
    debug!(items = global.items.len(), "parsed");

    let source_name = origin
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| origin.display().to_string());
    let ir = generate_llvm_ir(&global, &target, &source_name)?;
    debug!(target = %target, bytes = ir.len(), "generated llvm ir");
    Ok(ir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::package::{DirectoryProvider, materialize};

    fn options_for(target: &str) -> CompileOptions {
        CompileOptions {
            target: Some(target.to_string()),
            ..CompileOptions::default()
        }
    }

    #[test]
    fn missing_input_fails_before_lexing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = compile(
            &dir.path().join("missing.fl"),
            &dir.path().join("out.ll"),
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(matches!(err, CoreError::ReadSource { .. }));
        assert!(!dir.path().join("out.ll").exists());
    }

    #[test]
    fn compiles_file_to_llvm_ir_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("main.fl");
        let output = dir.path().join("main.ll");
        fs::write(&input, "int x = 5;\nfunction main() -> int { return x; }\n").unwrap();

        compile(&input, &output, &options_for("aarch64-unknown-linux-gnu")).expect("compile");
        let ir = fs::read_to_string(&output).unwrap();
        assert!(ir.starts_with("; ModuleID = 'main.fl'\n"));
        assert!(ir.contains("target triple = \"aarch64-unknown-linux-gnu\""));
        assert!(ir.contains("@x = global i64 5"));
        assert!(ir.contains("define i64 @main()"));
    }

    #[test]
    fn expands_includes_from_configured_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lib = dir.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("consts.fl"), "int answer = 42;\n").unwrap();
        let options = CompileOptions {
            include_dirs: vec![lib],
            ..options_for("x86_64-pc-linux-gnu")
        };

        let ir = compile_source(
            "$include <consts.fl>\nfunction main() -> int { return answer; }",
            &dir.path().join("main.fl"),
            &options,
        )
        .expect("compile");
        assert!(ir.contains("@answer = global i64 42"));
    }

    #[test]
    fn syntax_errors_point_into_the_included_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("bad.fl"), "int ok;\nint broken = ;\n").unwrap();

        let err = compile_source(
            "int first;\n$include <bad.fl>\n",
            &dir.path().join("main.fl"),
            &options_for("x86_64-pc-linux-gnu"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        let CoreError::Syntax { location, .. } = &err else {
            panic!("expected syntax error, got {err}");
        };
        assert!(location.file.as_ref().expect("file").ends_with("bad.fl"));
        assert_eq!(location.line, 2);
    }

    #[test]
    fn unsupported_target_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("main.fl");
        fs::write(&input, "int x;").unwrap();
        let err = compile(&input, &dir.path().join("out.ll"), &options_for("z80-none-elf"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Semantic);
        assert!(!dir.path().join("out.ll").exists());
    }

    #[test]
    fn semantic_errors_produce_no_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("main.fl");
        fs::write(&input, "function main() -> int { return missing(); }").unwrap();
        let output = dir.path().join("out.ll");
        let err = compile(&input, &output, &options_for("x86_64-pc-linux-gnu")).unwrap_err();
        assert!(err.to_string().contains("(in main)"));
        assert!(!output.exists());
    }

    #[test]
    fn default_target_is_the_host() {
        let ir = compile_source("int x;", Path::new("main.fl"), &CompileOptions::default())
            .expect("compile");
        assert!(ir.contains(&format!("target triple = \"{}\"", detect_target())));
    }

    #[test]
    fn materialized_packages_serve_as_include_directories() {
        let registry = tempfile::tempdir().expect("registry");
        let cache = tempfile::tempdir().expect("cache");
        let package = registry.path().join("io@1.2.0");
        fs::create_dir_all(&package).unwrap();
        fs::write(
            package.join("io.fl"),
            "function (external) putchar(int c) -> int;\n",
        )
        .unwrap();

        let provider = DirectoryProvider::new(registry.path());
        let include = materialize(&provider, "io", "1.2.0", cache.path()).expect("materialize");
        let options = CompileOptions {
            include_dirs: vec![include],
            ..options_for("x86_64-pc-linux-gnu")
        };
        let ir = compile_source(
            "$include <io.fl>\nfunction main() -> void { putchar('A'); }",
            Path::new("main.fl"),
            &options,
        )
        .expect("compile");
        assert!(ir.contains("declare i64 @putchar(i64)"));
        assert!(ir.contains("call i64 @putchar(i64 65)"));
    }

    #[test]
    fn compilation_is_deterministic() {
        let source = "int g = 2;\nfunction f(int a) -> int { end { g = 0; } if a { return a + g; } return g; }";
        let options = options_for("x86_64-pc-linux-gnu");
        let first = compile_source(source, Path::new("d.fl"), &options).unwrap();
        let second = compile_source(source, Path::new("d.fl"), &options).unwrap();
        assert_eq!(first, second);
    }
}
