//! Package sources and their on-disk cache.
//!
//! A package is a named, versioned set of `.fl` files. Before compiling,
//! each dependency is copied out of a [`ContentProvider`] into
//! `<cache>/<name>@<version>/`, which is then passed to the
//! preprocessor as an include directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::CoreError;

const SOURCE_EXTENSION: &str = "fl";

/// Source of package contents.
pub trait ContentProvider {
    /// Relative paths of every file in the package, `/`-separated.
    fn list_files(&self, package: &str, version: &str) -> Result<Vec<String>, CoreError>;

    fn load_file(&self, package: &str, version: &str, name: &str) -> Result<String, CoreError>;
}

/// Serves packages laid out as `<root>/<name>@<version>/`.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryProvider { root: root.into() }
    }

    fn package_root(&self, package: &str, version: &str) -> Result<PathBuf, CoreError> {
        validate_name(package, version, package)?;
        validate_name(package, version, version)?;
        let dir = self.root.join(package_dir_name(package, version));
        if !dir.is_dir() {
            return Err(package_error(
                package,
                version,
                format!("not found in {}", self.root.display()),
            ));
        }
        Ok(dir)
    }
}

impl ContentProvider for DirectoryProvider {
    fn list_files(&self, package: &str, version: &str) -> Result<Vec<String>, CoreError> {
        let root = self.package_root(package, version)?;
        let mut files = Vec::new();
        for entry in WalkDir::new(&root).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
                let relative = path.strip_prefix(&root).unwrap_or(path);
                let name = relative
                    .components()
                    .map(|part| part.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(name);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load_file(&self, package: &str, version: &str, name: &str) -> Result<String, CoreError> {
        let root = self.package_root(package, version)?;
        let relative = relative_path(package, version, name)?;
        fs::read_to_string(root.join(relative))
            .map_err(|err| package_error(package, version, format!("cannot read {name}: {err}")))
    }
}

pub fn package_dir_name(package: &str, version: &str) -> String {
    format!("{package}@{version}")
}

/// Ensures `<cache_root>/<package>@<version>/` holds the package and
/// returns that directory. An existing directory is reused as is.
pub fn materialize(
    provider: &dyn ContentProvider,
    package: &str,
    version: &str,
    cache_root: &Path,
) -> Result<PathBuf, CoreError> {
    validate_name(package, version, package)?;
    validate_name(package, version, version)?;
    let dir = cache_root.join(package_dir_name(package, version));
    if dir.is_dir() {
        debug!(dir = %dir.display(), "package already materialized");
        return Ok(dir);
    }

    let files = provider.list_files(package, version)?;
    debug!(package, version, files = files.len(), "materializing package");

    // Copied into a staging directory first so that an interrupted copy
    // is never mistaken for a complete package.
    let staging = cache_root.join(format!(".{}.partial", package_dir_name(package, version)));
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|source| write_error(&staging, source))?;
    }
    fs::create_dir_all(&staging).map_err(|source| write_error(&staging, source))?;

    for name in &files {
        let relative = relative_path(package, version, name)?;
        let contents = provider.load_file(package, version, name)?;
        let path = staging.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| write_error(parent, source))?;
        }
        trace!(file = %path.display(), "writing package file");
        fs::write(&path, contents).map_err(|source| write_error(&path, source))?;
    }

    fs::rename(&staging, &dir).map_err(|source| write_error(&dir, source))?;
    Ok(dir)
}

fn validate_name(package: &str, version: &str, name: &str) -> Result<(), CoreError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(package_error(package, version, format!("invalid name '{name}'")))
    }
}

/// Converts a listed file name into a path that stays inside the package.
fn relative_path(package: &str, version: &str, name: &str) -> Result<PathBuf, CoreError> {
    let path = PathBuf::from(name);
    let contained = !name.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !contained {
        return Err(package_error(
            package,
            version,
            format!("file name '{name}' escapes the package"),
        ));
    }
    Ok(path)
}

fn package_error(package: &str, version: &str, message: String) -> CoreError {
    CoreError::Package {
        package: package.to_string(),
        version: version.to_string(),
        message,
    }
}

fn write_error(path: &Path, source: std::io::Error) -> CoreError {
    CoreError::WriteOutput {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    use crate::error::ErrorKind;

    fn registry() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let package = dir.path().join("std@1.0.0");
        fs::create_dir_all(package.join("io")).unwrap();
        fs::write(package.join("math.fl"), "int pi = 3;").unwrap();
        fs::write(package.join("io").join("print.fl"), "function (external) puts(str s) -> int;").unwrap();
        fs::write(package.join("README.md"), "not source").unwrap();
        dir
    }

    /// In-memory provider that counts how often files are loaded.
    struct MemoryProvider {
        files: BTreeMap<String, String>,
        loads: Cell<usize>,
    }

    impl ContentProvider for MemoryProvider {
        fn list_files(&self, _: &str, _: &str) -> Result<Vec<String>, CoreError> {
            Ok(self.files.keys().cloned().collect())
        }

        fn load_file(&self, package: &str, version: &str, name: &str) -> Result<String, CoreError> {
            self.loads.set(self.loads.get() + 1);
            self.files
                .get(name)
                .cloned()
                .ok_or_else(|| package_error(package, version, format!("no file {name}")))
        }
    }

    #[test]
    fn lists_source_files_sorted_and_relative() {
        let registry = registry();
        let provider = DirectoryProvider::new(registry.path());
        let files = provider.list_files("std", "1.0.0").expect("list");
        assert_eq!(files, vec!["io/print.fl".to_string(), "math.fl".to_string()]);
        assert_eq!(
            provider.load_file("std", "1.0.0", "math.fl").unwrap(),
            "int pi = 3;"
        );
    }

    #[test]
    fn unknown_package_is_an_io_error() {
        let registry = registry();
        let provider = DirectoryProvider::new(registry.path());
        let err = provider.list_files("std", "2.0.0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("std@2.0.0"));
    }

    #[test]
    fn rejects_names_that_escape_the_package() {
        let registry = registry();
        let provider = DirectoryProvider::new(registry.path());
        assert!(provider.load_file("std", "1.0.0", "../secret.fl").is_err());
        assert!(provider.load_file("std", "1.0.0", "/etc/passwd").is_err());
        assert!(provider.list_files("../std", "1.0.0").is_err());
    }

    #[test]
    fn materialize_copies_every_listed_file() {
        let registry = registry();
        let cache = tempfile::tempdir().expect("cache");
        let provider = DirectoryProvider::new(registry.path());

        let dir = materialize(&provider, "std", "1.0.0", cache.path()).expect("materialize");
        assert_eq!(dir, cache.path().join("std@1.0.0"));
        assert_eq!(
            fs::read_to_string(dir.join("io").join("print.fl")).unwrap(),
            "function (external) puts(str s) -> int;"
        );
        assert!(!dir.join("README.md").exists());
        assert!(!cache.path().join(".std@1.0.0.partial").exists());
    }

    #[test]
    fn materialize_reuses_an_existing_directory() {
        let cache = tempfile::tempdir().expect("cache");
        let provider = MemoryProvider {
            files: BTreeMap::from([("a.fl".to_string(), "int a;".to_string())]),
            loads: Cell::new(0),
        };

        materialize(&provider, "pkg", "0.1", cache.path()).expect("first");
        materialize(&provider, "pkg", "0.1", cache.path()).expect("second");
        assert_eq!(provider.loads.get(), 1);
    }

    #[test]
    fn failed_materialize_leaves_no_package_directory() {
        let cache = tempfile::tempdir().expect("cache");
        let provider = MemoryProvider {
            files: BTreeMap::from([("../evil.fl".to_string(), String::new())]),
            loads: Cell::new(0),
        };
        assert!(materialize(&provider, "pkg", "0.1", cache.path()).is_err());
        assert!(!cache.path().join("pkg@0.1").exists());
    }
}
