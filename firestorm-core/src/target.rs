//! Target triples and host detection.

use std::fmt;

use tracing::warn;

use crate::error::CoreError;

const FALLBACK_TARGET: &str = "x86_64-pc-linux-gnu";

/// A parsed `<arch>-<vendor>-<os>[-<abi>]` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    triple: String,
    pub arch: String,
    pub vendor: String,
    pub os: String,
    pub abi: Option<String>,
    word_bits: u32,
}

impl Target {
    pub fn parse(triple: &str) -> Result<Self, CoreError> {
        let parts: Vec<&str> = triple.split('-').collect();
        if !(3..=4).contains(&parts.len()) || parts.iter().any(|part| part.is_empty()) {
            return Err(CoreError::UnsupportedTarget(triple.to_string()));
        }
        let word_bits = arch_word_bits(parts[0])
            .ok_or_else(|| CoreError::UnsupportedTarget(triple.to_string()))?;
        Ok(Target {
            triple: triple.to_string(),
            arch: parts[0].to_string(),
            vendor: parts[1].to_string(),
            os: parts[2].to_string(),
            abi: parts.get(3).map(|abi| abi.to_string()),
            word_bits,
        })
    }

    pub fn triple(&self) -> &str {
        &self.triple
    }

    /// Width in bits of a native pointer on this target.
    pub fn word_bits(&self) -> u32 {
        self.word_bits
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.triple)
    }
}

fn arch_word_bits(arch: &str) -> Option<u32> {
    match arch {
        "x86_64" | "amd64" | "aarch64" | "arm64" | "riscv64" | "powerpc64" | "powerpc64le"
        | "ppc64" | "ppc64le" | "s390x" | "mips64" | "mips64el" | "sparcv9" | "loongarch64"
        | "wasm64" => Some(64),
        "i386" | "i486" | "i586" | "i686" | "x86" | "riscv32" | "mips" | "mipsel" | "powerpc"
        | "ppc" | "wasm32" | "sparc" => Some(32),
        other if other.starts_with("arm") || other.starts_with("thumb") => Some(32),
        _ => None,
    }
}

/// Default triple for the host, used when no target is configured.
pub fn detect_target() -> String {
    let detected = match (std::env::consts::OS, std::env::consts::ARCH) {
        ("windows", "x86_64") => Some("x86_64-pc-win32-msvc"),
        ("linux", "x86_64") => Some("x86_64-pc-linux-gnu"),
        ("linux", "aarch64") => Some("aarch64-unknown-linux-gnu"),
        ("linux", "riscv64") => Some("riscv64-unknown-linux-gnu"),
        _ => None,
    };
    match detected {
        Some(triple) => triple.to_string(),
        None => {
            warn!(
                os = std::env::consts::OS,
                arch = std::env::consts::ARCH,
                "no target set and host is not recognized, using {FALLBACK_TARGET}"
            );
            FALLBACK_TARGET.to_string()
        }
    }
}

/// Default executable extension for the host.
pub fn detect_extension() -> &'static str {
    if cfg!(windows) { "exe" } else { "elf" }
}
