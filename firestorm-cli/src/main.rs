use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use firestorm_core::{
    CompileOptions, CoreError, DirectoryProvider, ToolchainConfig, compile, detect_extension,
    materialize,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Command line of the firestorm compiler.
#[derive(Parser, Debug)]
#[command(version, about = "Compile firestorm sources to LLVM IR, objects or executables", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Output path; .ll writes IR, .o assembles, anything else links (default a.<host extension>)"
    )]
    output: Option<PathBuf>,

    #[arg(long, env = "FIRESTORM_TARGET", value_name = "TRIPLE")]
    target: Option<String>,

    #[arg(short = 'I', long = "include", value_name = "DIR", help = "Include search directory, repeatable")]
    include: Vec<PathBuf>,

    #[arg(
        long,
        value_name = "NAME@VERSION",
        requires = "registry",
        help = "Package to materialize and add to the include path, repeatable"
    )]
    package: Vec<String>,

    #[arg(long, value_name = "DIR", help = "Directory holding <name>@<version> package folders")]
    registry: Option<PathBuf>,

    #[arg(long, value_name = "DIR", default_value = ".fire")]
    cache: PathBuf,

    #[arg(long, env = "FIRESTORM_CC", default_value = "clang", value_name = "DRIVER")]
    cc: String,

    #[arg(long = "cc-arg", value_name = "ARG", allow_hyphen_values = true)]
    cc_args: Vec<String>,

    #[arg(long, env = "FIRESTORM_TOOLCHAIN_TIMEOUT", value_name = "SECS")]
    toolchain_timeout: Option<u64>,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Raise log verbosity (-v debug, -vv trace)")]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<CoreError>() {
                Some(core) => eprintln!("{}: {err:#}", core.kind()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("FIRESTORM_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn execute(cli: Cli) -> Result<()> {
    let mut include_dirs = cli.include;
    if !cli.package.is_empty() {
        let registry = cli
            .registry
            .context("--package needs --registry to locate package sources")?;
        let provider = DirectoryProvider::new(registry);
        for spec in &cli.package {
            let (name, version) = parse_package(spec)?;
            let dir = materialize(&provider, name, version, &cli.cache)
                .with_context(|| format!("failed to materialize package {spec}"))?;
            debug!(package = %spec, dir = %dir.display(), "package ready");
            include_dirs.push(dir);
        }
    }

    let output = cli
        .output
        .unwrap_or_else(|| PathBuf::from(format!("a.{}", detect_extension())));
    let options = CompileOptions {
        target: cli.target,
        include_dirs,
        toolchain: ToolchainConfig {
            driver: cli.cc,
            timeout: cli.toolchain_timeout.map(Duration::from_secs),
            extra_args: cli.cc_args,
        },
    };

    compile(&cli.input, &output, &options)
        .with_context(|| format!("failed to compile {}", cli.input.display()))?;
    Ok(())
}

fn parse_package(spec: &str) -> Result<(&str, &str)> {
    match spec.split_once('@') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => Ok((name, version)),
        _ => bail!("invalid package '{spec}', expected NAME@VERSION"),
    }
}
