//! Argument parsing and the packaging run loop.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use stowage_config::{
    ArchiveExtension, DestinationSpec, RunConfig, default_cpu_workers, default_io_workers,
};
use stowage_pack::{ExitStatus, Interrupt, Packager, RunReport};
use stowage_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use tracing::info;

use crate::error::{CliError, CliResult};
use crate::output::print_summary;

#[derive(Parser, Debug)]
#[command(
    name = "stowage",
    version,
    about = "Package directories into archives with an embedded MD5 manifest"
)]
pub(crate) struct Cli {
    /// Source directories to package, processed in order.
    #[arg(value_name = "SOURCE", required = true, num_args = 1..)]
    sources: Vec<PathBuf>,
    /// Destination directory; give once to share it, or once per source.
    #[arg(
        long = "dest",
        value_name = "DIR",
        env = "STOWAGE_DEST",
        value_delimiter = ',',
        required = true
    )]
    destinations: Vec<PathBuf>,
    /// Archive extension.
    #[arg(
        long = "ext",
        value_name = "EXT",
        env = "STOWAGE_EXT",
        default_value = "tar.gz",
        value_parser = parse_extension
    )]
    extension: ArchiveExtension,
    /// Compress after every source has a placed container.
    #[arg(long, env = "STOWAGE_DEFER_COMPRESSION")]
    defer_compression: bool,
    /// Remove each source directory once it is archived.
    #[arg(long, env = "STOWAGE_DELETE_SOURCE")]
    delete_source: bool,
    /// Replace existing outputs instead of aborting.
    #[arg(long, env = "STOWAGE_OVERWRITE")]
    overwrite: bool,
    /// Hashing workers (defaults to the CPU count).
    #[arg(long, env = "STOWAGE_WORKERS")]
    workers: Option<usize>,
    /// Metadata and deferred-compression workers.
    #[arg(long, env = "STOWAGE_IO_WORKERS")]
    io_workers: Option<usize>,
    /// Log level when `RUST_LOG` is unset.
    #[arg(long, env = "STOWAGE_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
    /// Log format: json, pretty, or auto.
    #[arg(long, env = "STOWAGE_LOG_FORMAT", default_value = "auto")]
    log_format: String,
}

impl Cli {
    fn into_config(self, cwd: &Path) -> RunConfig {
        let cpu_workers = self.workers.unwrap_or_else(default_cpu_workers);
        let io_workers = self
            .io_workers
            .unwrap_or_else(|| default_io_workers(cpu_workers));
        RunConfig {
            sources: self
                .sources
                .into_iter()
                .map(|path| resolve(cwd, path))
                .collect(),
            destinations: DestinationSpec::from_dirs(
                self.destinations
                    .into_iter()
                    .map(|path| resolve(cwd, path))
                    .collect(),
            ),
            extension: self.extension,
            defer_compression: self.defer_compression,
            delete_source: self.delete_source,
            overwrite: self.overwrite,
            cpu_workers,
            io_workers,
        }
    }
}

fn parse_extension(value: &str) -> Result<ArchiveExtension, String> {
    value.parse().map_err(|_| {
        let supported: Vec<&str> = ArchiveExtension::ALL
            .iter()
            .map(|extension| extension.as_str())
            .collect();
        format!("unsupported extension '{value}' (expected one of {})", supported.join(", "))
    })
}

fn resolve(cwd: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

/// Parses arguments, runs the packaging pipeline, and prints a summary.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(report) => {
            print_summary(&report);
            ExitStatus::Success.code()
        }
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn execute(cli: Cli) -> CliResult<RunReport> {
    let format: LogFormat = cli
        .log_format
        .parse()
        .map_err(|_| CliError::validation(format!("unknown log format '{}'", cli.log_format)))?;
    init_logging(&LoggingConfig {
        level: &cli.log_level,
        format,
    })
    .map_err(CliError::failure)?;

    let cwd = env::current_dir()
        .context("failed to resolve the current directory")
        .map_err(CliError::failure)?;
    let config = cli.into_config(&cwd);
    let sets = config.source_sets()?;
    info!(
        sources = sets.len(),
        extension = %config.extension,
        defer_compression = config.defer_compression,
        cpu_workers = config.cpu_workers,
        io_workers = config.io_workers,
        "starting packaging run"
    );

    let interrupt = Interrupt::new();
    let listener = interrupt.listen();
    let outcome = match Packager::new(&config, interrupt) {
        Ok(packager) => packager.run(&sets).await,
        Err(error) => Err(error),
    };
    listener.abort();
    outcome.map_err(CliError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("stowage").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_apply_when_flags_are_omitted() -> Result<(), clap::Error> {
        let cli = parse(&["/data/run", "--dest", "/out"])?;
        let config = cli.into_config(Path::new("/work"));
        assert_eq!(config.extension, ArchiveExtension::TarGz);
        assert_eq!(config.sources, [PathBuf::from("/data/run")]);
        assert_eq!(config.destinations, DestinationSpec::Shared(PathBuf::from("/out")));
        assert!(!config.defer_compression && !config.delete_source && !config.overwrite);
        assert!(config.cpu_workers >= 1);
        assert_eq!(config.io_workers, default_io_workers(config.cpu_workers));
        Ok(())
    }

    #[test]
    fn relative_paths_resolve_against_cwd() -> Result<(), clap::Error> {
        let cli = parse(&[
            "a", "b", "--dest", "out-a", "--dest", "/abs/out-b", "--ext", ".ZIP", "--workers", "3",
            "--io-workers", "5", "--defer-compression", "--overwrite",
        ])?;
        let config = cli.into_config(Path::new("/work"));
        assert_eq!(
            config.sources,
            [PathBuf::from("/work/a"), PathBuf::from("/work/b")]
        );
        assert_eq!(
            config.destinations,
            DestinationSpec::PerSource(vec![
                PathBuf::from("/work/out-a"),
                PathBuf::from("/abs/out-b")
            ])
        );
        assert_eq!(config.extension, ArchiveExtension::Zip);
        assert_eq!((config.cpu_workers, config.io_workers), (3, 5));
        assert!(config.defer_compression && config.overwrite);
        Ok(())
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = parse(&["/data/run", "--dest", "/out", "--ext", "rar"]);
        assert!(err.is_err());
        assert!(parse(&["/data/run"]).is_err());
    }

    #[test]
    fn invalid_configuration_maps_to_exit_code_two() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::Builder::new().prefix("stowage-cli-").tempdir()?;
        let source = temp.path().join("run");
        fs::create_dir(&source)?;
        let cli = parse(&[
            source.to_str().ok_or("non-utf8 temp path")?,
            "--dest",
            temp.path().join("missing").to_str().ok_or("non-utf8 temp path")?,
        ])?;
        let err = match cli.into_config(temp.path()).source_sets() {
            Ok(_) => return Err("missing destination was accepted".into()),
            Err(error) => CliError::from(error),
        };
        assert_eq!(err.exit_code(), 2);
        assert!(err.display_message().contains("destinations"));
        Ok(())
    }
}
