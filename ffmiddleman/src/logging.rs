use std::{fs, io, path::Path};

use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::Targets,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

/// Console output honours `RUST_LOG` and falls back to `console_level`. The
/// log file always records this crate and the core library at `file_level`.
pub fn init_logging(
    console_level: LevelFilter,
    log_path: &Path,
    file_level: LevelFilter,
) -> anyhow::Result<()> {
    let directory = log_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = log_path
        .file_name()
        .with_context(|| format!("Log path {} has no file name", log_path.display()))?;
    fs::create_dir_all(directory)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)
        .context("Failed to open the log file")?;

    let console_filter = EnvFilter::builder()
        .with_default_directive(console_level.into())
        .from_env_lossy();
    let file_filter = Targets::new()
        .with_target("ffmiddleman", file_level)
        .with_target("ffmiddleman_core", file_level);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .try_init()?;

    Ok(())
}
