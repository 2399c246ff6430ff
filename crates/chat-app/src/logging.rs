use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use snafu::{ResultExt, Snafu};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;

pub const LOG_FILE_NAME: &str = "gatito.log";
pub const LOG_FILTER_VAR: &str = "GATITO_LOG";
const DEFAULT_FILTER: &str = "info";

/// Upstream crates that are chatty at `info`.
const QUIET_DIRECTIVES: [&str; 3] = ["hyper=warn", "reqwest=warn", "sqlx=warn"];

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoggingError {
    #[snafu(display("failed to create log directory at {path:?} on `{stage}`: {source}"))]
    CreateLogDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to open log file at {path:?} on `{stage}`: {source}"))]
    OpenLogFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to install tracing subscriber on `{stage}`: {message}"))]
    InstallSubscriber { stage: &'static str, message: String },
}

pub fn build_filter(directive: Option<&str>) -> EnvFilter {
    let directive = directive
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_FILTER);
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    QUIET_DIRECTIVES
        .iter()
        .filter_map(|quiet| quiet.parse::<Directive>().ok())
        .fold(filter, EnvFilter::add_directive)
}

/// Sends logs to a file in `log_dir`; the terminal itself is busy rendering the chat.
pub fn init(log_dir: &Path) -> Result<PathBuf, LoggingError> {
    std::fs::create_dir_all(log_dir).context(CreateLogDirSnafu {
        stage: "create-log-directory",
        path: log_dir.to_path_buf(),
    })?;

    let path = log_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .context(OpenLogFileSnafu {
            stage: "open-log-file",
            path: path.clone(),
        })?;

    let directive = std::env::var(LOG_FILTER_VAR).ok();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(build_filter(directive.as_deref()))
        .with(fmt_layer)
        .try_init()
        .map_err(|error| LoggingError::InstallSubscriber {
            stage: "install-subscriber",
            message: error.to_string(),
        })?;

    Ok(path)
}
