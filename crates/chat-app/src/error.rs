use std::path::PathBuf;

use gatito_llm::ProviderError;
use gatito_storage::StorageError;
use snafu::Snafu;

use crate::chat::PersistenceError;
use crate::logging::LoggingError;
use crate::settings::SettingsError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to load settings on `{stage}`: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed to set up logging on `{stage}`: {source}"))]
    Logging {
        stage: &'static str,
        source: LoggingError,
    },
    #[snafu(display(
        "no API key configured; set `api_key` in {path:?} or export OPENROUTER_API_KEY"
    ))]
    MissingApiKey { stage: &'static str, path: PathBuf },
    #[snafu(display("failed to create chat provider on `{stage}`: {source}"))]
    Provider {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("failed to open history store on `{stage}`: {source}"))]
    Storage {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("failed to set up history persistence on `{stage}`: {source}"))]
    Persistence {
        stage: &'static str,
        source: PersistenceError,
    },
    #[snafu(display("terminal I/O failed on `{stage}`: {source}"))]
    Terminal {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;
