use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("{id_type} '{raw}' rejected on `{stage}`: {reason}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        reason: &'static str,
    },
    #[snafu(display("key-value store invariant broken on `{stage}`: {details}"))]
    InvariantViolation {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("cannot create directory {path} for the history database: {source}"))]
    CreateSqliteDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("invalid sqlite location '{database_url}': {source}"))]
    SqliteConnectOptions {
        stage: &'static str,
        database_url: String,
        source: sqlx::Error,
    },
    #[snafu(display("cannot open history database '{database_url}': {source}"))]
    SqliteConnect {
        stage: &'static str,
        database_url: String,
        source: sqlx::Error,
    },
    #[snafu(display("history schema migration failed on `{stage}`: {source}"))]
    SqliteMigrate {
        stage: &'static str,
        source: sqlx::migrate::MigrateError,
    },
    #[snafu(display("key-value query failed on `{stage}`: {source}"))]
    SqliteQuery {
        stage: &'static str,
        source: sqlx::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;
