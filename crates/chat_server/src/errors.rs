use thiserror::Error;

use crate::config::ConfigError;
use crate::db::DbError;

/// Fatal startup errors; everything past startup is handled per
/// connection.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("database error: {0}")]
    Db(#[from] DbError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
