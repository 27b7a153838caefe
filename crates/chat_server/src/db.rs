//! Async service layer over the SQLite store.
//!
//! All access goes through one pooled connection (`max_connections(1)`),
//! so statements execute strictly serialized. Multi-statement operations
//! run inside a transaction; a transaction dropped before commit rolls
//! back, which keeps the futures safe to cancel.

use log::{debug, error};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::queries;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("no such user: {0}")]
    NoSuchUser(String),
    #[error("{field} already taken")]
    Duplicate { field: &'static str },
}

/// Persistent channel visibility. `pub` channels are open to anyone,
/// `priv` channels gate JOIN on membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Public,
    Private,
}

impl ChannelMode {
    pub fn is_public(self) -> bool {
        self == ChannelMode::Public
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Public => write!(f, "pub"),
            ChannelMode::Private => write!(f, "priv"),
        }
    }
}

impl FromStr for ChannelMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pub" => Ok(ChannelMode::Public),
            "priv" => Ok(ChannelMode::Private),
            _ => Err(()),
        }
    }
}

/// A pending notification for an offline user; the target is implied by
/// the query that fetched it.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub author: String,
    pub content: String,
}

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

fn log_call<T>(op: &str, result: &Result<T, DbError>) {
    match result {
        Ok(_) => debug!("DB: {op} call successful"),
        Err(e) => error!("DB: {op} call failed: {e}"),
    }
}

// Maps an insert failure on a UNIQUE column to a field name the protocol
// can report.
fn duplicate_field(e: sqlx::Error, fields: &'static [&'static str]) -> DbError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let message = db_err.message().to_owned();
            for field in fields {
                if message.contains(field) {
                    return DbError::Duplicate { field };
                }
            }
            return DbError::Duplicate { field: fields[0] };
        }
    }
    DbError::Sqlx(e)
}

impl Db {
    /// Open (or create) the store at `path` and bootstrap the schema.
    /// `:memory:` gives a private in-memory store.
    pub async fn connect(path: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Db { pool };
        db.create_tables().await?;
        debug!("DB: connected to {path}");
        Ok(db)
    }

    async fn create_tables(&self) -> Result<(), DbError> {
        for query in [
            queries::CREATE_TABLE_USER,
            queries::CREATE_TABLE_CHANNEL,
            queries::CREATE_TABLE_IS_MEMBER,
            queries::CREATE_TABLE_NOTIFICATION,
        ] {
            sqlx::query(query).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn account_available(&self, nick: &str, mail: &str) -> Result<(bool, bool), DbError> {
        let result = async {
            let nick_row = sqlx::query(queries::SELECT_NICK)
                .bind(nick)
                .fetch_optional(&self.pool)
                .await?;
            let mail_row = sqlx::query(queries::SELECT_MAIL)
                .bind(mail)
                .fetch_optional(&self.pool)
                .await?;
            Ok((nick_row.is_none(), mail_row.is_none()))
        }
        .await;
        log_call("account_available", &result);
        result
    }

    /// The subset of `nicks` with a registered account.
    pub async fn users_registered(&self, nicks: &[String]) -> Result<Vec<String>, DbError> {
        let result = async {
            let mut registered = Vec::new();
            for nick in nicks {
                let row = sqlx::query(queries::SELECT_NICK)
                    .bind(nick)
                    .fetch_optional(&self.pool)
                    .await?;
                if row.is_some() {
                    registered.push(nick.clone());
                }
            }
            Ok(registered)
        }
        .await;
        log_call("users_registered", &result);
        result
    }

    pub async fn add_user(&self, nick: &str, mail: &str, password: &str) -> Result<(), DbError> {
        let result = sqlx::query(queries::INSERT_USER)
            .bind(nick)
            .bind(mail)
            .bind(password)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| duplicate_field(e, &["mail", "nick"]));
        log_call("add_user", &result);
        result
    }

    /// Removes the account; owned channels, memberships and pending
    /// notifications go with it (FK cascades).
    pub async fn delete_user(&self, nick: &str) -> Result<(), DbError> {
        let result = sqlx::query(queries::DELETE_USER)
            .bind(nick)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(DbError::from);
        log_call("delete_user", &result);
        result
    }

    /// An unknown nick is an integrity error here, not `false`: callers
    /// must have checked registration first.
    pub async fn password_correct(&self, nick: &str, password: &str) -> Result<bool, DbError> {
        let result = async {
            let row = sqlx::query(queries::SELECT_PASSWORD)
                .bind(nick)
                .fetch_optional(&self.pool)
                .await?;
            match row {
                Some(row) => Ok(row.get::<String, _>(0) == password),
                None => Err(DbError::NoSuchUser(nick.to_owned())),
            }
        }
        .await;
        log_call("password_correct", &result);
        result
    }

    pub async fn channel_exists(&self, name: &str) -> Result<bool, DbError> {
        let result = sqlx::query(queries::SELECT_CHANNEL)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.is_some())
            .map_err(DbError::from);
        log_call("channel_exists", &result);
        result
    }

    pub async fn get_channel_mode(&self, name: &str) -> Result<Option<ChannelMode>, DbError> {
        let result = sqlx::query(queries::SELECT_CHANNEL_MODE)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map(|row| {
                row.map(|row| {
                    if row.get::<i64, _>(0) == 1 {
                        ChannelMode::Public
                    } else {
                        ChannelMode::Private
                    }
                })
            })
            .map_err(DbError::from);
        log_call("get_channel_mode", &result);
        result
    }

    pub async fn get_channel_creator(&self, name: &str) -> Result<Option<String>, DbError> {
        let result = sqlx::query(queries::SELECT_CHANNEL_CREATOR)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(|row| row.get::<String, _>(0)))
            .map_err(DbError::from);
        log_call("get_channel_creator", &result);
        result
    }

    /// Creates the channel row and its initial member rows in one
    /// transaction.
    pub async fn add_channel(
        &self,
        name: &str,
        creator: &str,
        mode: ChannelMode,
        members: &[String],
    ) -> Result<(), DbError> {
        let result = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(queries::INSERT_CHANNEL)
                .bind(name)
                .bind(creator)
                .bind(mode.is_public() as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| duplicate_field(e, &["name"]))?;
            for member in members {
                sqlx::query(queries::INSERT_MEMBER)
                    .bind(member)
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;
        log_call("add_channel", &result);
        result
    }

    /// Removes the channel row; membership rows cascade.
    pub async fn delete_channel(&self, name: &str) -> Result<(), DbError> {
        let result = sqlx::query(queries::DELETE_CHANNEL)
            .bind(name)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(DbError::from);
        log_call("delete_channel", &result);
        result
    }

    pub async fn add_members(&self, channel: &str, nicks: &[String]) -> Result<(), DbError> {
        let result = async {
            let mut tx = self.pool.begin().await?;
            for nick in nicks {
                sqlx::query(queries::INSERT_MEMBER)
                    .bind(nick)
                    .bind(channel)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;
        log_call("add_members", &result);
        result
    }

    pub async fn delete_members(&self, channel: &str, nicks: &[String]) -> Result<(), DbError> {
        let result = async {
            let mut tx = self.pool.begin().await?;
            for nick in nicks {
                sqlx::query(queries::DELETE_MEMBER)
                    .bind(nick)
                    .bind(channel)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;
        log_call("delete_members", &result);
        result
    }

    pub async fn is_member(&self, nick: &str, channel: &str) -> Result<bool, DbError> {
        let result = sqlx::query(queries::SELECT_IS_MEMBER)
            .bind(nick)
            .bind(channel)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.is_some())
            .map_err(DbError::from);
        log_call("is_member", &result);
        result
    }

    pub async fn get_members(&self, channel: &str) -> Result<Vec<String>, DbError> {
        let result = sqlx::query(queries::SELECT_MEMBERS)
            .bind(channel)
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.iter().map(|row| row.get::<String, _>(0)).collect())
            .map_err(DbError::from);
        log_call("get_members", &result);
        result
    }

    pub async fn get_pub_channels(&self) -> Result<Vec<String>, DbError> {
        let result = sqlx::query(queries::SELECT_PUB_CHANNELS)
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.iter().map(|row| row.get::<String, _>(0)).collect())
            .map_err(DbError::from);
        log_call("get_pub_channels", &result);
        result
    }

    /// Private channels `nick` is a member of.
    pub async fn get_priv_channels(&self, nick: &str) -> Result<Vec<String>, DbError> {
        let result = sqlx::query(queries::SELECT_PRIV_CHANNELS)
            .bind(nick)
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.iter().map(|row| row.get::<String, _>(0)).collect())
            .map_err(DbError::from);
        log_call("get_priv_channels", &result);
        result
    }

    pub async fn add_notification(
        &self,
        author: &str,
        target: &str,
        content: &str,
    ) -> Result<(), DbError> {
        let result = sqlx::query(queries::INSERT_NOTIFICATION)
            .bind(author)
            .bind(target)
            .bind(content)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(DbError::from);
        log_call("add_notification", &result);
        result
    }

    pub async fn get_notifications(&self, target: &str) -> Result<Vec<Notification>, DbError> {
        let result = sqlx::query(queries::SELECT_NOTIFICATIONS)
            .bind(target)
            .fetch_all(&self.pool)
            .await
            .map(|rows| {
                rows.iter()
                    .map(|row| Notification {
                        author: row.get(0),
                        content: row.get(1),
                    })
                    .collect()
            })
            .map_err(DbError::from);
        log_call("get_notifications", &result);
        result
    }

    pub async fn delete_notifications(&self, target: &str) -> Result<(), DbError> {
        let result = sqlx::query(queries::DELETE_NOTIFICATIONS)
            .bind(target)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(DbError::from);
        log_call("delete_notifications", &result);
        result
    }
}
