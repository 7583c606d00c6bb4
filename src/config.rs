//! Runtime configuration read from the environment
//!
//! Values come from process environment variables, optionally loaded from a
//! `.env` file by `main` before [`Config::from_env`] is called.

use std::env;

use tracing::warn;

use crate::database::init_db;
use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::registry::LinkDatabase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Embedded redb file at `database_url`
    Redb,
    /// Volatile, for demos and tests
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `PORT`, default 8080
    pub port: u16,

    /// `DATABASE_URL`, path of the redb file, default `data.db`
    pub database_url: String,

    /// `GO_STORAGE`: `redb` (default) or `memory`
    pub storage: StorageBackend,

    /// `GO_USER_HEADER`: request header carrying the signed-in username
    pub user_header: String,

    /// `GO_DEFAULT_USER`: editor name when the header is absent
    pub default_user: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "data.db".to_string(),
            storage: StorageBackend::Redb,
            user_header: "x-forwarded-user".to_string(),
            default_user: "testuser".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = match env::var("PORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("PORT={} is not a port number, using {}", raw, defaults.port);
                defaults.port
            }),
            Err(_) => defaults.port,
        };

        let storage = match env::var("GO_STORAGE").as_deref() {
            Ok("memory") => StorageBackend::Memory,
            Ok("redb") | Err(_) => StorageBackend::Redb,
            Ok(other) => {
                warn!("unknown GO_STORAGE={}, using redb", other);
                StorageBackend::Redb
            }
        };

        Self {
            port,
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            storage,
            user_header: env::var("GO_USER_HEADER").unwrap_or(defaults.user_header),
            default_user: env::var("GO_DEFAULT_USER").unwrap_or(defaults.default_user),
        }
    }

    /// Opens the configured store and wraps it in a registry.
    pub fn open_database(&self) -> Result<LinkDatabase, StoreError> {
        match self.storage {
            StorageBackend::Redb => Ok(LinkDatabase::new(init_db(&self.database_url)?)),
            StorageBackend::Memory => Ok(LinkDatabase::new(MemoryStore::new())),
        }
    }
}
