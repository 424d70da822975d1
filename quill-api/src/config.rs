use quill_common::{
    snowflake::{ProcessId, WorkerId},
    util::{NonPositiveDurationError, PositiveDuration},
};
use quill_db::DbError;
use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid setting {0}: {1}")]
    Setting(&'static str, NonPositiveDurationError),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct Env {
    pub server_address: IpAddr,
    pub server_port: u16,
    /// Without a database URL, everything is kept in memory.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub worker_id: WorkerId,
    #[serde(default)]
    pub process_id: ProcessId,
    #[serde(default = "default_page_cache_ttl_seconds")]
    pub page_cache_ttl_seconds: u64,
    #[serde(default = "default_page_cache_max_entries")]
    pub page_cache_max_entries: usize,
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default)]
    pub auth_token_lifetime_seconds: Option<u64>,
}

fn default_page_cache_ttl_seconds() -> u64 {
    20
}

fn default_page_cache_max_entries() -> usize {
    256
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

impl Env {
    pub fn page_cache_ttl(&self) -> Result<PositiveDuration, InitError> {
        PositiveDuration::from_seconds(self.page_cache_ttl_seconds)
            .map_err(|err| InitError::Setting("PAGE_CACHE_TTL_SECONDS", err))
    }

    pub fn auth_token_lifetime(&self) -> Result<Option<PositiveDuration>, InitError> {
        self.auth_token_lifetime_seconds
            .map(PositiveDuration::from_seconds)
            .transpose()
            .map_err(|err| InitError::Setting("AUTH_TOKEN_LIFETIME_SECONDS", err))
    }
}

pub fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "quill_api=debug,\
                quill_db=debug,\
                quill_common=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}
