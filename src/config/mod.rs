//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::media::{
    DEFAULT_JPEG_QUALITY, DEFAULT_MAX_EDGE_PX, DEFAULT_MAX_FILE_BYTES, MediaSettings,
};
use crate::infra::db::{
    DEFAULT_COUNTER_NAME, DEFAULT_COUNTERS_TABLE, DEFAULT_REPORTS_TABLE, StoreLayout,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "civic-reports";
const ENV_PREFIX: &str = "CIVIC_REPORTS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 10;
const DEFAULT_MAX_REQUEST_BYTES: usize = 30 * 1024 * 1024;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_LOCAL_STORAGE_ROOT: &str = "media";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:3000/media";
const DEFAULT_S3_REGION: &str = "us-east-1";
const DEFAULT_SMTP_PORT: u16 = 587;

/// Command-line arguments for the civic-reports binary.
#[derive(Debug, Parser)]
#[command(
    name = "civic-reports",
    version,
    about = "Report ingestion and geospatial query service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CIVIC_REPORTS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Create the database extension, tables and indexes, then exit.
    #[command(name = "init-schema")]
    InitSchema(DatabaseOverride),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the per-call store deadline.
    #[arg(long = "server-request-deadline-seconds", value_name = "SECONDS")]
    pub server_request_deadline_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the local directory used for stored media.
    #[arg(long = "storage-local-root", value_name = "PATH")]
    pub storage_local_root: Option<PathBuf>,

    /// Override the public base URL of stored media.
    #[arg(long = "storage-public-base-url", value_name = "URL")]
    pub storage_public_base_url: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub store: StoreLayout,
    pub media: MediaSettings,
    pub storage: StorageSettings,
    pub notifier: Option<SmtpSettings>,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub request_deadline: Duration,
    pub max_request_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// URL under which stored objects are publicly reachable.
    pub public_base_url: Url,
    /// Key prefix prepended to every object name.
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Local { root: PathBuf },
    S3(S3Settings),
}

#[derive(Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub allow_http: bool,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub starttls: bool,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from", &self.from)
            .field("starttls", &self.starttls)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct AuthSettings {
    /// HS256 secret for moderator tokens. Moderator routes reject every
    /// request when unset.
    pub jwt_secret: Option<String>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::InitSchema(database)) => raw.apply_database_override(database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    store: RawStoreSettings,
    media: RawMediaSettings,
    storage: RawStorageSettings,
    notifier: RawNotifierSettings,
    auth: RawAuthSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.server_request_deadline_seconds {
            self.server.request_deadline_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(root) = overrides.storage_local_root.as_ref() {
            self.storage.local_root = Some(root.clone());
        }
        if let Some(url) = overrides.storage_public_base_url.as_ref() {
            self.storage.public_base_url = Some(url.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            store,
            media,
            storage,
            notifier,
            auth,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            store: build_store_layout(store)?,
            media: build_media_settings(media)?,
            storage: build_storage_settings(storage)?,
            notifier: build_notifier_settings(notifier)?,
            auth: build_auth_settings(auth),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let deadline_secs = server
        .request_deadline_seconds
        .unwrap_or(DEFAULT_REQUEST_DEADLINE_SECS);
    if deadline_secs == 0 {
        return Err(LoadError::invalid(
            "server.request_deadline_seconds",
            "must be greater than zero",
        ));
    }

    let max_request_bytes = server
        .max_request_bytes
        .unwrap_or(DEFAULT_MAX_REQUEST_BYTES as u64);
    let max_request_bytes = usize::try_from(max_request_bytes)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "server.max_request_bytes",
                "must be greater than zero and fit in usize",
            )
        })?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        request_deadline: Duration::from_secs(deadline_secs),
        max_request_bytes,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url,
        max_connections: non_zero_u32(max_connections.into(), "database.max_connections")?,
    })
}

fn build_store_layout(store: RawStoreSettings) -> Result<StoreLayout, LoadError> {
    let reports = store
        .reports_table
        .unwrap_or_else(|| DEFAULT_REPORTS_TABLE.to_string());
    let counters = store
        .counters_table
        .unwrap_or_else(|| DEFAULT_COUNTERS_TABLE.to_string());
    let counter_name = store
        .counter_name
        .unwrap_or_else(|| DEFAULT_COUNTER_NAME.to_string());
    if counter_name.trim().is_empty() {
        return Err(LoadError::invalid(
            "store.counter_name",
            "must not be empty",
        ));
    }

    StoreLayout::new(reports, counters, counter_name)
        .map_err(|err| LoadError::invalid("store", err.to_string()))
}

fn build_media_settings(media: RawMediaSettings) -> Result<MediaSettings, LoadError> {
    let max_file_bytes = media
        .max_file_bytes
        .unwrap_or(DEFAULT_MAX_FILE_BYTES as u64);
    let max_file_bytes = usize::try_from(max_file_bytes)
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| {
            LoadError::invalid(
                "media.max_file_bytes",
                "must be greater than zero and fit in usize",
            )
        })?;

    let max_edge_px = media.max_edge_px.unwrap_or(DEFAULT_MAX_EDGE_PX);
    if max_edge_px == 0 {
        return Err(LoadError::invalid(
            "media.max_edge_px",
            "must be greater than zero",
        ));
    }

    let jpeg_quality = media.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY);
    if !(1..=100).contains(&jpeg_quality) {
        return Err(LoadError::invalid(
            "media.jpeg_quality",
            "must be between 1 and 100",
        ));
    }

    Ok(MediaSettings {
        max_file_bytes,
        max_edge_px,
        jpeg_quality,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let base = non_blank(storage.public_base_url)
        .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());
    let public_base_url = Url::parse(base.trim_end_matches('/')).map_err(|err| {
        LoadError::invalid("storage.public_base_url", format!("invalid url: {err}"))
    })?;
    if public_base_url.cannot_be_a_base() {
        return Err(LoadError::invalid(
            "storage.public_base_url",
            "must be an absolute http(s) url",
        ));
    }

    let prefix = storage
        .prefix
        .unwrap_or_default()
        .trim_matches('/')
        .to_string();

    let backend = match storage.backend.as_deref().map(str::trim) {
        None | Some("") | Some("local") => StorageBackend::Local {
            root: storage
                .local_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_STORAGE_ROOT)),
        },
        Some("s3") => {
            let bucket = non_blank(storage.s3.bucket).ok_or_else(|| {
                LoadError::invalid("storage.s3.bucket", "required for the s3 backend")
            })?;
            StorageBackend::S3(S3Settings {
                bucket,
                region: non_blank(storage.s3.region)
                    .unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
                endpoint: non_blank(storage.s3.endpoint),
                access_key_id: non_blank(storage.s3.access_key_id),
                secret_access_key: non_blank(storage.s3.secret_access_key),
                allow_http: storage.s3.allow_http.unwrap_or(false),
            })
        }
        Some(other) => {
            return Err(LoadError::invalid(
                "storage.backend",
                format!("unknown backend `{other}`, expected `local` or `s3`"),
            ));
        }
    };

    Ok(StorageSettings {
        backend,
        public_base_url,
        prefix,
    })
}

fn build_notifier_settings(
    notifier: RawNotifierSettings,
) -> Result<Option<SmtpSettings>, LoadError> {
    let Some(host) = non_blank(notifier.smtp_host) else {
        return Ok(None);
    };
    let from = non_blank(notifier.from).ok_or_else(|| {
        LoadError::invalid("notifier.from", "required when notifier.smtp_host is set")
    })?;
    let port = notifier.smtp_port.unwrap_or(DEFAULT_SMTP_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "notifier.smtp_port",
            "port must be greater than zero",
        ));
    }

    Ok(Some(SmtpSettings {
        host,
        port,
        username: non_blank(notifier.username),
        password: non_blank(notifier.password),
        from,
        starttls: notifier.starttls.unwrap_or(true),
    }))
}

fn build_auth_settings(auth: RawAuthSettings) -> AuthSettings {
    AuthSettings {
        jwt_secret: non_blank(auth.jwt_secret),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    request_deadline_seconds: Option<u64>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    reports_table: Option<String>,
    counters_table: Option<String>,
    counter_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMediaSettings {
    max_file_bytes: Option<u64>,
    max_edge_px: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<String>,
    public_base_url: Option<String>,
    prefix: Option<String>,
    local_root: Option<PathBuf>,
    s3: RawS3Settings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawS3Settings {
    bucket: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    allow_http: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNotifierSettings {
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    from: Option<String>,
    starttls: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    jwt_secret: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
