//! CLI arguments and server configuration defaults.

use clap::Parser;

pub const DEFAULT_PORT: u16 = 5007;
pub const DEFAULT_FIRST_DIR: &str = "~";
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 1024 * 1024 * 1024;
pub const UPLOAD_FIELD_NAME: &str = "uploaded_file";

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "webfs", version, about = "Remote filesystem over HTTP")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "WEBFS_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "WEBFS_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Listen port"
    )]
    pub port: u16,
    #[arg(long, env = "WEBFS_PREFIX", default_value = "", help = "Web URL prefix")]
    pub prefix: String,
    #[arg(
        short = 'd',
        long,
        env = "WEBFS_DIR",
        default_value = DEFAULT_FIRST_DIR,
        help = "First directory shown by the index"
    )]
    pub dir: String,
    #[arg(long, env = "WEBFS_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "WEBFS_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max request body for upload/save in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
}

impl Args {
    /// Converts parsed arguments into the configuration shared by handlers.
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            prefix: normalize_prefix(&self.prefix),
            first_dir: self.dir,
            cors_origins: self.cors_origins,
            upload_max_size: self.upload_max_size,
        }
    }
}

/// Runtime configuration passed to the router and handlers.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Always empty or of the form `/segment`, never with a trailing slash.
    pub prefix: String,
    pub first_dir: String,
    pub cors_origins: Option<String>,
    pub upload_max_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            prefix: String::new(),
            first_dir: DEFAULT_FIRST_DIR.into(),
            cors_origins: None,
            upload_max_size: DEFAULT_UPLOAD_MAX_SIZE,
        }
    }
}

impl ServerConfig {
    /// Prepends the configured prefix to an absolute route path.
    pub fn route(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
