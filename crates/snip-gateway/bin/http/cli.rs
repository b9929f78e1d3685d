use clap::Parser;
use snip_deleter::DeleterSettings;
use snip_storage::StorageConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const SERVER_ADDRESS_ENV: &str = "SERVER_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const COOKIE_DOMAIN_ENV: &str = "COOKIE_DOMAIN";
pub const COOKIE_SECRET_ENV: &str = "COOKIE_SECRET";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const DATABASE_TIMEOUT_ENV: &str = "DATABASE_TIMEOUT_SECS";
pub const DELETE_BATCH_SIZE_ENV: &str = "DELETE_BATCH_SIZE";
pub const DELETE_WINDOW_ENV: &str = "DELETE_WINDOW_SECS";

pub const DEFAULT_SERVER_ADDRESS: &str = "localhost:8080";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";
pub const DEFAULT_COOKIE_DOMAIN: &str = "localhost";

#[derive(Debug, Parser)]
#[command(name = "snip-gateway")]
pub struct CLI {
    #[arg(short = 'a', long, env = SERVER_ADDRESS_ENV, default_value = DEFAULT_SERVER_ADDRESS)]
    pub server_address: String,

    /// Prefix of every short URL handed out to clients.
    #[arg(short = 'b', long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, env = COOKIE_DOMAIN_ENV, default_value = DEFAULT_COOKIE_DOMAIN)]
    pub cookie_domain: String,

    /// HMAC key for the identity cookie. A random key is used when unset.
    #[arg(long, env = COOKIE_SECRET_ENV, hide_env_values = true)]
    pub cookie_secret: Option<String>,

    #[arg(short = 'f', long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// PostgreSQL connection string. Takes precedence over the file storage.
    #[arg(short = 'd', long, env = DATABASE_DSN_ENV, hide_env_values = true)]
    pub database_dsn: Option<String>,

    #[arg(long, env = DATABASE_TIMEOUT_ENV, default_value_t = 1)]
    pub database_timeout_secs: u64,

    #[arg(long, env = DELETE_BATCH_SIZE_ENV, default_value_t = 10)]
    pub delete_batch_size: usize,

    #[arg(long, env = DELETE_WINDOW_ENV, default_value_t = 10)]
    pub delete_window_secs: u64,
}

impl CLI {
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            database_dsn: self.database_dsn.clone(),
            file_path: self.file_storage_path.clone(),
            query_timeout: Some(Duration::from_secs(self.database_timeout_secs)),
        }
    }

    pub fn deleter_settings(&self) -> DeleterSettings {
        DeleterSettings::builder()
            .batch_size(self.delete_batch_size)
            .window(Duration::from_secs(self.delete_window_secs))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snip_storage::StorageBackend;

    #[test]
    fn defaults_pick_memory_storage() {
        let cli = CLI::try_parse_from(["gateway"]).unwrap();

        assert_eq!(cli.server_address, DEFAULT_SERVER_ADDRESS);
        assert_eq!(cli.base_url, DEFAULT_BASE_URL);
        assert_eq!(cli.storage_config().backend(), StorageBackend::Memory);
        assert_eq!(cli.deleter_settings().batch_size, 10);
    }

    #[test]
    fn short_flags() {
        let cli = CLI::try_parse_from([
            "gateway",
            "-a",
            "0.0.0.0:9000",
            "-b",
            "https://sn.ip/",
            "-f",
            "/var/lib/snip/urls.json",
            "-d",
            "postgres://snip@db/snip",
        ])
        .unwrap();

        assert_eq!(cli.server_address, "0.0.0.0:9000");
        assert_eq!(cli.base_url, "https://sn.ip/");
        assert_eq!(cli.storage_config().backend(), StorageBackend::Postgres);
    }
}
