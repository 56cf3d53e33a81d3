use anyhow::anyhow;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
};
use time::{format_description::well_known::Iso8601, OffsetDateTime};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to Settings.toml file holding configuration options
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level to run with the service (default: info)
    #[arg(short, long)]
    pub level: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Settings {
    pub config: Option<String>,
    pub level: Option<String>,
    pub db_settings: DBSettings,
    pub api_settings: APISettings,
    pub pickem_settings: PickemSettings,
    #[serde(default)]
    pub notification_settings: NotificationSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DBSettings {
    pub data_folder: String,
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfigSerde,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteConfigSerde {
    pub mode: String,
    pub cache: String,
    pub busy_timeout_ms: u32,
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i32,
    pub foreign_keys: bool,
    pub wal_autocheckpoint: Option<u32>,
}

impl Default for DBSettings {
    fn default() -> Self {
        DBSettings {
            data_folder: String::from("./data"),
            read_max_connections: 12,
            read_min_connections: 2,
            write_max_connections: 2,
            idle_timeout_secs: 600,   // 10 minutes
            acquire_timeout_secs: 15, // 15 seconds
            sqlite_config: SqliteConfigSerde::default(),
        }
    }
}

impl Default for SqliteConfigSerde {
    fn default() -> Self {
        Self {
            mode: "ReadWriteCreate".to_string(),
            cache: "Shared".to_string(),
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size: 100000,
            foreign_keys: true,
            wal_autocheckpoint: Some(1000),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PickemSettings {
    /// Coins a newly registered user starts with
    pub starting_coins: i64,
    /// How often to look for matchups the score feed has marked final
    pub settlement_interval_secs: u64,
    /// How often to check whether the active campaign has ended
    pub campaign_check_interval_secs: u64,
    /// How often the job dispatcher checks the jobs table without a wake-up
    pub job_poll_interval_secs: u64,
    /// Attempts before a failing side-effect job is dropped
    pub job_max_attempts: i64,
    /// Header the upstream auth proxy uses to pass the authenticated user id
    pub identity_header: String,
    /// Shared secret for operator routes, they are refused while unset
    pub admin_key: Option<String>,
    pub admin_header: String,
}

impl Default for PickemSettings {
    fn default() -> Self {
        PickemSettings {
            starting_coins: 100,
            settlement_interval_secs: 30,
            campaign_check_interval_secs: 300,
            job_poll_interval_secs: 5,
            job_max_attempts: 5,
            identity_header: String::from("x-user-id"),
            admin_key: None,
            admin_header: String::from("x-admin-key"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Webhook that receives settled pick notifications, notifications are only logged when unset
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct APISettings {
    pub domain: String,
    pub port: String,
    pub origins: Vec<String>,
}

impl Default for APISettings {
    fn default() -> Self {
        APISettings {
            domain: String::from("127.0.0.1"),
            port: String::from("9100"),
            origins: vec![String::from("http://localhost:3000")],
        }
    }
}

pub fn get_settings() -> Result<Settings, anyhow::Error> {
    get_settings_with_cli(Cli::parse().into())
}

pub struct CliSettings {
    pub config: Option<String>,
    pub level: Option<String>,
}

impl From<Cli> for CliSettings {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            level: cli.level,
        }
    }
}

pub fn get_settings_with_cli(cli_settings: CliSettings) -> Result<Settings, anyhow::Error> {
    let default_path = PathBuf::from("./config/local.toml");

    let mut settings = if let Some(config_path) = cli_settings.config.clone() {
        let path = PathBuf::from(config_path);
        let absolute_path = if path.is_absolute() {
            path
        } else {
            env::current_dir()?.join(path)
        };

        let mut file =
            File::open(absolute_path).map_err(|e| anyhow!("Failed to find file: {}", e))?;
        read_settings(&mut file)?
    } else {
        match File::open(&default_path) {
            Ok(mut file) => read_settings(&mut file)?,
            Err(_) => {
                let default_settings = Settings::default();

                fs::create_dir_all("./config")
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;

                let toml_content = toml::to_string(&default_settings)
                    .map_err(|e| anyhow!("Failed to serialize default settings: {}", e))?;

                let mut file = fs::File::create(&default_path)
                    .map_err(|e| anyhow!("Failed to create config file: {}", e))?;
                file.write_all(toml_content.as_bytes())
                    .map_err(|e| anyhow!("Failed to write default config: {}", e))?;

                default_settings
            }
        }
    };

    if let Some(level) = cli_settings.level {
        settings.level = Some(level);
    }

    Ok(settings)
}

fn read_settings(file: &mut File) -> Result<Settings, anyhow::Error> {
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| anyhow!("Failed to read config: {}", e))?;
    toml::from_str(&content).map_err(|e| anyhow!("Failed to map config to settings: {}", e))
}

pub fn setup_logger(
    level: Option<String>,
    filter_targets: Vec<String>,
) -> Result<(), fern::InitError> {
    let rust_log = get_log_level(level);
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let timestamp = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                timestamp,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(rust_log)
        .filter(move |metadata| {
            !filter_targets
                .iter()
                .any(|filter| metadata.target().starts_with(filter))
        })
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

pub fn get_log_level(level: Option<String>) -> LevelFilter {
    let level = level.unwrap_or_else(|| env::var("RUST_LOG").unwrap_or_default());
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(get_log_level(Some("debug".into())), LevelFilter::Debug);
        assert_eq!(get_log_level(Some("WARN".into())), LevelFilter::Warn);
        assert_eq!(get_log_level(Some("nonsense".into())), LevelFilter::Info);
    }

    #[test]
    fn test_settings_round_trip_through_toml() {
        let settings = Settings::default();
        let content = toml::to_string(&settings).unwrap();
        let parsed: Settings = toml::from_str(&content).unwrap();
        assert_eq!(parsed.pickem_settings.starting_coins, 100);
        assert_eq!(parsed.pickem_settings.identity_header, "x-user-id");
        assert_eq!(parsed.pickem_settings.admin_header, "x-admin-key");
        assert!(parsed.pickem_settings.admin_key.is_none());
        assert!(parsed.notification_settings.webhook_url.is_none());
    }
}
