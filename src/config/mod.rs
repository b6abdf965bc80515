//! Optional TOML configuration file.
//!
//! ```toml
//! [postgres]
//! schema = "public"
//! tables = ["users", "orders"]
//! slot_name = "drift_slot"
//! poll_interval = "500ms"
//!
//! [mongodb]
//! database = "app"
//!
//! [mysql]
//! tables = ["users"]
//!
//! [session]
//! window = 256
//! ```
//!
//! Every section and every key is optional.

mod duration;

pub use duration::parse_duration;

use anyhow::Context;
use drift_capture::SessionConfig;
use drift_mongodb::MongoConfig;
use drift_mysql::MysqlConfig;
use drift_postgresql::PostgresConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub postgres: PostgresSection,
    pub mongodb: MongoSection,
    pub mysql: MysqlSection,
    pub session: SessionConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(text)?;
        if config.session.window == 0 {
            anyhow::bail!("session.window must be at least 1");
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostgresSection {
    pub schema: String,
    pub tables: Vec<String>,
    pub slot_name: String,
    #[serde(deserialize_with = "duration::deserialize")]
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub drop_slot_on_stop: bool,
    pub queue_capacity: usize,
}

impl Default for PostgresSection {
    fn default() -> Self {
        PostgresConfig::default().into()
    }
}

impl From<PostgresConfig> for PostgresSection {
    fn from(c: PostgresConfig) -> Self {
        Self {
            schema: c.schema,
            tables: c.tables,
            slot_name: c.slot_name,
            poll_interval: c.poll_interval,
            batch_size: c.batch_size,
            drop_slot_on_stop: c.drop_slot_on_stop,
            queue_capacity: c.queue_capacity,
        }
    }
}

impl From<PostgresSection> for PostgresConfig {
    fn from(s: PostgresSection) -> Self {
        Self {
            schema: s.schema,
            tables: s.tables,
            slot_name: s.slot_name,
            poll_interval: s.poll_interval,
            batch_size: s.batch_size,
            drop_slot_on_stop: s.drop_slot_on_stop,
            queue_capacity: s.queue_capacity,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MongoSection {
    pub database: Option<String>,
    pub collections: Vec<String>,
    #[serde(deserialize_with = "duration::deserialize")]
    pub poll_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for MongoSection {
    fn default() -> Self {
        let c = MongoConfig::default();
        Self {
            database: c.database,
            collections: c.collections,
            poll_interval: c.poll_interval,
            queue_capacity: c.queue_capacity,
        }
    }
}

impl From<MongoSection> for MongoConfig {
    fn from(s: MongoSection) -> Self {
        Self {
            database: s.database,
            collections: s.collections,
            poll_interval: s.poll_interval,
            queue_capacity: s.queue_capacity,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MysqlSection {
    pub database: Option<String>,
    pub tables: Vec<String>,
}

impl From<MysqlSection> for MysqlConfig {
    fn from(s: MysqlSection) -> Self {
        Self {
            database: s.database,
            tables: s.tables,
        }
    }
}
