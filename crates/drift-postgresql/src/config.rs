use anyhow::{bail, Result};
use std::time::Duration;

/// PostgreSQL adapter options
#[derive(Clone, Debug)]
pub struct PostgresConfig {
    /// Schema whose tables are captured
    pub schema: String,
    /// Tables to capture (empty means every base table in `schema`)
    pub tables: Vec<String>,
    /// Logical replication slot used for live capture
    pub slot_name: String,
    /// Wait between polls of an idle slot
    pub poll_interval: Duration,
    /// Upper bound on changes decoded per poll
    pub batch_size: usize,
    /// Drop the replication slot when the stream stops
    pub drop_slot_on_stop: bool,
    /// Deltas buffered between the poll loop and the consumer
    pub queue_capacity: usize,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            tables: Vec::new(),
            slot_name: "drift_slot".to_string(),
            poll_interval: Duration::from_millis(500),
            batch_size: 1000,
            drop_slot_on_stop: false,
            queue_capacity: 1024,
        }
    }
}

impl PostgresConfig {
    pub fn includes(&self, table: &str) -> bool {
        self.tables.is_empty() || self.tables.iter().any(|t| t == table)
    }

    /// Slot names end up inside SQL text, so only the characters PostgreSQL
    /// itself allows are accepted.
    pub fn validate(&self) -> Result<()> {
        let name = &self.slot_name;
        if name.is_empty() || name.len() > 63 {
            bail!("Replication slot name must be 1 to 63 characters, got '{name}'");
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            bail!("Replication slot name '{name}' may only contain lower case letters, digits and underscores");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        PostgresConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_unsafe_slot_names() {
        for name in ["", "Drift", "drift-slot", "x'; DROP TABLE users; --"] {
            let config = PostgresConfig {
                slot_name: name.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{name}");
        }
    }

    #[test]
    fn test_table_filter() {
        let all = PostgresConfig::default();
        assert!(all.includes("users"));

        let some = PostgresConfig {
            tables: vec!["users".into()],
            ..Default::default()
        };
        assert!(some.includes("users"));
        assert!(!some.includes("orders"));
    }
}
