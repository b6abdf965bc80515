use std::time::Duration;

/// MongoDB adapter options
#[derive(Clone, Debug)]
pub struct MongoConfig {
    /// Database to capture. Falls back to the database named in the
    /// connection string.
    pub database: Option<String>,
    /// Collections to capture (empty means every non-system collection)
    pub collections: Vec<String>,
    /// Wait between polls of an idle change stream
    pub poll_interval: Duration,
    /// Deltas buffered between the change stream and the consumer
    pub queue_capacity: usize,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            database: None,
            collections: Vec::new(),
            poll_interval: Duration::from_millis(200),
            queue_capacity: 1024,
        }
    }
}

impl MongoConfig {
    pub fn includes(&self, collection: &str) -> bool {
        if self.collections.is_empty() {
            return !collection.starts_with("system.");
        }
        self.collections.iter().any(|c| c == collection)
    }
}
