/// MySQL adapter options
#[derive(Clone, Debug, Default)]
pub struct MysqlConfig {
    /// Database to capture. Falls back to the database selected by the
    /// connection string.
    pub database: Option<String>,
    /// Tables to capture (empty means every base table)
    pub tables: Vec<String>,
}

impl MysqlConfig {
    pub fn includes(&self, table: &str) -> bool {
        self.tables.is_empty() || self.tables.iter().any(|t| t == table)
    }
}
