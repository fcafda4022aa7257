use std::time::Duration;

/// Database-level configuration handed to [`Database::open`](crate::Database::open).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database name, used in document paths (`/_db/<name>/…`).
    pub name: String,
    /// Page size for full-collection cursors.
    pub batch_size: usize,
    /// Whether transactions may embed into a running parent.
    pub allow_nesting: bool,
    /// Optional transaction timeout recorded on new transactions.
    pub transaction_timeout: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            name: "_system".to_string(),
            batch_size: 1000,
            allow_nesting: true,
            transaction_timeout: None,
        }
    }
}
