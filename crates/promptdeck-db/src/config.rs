use std::env;

/// Database configuration.
///
/// Reads from the `PROMPTDECK_DATABASE_URL` environment variable, falling
/// back to `postgresql://localhost:5432/promptdeck` when unset.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
}

impl DbConfig {
    /// The default connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/promptdeck";

    /// Environment variable consulted by [`DbConfig::from_env`].
    pub const URL_ENV: &str = "PROMPTDECK_DATABASE_URL";

    const DEFAULT_MAX_CONNECTIONS: u32 = 10;

    /// Build a config from the environment, falling back to [`Self::DEFAULT_URL`].
    pub fn from_env() -> Self {
        let database_url =
            env::var(Self::URL_ENV).unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self::new(database_url)
    }

    /// Build a config from an explicit URL.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Override the pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// Extract the database name from the URL, ignoring any query string.
    pub fn database_name(&self) -> Option<&str> {
        let without_query = self
            .database_url
            .split_once('?')
            .map_or(self.database_url.as_str(), |(head, _)| head);
        without_query.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// URL of the `postgres` maintenance database on the same server, used
    /// to issue `CREATE DATABASE`.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => format!("{}/postgres", &self.database_url[..pos]),
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url_points_at_promptdeck() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL);
        assert_eq!(cfg.database_name(), Some("promptdeck"));
        assert_eq!(cfg.max_connections, 10);
    }

    #[test]
    fn database_name_ignores_query_string() {
        let cfg = DbConfig::new("postgresql://db:5432/prompts?sslmode=require");
        assert_eq!(cfg.database_name(), Some("prompts"));
    }

    #[test]
    fn maintenance_url_swaps_database() {
        let cfg = DbConfig::new("postgresql://user:pw@db:5432/promptdeck");
        assert_eq!(cfg.maintenance_url(), "postgresql://user:pw@db:5432/postgres");
    }

    #[test]
    fn max_connections_never_zero() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL).with_max_connections(0);
        assert_eq!(cfg.max_connections, 1);
    }
}
