//! Process configuration, built once at startup and passed down explicitly.
//!
//! Layers, lowest precedence first:
//!
//! 1. built-in defaults (the development database on `postgres:5433`)
//! 2. `config/forgedesk.toml` (optional)
//! 3. legacy deployment variables: `DB_HOST`, `DB_PORT`, `DB_DATABASE`/`DB_NAME`,
//!    `DB_USERNAME`/`DB_USER`, `DB_PASSWORD`, `ALLOWED_HOSTS`, `DEBUG`,
//!    `TIME_ZONE`, `SECRET_KEY`, `STATIC_ROOT`
//! 4. `FORGEDESK__SECTION__KEY` variables, e.g. `FORGEDESK__DATABASE__PORT=5432`

use config::{Config, ConfigError, Environment, File, Map, Source, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the optional settings file
pub const DEFAULT_CONFIG_PATH: &str = "config/forgedesk.toml";

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; when set it wins over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "postgres".to_string(),
            port: 5433,
            name: "forge_desk_dev".to_string(),
            user: "forge_dev".to_string(),
            password: "forgepass_dev".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Render a connection string for [`connect`](crate::connection::connect)
    ///
    /// Returns `url` verbatim when configured, otherwise a libpq key-value
    /// string built from the individual fields.
    pub fn connection_string(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.to_string();
        }
        format!(
            "host={} port={} dbname={} user={} password={}",
            quote_kv(&self.host),
            self.port,
            quote_kv(&self.name),
            quote_kv(&self.user),
            quote_kv(&self.password),
        )
    }
}

fn quote_kv(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\'', '\\']) {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// Top-level settings for the admin backoffice
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminSettings {
    pub database: DatabaseConfig,
    pub allowed_hosts: Vec<String>,
    pub debug: bool,
    pub time_zone: String,
    pub secret_key: Option<String>,
    pub static_root: Option<PathBuf>,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            allowed_hosts: vec!["*".to_string()],
            debug: false,
            time_zone: "UTC".to_string(),
            secret_key: None,
            static_root: None,
        }
    }
}

impl AdminSettings {
    /// Load settings from `config/forgedesk.toml` and the process environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value has the wrong shape (e.g. a
    /// non-numeric port).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH), None)
    }

    /// Load settings from an explicit file, optionally replacing the process
    /// environment with `env`
    ///
    /// A file that exists but cannot be parsed is reported and skipped, the
    /// same as a missing file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the remaining sources cannot be deserialized.
    pub fn load_from(path: &Path, env: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let with_file = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(LegacyEnvironment::new(env.clone()))
            .add_source(prefixed_environment(env.clone()))
            .build();

        let settings = match with_file {
            Ok(cfg) => cfg,
            Err(err) => {
                if path.exists() {
                    log::warn!(
                        "failed to load {}, falling back to environment: {err}",
                        path.display()
                    );
                }
                Config::builder()
                    .add_source(LegacyEnvironment::new(env.clone()))
                    .add_source(prefixed_environment(env))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        settings.try_deserialize::<AdminSettings>()
    }
}

fn prefixed_environment(env: Option<Map<String, String>>) -> Environment {
    Environment::with_prefix("FORGEDESK")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("allowed_hosts")
        .source(env)
}

/// `config` source for the variable names older deployments already export
#[derive(Debug, Clone, Default)]
pub struct LegacyEnvironment {
    source: Option<Map<String, String>>,
}

impl LegacyEnvironment {
    /// Read from `source` instead of the process environment when given
    pub fn new(source: Option<Map<String, String>>) -> Self {
        Self { source }
    }

    fn var(&self, key: &str) -> Option<String> {
        let value = match &self.source {
            Some(map) => map.get(key).cloned(),
            None => std::env::var(key).ok(),
        };
        value.filter(|v| !v.is_empty())
    }

    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.var(k))
    }
}

impl Source for LegacyEnvironment {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        let origin = "legacy environment".to_string();
        let mut out = Map::new();

        let scalars: [(&str, &[&str]); 7] = [
            ("database.host", &["DB_HOST"]),
            ("database.port", &["DB_PORT"]),
            ("database.name", &["DB_DATABASE", "DB_NAME"]),
            ("database.user", &["DB_USERNAME", "DB_USER"]),
            ("database.password", &["DB_PASSWORD"]),
            ("time_zone", &["TIME_ZONE"]),
            ("secret_key", &["SECRET_KEY"]),
        ];
        for (key, names) in scalars {
            if let Some(v) = self.first(names) {
                out.insert(key.to_string(), Value::new(Some(&origin), v));
            }
        }

        if let Some(v) = self.var("STATIC_ROOT") {
            out.insert("static_root".to_string(), Value::new(Some(&origin), v));
        }

        if let Some(v) = self.var("ALLOWED_HOSTS") {
            let hosts: Vec<Value> = v
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(|h| Value::new(Some(&origin), h))
                .collect();
            out.insert(
                "allowed_hosts".to_string(),
                Value::new(Some(&origin), ValueKind::Array(hosts)),
            );
        }

        if let Some(v) = self.var("DEBUG") {
            let on = matches!(v.as_str(), "1" | "true" | "True");
            out.insert("debug".to_string(), Value::new(Some(&origin), on));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn load(pairs: &[(&str, &str)]) -> AdminSettings {
        AdminSettings::load_from(Path::new("does/not/exist.toml"), env(pairs))
            .expect("settings should load")
    }

    #[test]
    fn test_defaults_without_any_source() {
        let settings = load(&[]);
        assert_eq!(settings, AdminSettings::default());
        assert_eq!(settings.database.host, "postgres");
        assert_eq!(settings.database.port, 5433);
        assert_eq!(settings.allowed_hosts, vec!["*".to_string()]);
        assert!(!settings.debug);
    }

    #[test]
    fn test_legacy_variables_are_honoured() {
        let settings = load(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "5432"),
            ("DB_NAME", "forge_prod"),
            ("DB_USER", "forge"),
            ("DB_PASSWORD", "s3cret"),
            ("ALLOWED_HOSTS", "admin.example.com, localhost"),
            ("DEBUG", "True"),
            ("TIME_ZONE", "America/Chicago"),
        ]);
        assert_eq!(settings.database.host, "db.internal");
        assert_eq!(settings.database.port, 5432);
        assert_eq!(settings.database.name, "forge_prod");
        assert_eq!(settings.database.user, "forge");
        assert_eq!(settings.database.password, "s3cret");
        assert_eq!(settings.allowed_hosts, vec!["admin.example.com", "localhost"]);
        assert!(settings.debug);
        assert_eq!(settings.time_zone, "America/Chicago");
    }

    #[test]
    fn test_db_database_wins_over_db_name() {
        let settings = load(&[("DB_DATABASE", "primary"), ("DB_NAME", "secondary")]);
        assert_eq!(settings.database.name, "primary");
    }

    #[test]
    fn test_debug_only_accepts_truthy_spellings() {
        assert!(!load(&[("DEBUG", "yes")]).debug);
        assert!(load(&[("DEBUG", "1")]).debug);
    }

    #[test]
    fn test_prefixed_variables_override_legacy() {
        let settings = load(&[("DB_HOST", "legacy"), ("FORGEDESK__DATABASE__HOST", "modern")]);
        assert_eq!(settings.database.host, "modern");
    }

    #[test]
    fn test_connection_string_key_value() {
        let db = DatabaseConfig::default();
        assert_eq!(
            db.connection_string(),
            "host=postgres port=5433 dbname=forge_desk_dev user=forge_dev password=forgepass_dev"
        );
    }

    #[test]
    fn test_connection_string_quotes_awkward_values() {
        let db = DatabaseConfig {
            password: "it's a secret".to_string(),
            ..DatabaseConfig::default()
        };
        assert!(db.connection_string().ends_with("password='it\\'s a secret'"));
    }

    #[test]
    fn test_connection_string_prefers_url() {
        let db = DatabaseConfig {
            url: Some("postgresql://u:p@h:1/d".to_string()),
            ..DatabaseConfig::default()
        };
        assert_eq!(db.connection_string(), "postgresql://u:p@h:1/d");
    }
}
