//! Loader configuration file support
//!
//! Handles parsing of `target-redshift.toml` configuration files and
//! environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{DatabaseError, DatabaseResult};
use crate::validation::IdentifierPolicy;

/// Default database filename for DuckDB
pub const DEFAULT_DUCKDB_FILENAME: &str = "target-redshift.duckdb";

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "target-redshift.toml";

/// Default staging directory for the local stager
pub const DEFAULT_STAGING_DIRECTORY: &str = ".target-redshift-staging";

/// Default length of text columns without a declared `maxLength`
pub const DEFAULT_COLUMN_LENGTH: usize = 65535;

/// Environment variable for the warehouse backend
pub const ENV_BACKEND: &str = "TARGET_REDSHIFT_BACKEND";

/// Environment variable for the target schema
pub const ENV_SCHEMA: &str = "TARGET_REDSHIFT_SCHEMA";

/// Environment variable for DuckDB path
pub const ENV_DUCKDB_PATH: &str = "TARGET_REDSHIFT_DUCKDB_PATH";

/// Environment variable for the PostgreSQL-wire connection string
pub const ENV_CONNECTION_STRING: &str = "TARGET_REDSHIFT_CONNECTION_STRING";

/// Environment variable for the staging bucket
pub const ENV_S3_BUCKET: &str = "TARGET_REDSHIFT_S3_BUCKET";

/// Environment variable for the staging key prefix
pub const ENV_S3_KEY_PREFIX: &str = "TARGET_REDSHIFT_S3_KEY_PREFIX";

/// Environment variable for the staging bucket region
pub const ENV_S3_REGION: &str = "TARGET_REDSHIFT_S3_REGION";

/// Environment variable for the access key used by staging and `COPY`
pub const ENV_AWS_ACCESS_KEY_ID: &str = "TARGET_REDSHIFT_AWS_ACCESS_KEY_ID";

/// Environment variable for the secret key used by staging and `COPY`
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "TARGET_REDSHIFT_AWS_SECRET_ACCESS_KEY";

/// Environment variable for an optional session token
pub const ENV_AWS_SESSION_TOKEN: &str = "TARGET_REDSHIFT_AWS_SESSION_TOKEN";

/// Warehouse backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// DuckDB embedded warehouse (default)
    #[default]
    DuckDB,
    /// PostgreSQL wire protocol (Redshift)
    Postgres,
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duckdb" => Ok(BackendType::DuckDB),
            "postgres" | "postgresql" | "redshift" => Ok(BackendType::Postgres),
            _ => Err(format!(
                "Unknown warehouse backend: {}. Use 'duckdb' or 'postgres'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::DuckDB => write!(f, "duckdb"),
            BackendType::Postgres => write!(f, "postgres"),
        }
    }
}

/// Where staged objects are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagerType {
    /// Local directory (DuckDB)
    #[default]
    Local,
    /// S3 bucket (Redshift)
    S3,
}

/// Warehouse configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseSection {
    /// Warehouse backend type
    #[serde(default)]
    pub backend: BackendType,

    /// Target schema holding the loaded tables and the metadata table
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Path to DuckDB database file (relative to the config directory, or absolute)
    #[serde(default = "default_duckdb_path")]
    pub path: String,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_duckdb_path() -> String {
    DEFAULT_DUCKDB_FILENAME.to_string()
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            schema: default_schema(),
            path: default_duckdb_path(),
        }
    }
}

/// PostgreSQL-wire configuration section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PostgresSection {
    /// Connection string (e.g., "host=cluster.redshift.amazonaws.com port=5439 user=loader dbname=dev")
    #[serde(default)]
    pub connection_string: Option<String>,
}

/// Loader behaviour section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderSection {
    /// Length of text columns without a declared `maxLength`
    #[serde(default = "default_column_length")]
    pub default_column_length: usize,

    /// Create tables for batches without rows
    #[serde(default)]
    pub persist_empty_tables: bool,

    /// Pass identifiers with invalid characters through verbatim
    #[serde(default)]
    pub allow_invalid_identifier_characters: bool,

    /// Replace invalid identifier characters with `_`
    #[serde(default)]
    pub escape_identifier_characters: bool,

    /// Truncate identifiers longer than the warehouse maximum
    #[serde(default)]
    pub truncate_identifiers: bool,
}

fn default_column_length() -> usize {
    DEFAULT_COLUMN_LENGTH
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            default_column_length: default_column_length(),
            persist_empty_tables: false,
            allow_invalid_identifier_characters: false,
            escape_identifier_characters: false,
            truncate_identifiers: false,
        }
    }
}

/// Staging configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingSection {
    /// Stager type
    #[serde(default, rename = "type")]
    pub stager: StagerType,

    /// Directory for the local stager (relative to the config directory, or absolute)
    #[serde(default = "default_staging_directory")]
    pub local_directory: String,

    /// Prefix prepended to every staged object key
    #[serde(default)]
    pub key_prefix: String,

    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub force_path_style: bool,

    #[serde(default)]
    pub aws_access_key_id: Option<String>,

    #[serde(default)]
    pub aws_secret_access_key: Option<String>,

    #[serde(default)]
    pub aws_session_token: Option<String>,
}

fn default_staging_directory() -> String {
    DEFAULT_STAGING_DIRECTORY.to_string()
}

impl Default for StagingSection {
    fn default() -> Self {
        Self {
            stager: StagerType::default(),
            local_directory: default_staging_directory(),
            key_prefix: String::new(),
            bucket: None,
            region: None,
            endpoint: None,
            force_path_style: false,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_session_token: None,
        }
    }
}

/// Main configuration structure
///
/// Represents the `target-redshift.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoaderConfig {
    /// Warehouse configuration
    #[serde(default)]
    pub warehouse: WarehouseSection,

    /// PostgreSQL-wire configuration
    #[serde(default)]
    pub postgres: PostgresSection,

    /// Loader behaviour
    #[serde(default)]
    pub loader: LoaderSection,

    /// Staging configuration
    #[serde(default)]
    pub staging: StagingSection,
}

impl LoaderConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a DuckDB configuration staging into a local directory
    pub fn duckdb(path: impl Into<String>) -> Self {
        Self {
            warehouse: WarehouseSection {
                backend: BackendType::DuckDB,
                path: path.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a Redshift configuration staging into an S3 bucket
    pub fn postgres(connection_string: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            warehouse: WarehouseSection {
                backend: BackendType::Postgres,
                path: String::new(),
                ..Default::default()
            },
            postgres: PostgresSection {
                connection_string: Some(connection_string.into()),
            },
            staging: StagingSection {
                stager: StagerType::S3,
                bucket: Some(bucket.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load configuration from a directory
    ///
    /// Looks for `target-redshift.toml` in the directory.
    /// Falls back to defaults if not found.
    pub fn load(dir: &Path) -> DatabaseResult<Self> {
        let config_path = dir.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            Self::load_file(&config_path)?
        } else {
            Self::default()
        };

        // Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from an explicit file path, without env overrides
    pub fn load_file(path: &Path) -> DatabaseResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DatabaseError::IoError(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> DatabaseResult<Self> {
        toml::from_str(content)
            .map_err(|e| DatabaseError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a directory
    pub fn save(&self, dir: &Path) -> DatabaseResult<()> {
        let config_path = dir.join(CONFIG_FILENAME);
        let content = self.to_toml()?;

        std::fs::write(&config_path, content)
            .map_err(|e| DatabaseError::IoError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> DatabaseResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            DatabaseError::SerializationError(format!("Failed to serialize config: {}", e))
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var(ENV_BACKEND)
            && let Ok(backend_type) = backend.parse()
        {
            self.warehouse.backend = backend_type;
        }

        if let Ok(schema) = std::env::var(ENV_SCHEMA) {
            self.warehouse.schema = schema;
        }

        if let Ok(path) = std::env::var(ENV_DUCKDB_PATH) {
            self.warehouse.path = path;
        }

        if let Ok(url) = std::env::var(ENV_CONNECTION_STRING) {
            self.postgres.connection_string = Some(url);
        }

        // Setting a bucket implies S3 staging
        if let Ok(bucket) = std::env::var(ENV_S3_BUCKET) {
            self.staging.bucket = Some(bucket);
            self.staging.stager = StagerType::S3;
        }

        if let Ok(prefix) = std::env::var(ENV_S3_KEY_PREFIX) {
            self.staging.key_prefix = prefix;
        }

        if let Ok(region) = std::env::var(ENV_S3_REGION) {
            self.staging.region = Some(region);
        }

        if let Ok(key) = std::env::var(ENV_AWS_ACCESS_KEY_ID) {
            self.staging.aws_access_key_id = Some(key);
        }

        if let Ok(secret) = std::env::var(ENV_AWS_SECRET_ACCESS_KEY) {
            self.staging.aws_secret_access_key = Some(secret);
        }

        if let Ok(token) = std::env::var(ENV_AWS_SESSION_TOKEN) {
            self.staging.aws_session_token = Some(token);
        }
    }

    /// Identifier rules for a warehouse with the given identifier limit
    pub fn identifier_policy(&self, max_length: usize) -> IdentifierPolicy {
        IdentifierPolicy {
            max_length,
            allow_invalid_characters: self.loader.allow_invalid_identifier_characters,
            escape_characters: self.loader.escape_identifier_characters,
            truncate: self.loader.truncate_identifiers,
        }
    }

    /// Get the DuckDB database path relative to a base directory
    pub fn get_duckdb_path(&self, base: &Path) -> PathBuf {
        resolve(base, &self.warehouse.path, DEFAULT_DUCKDB_FILENAME)
    }

    /// Get the local staging directory relative to a base directory
    pub fn get_staging_directory(&self, base: &Path) -> PathBuf {
        resolve(base, &self.staging.local_directory, DEFAULT_STAGING_DIRECTORY)
    }

    /// Get the PostgreSQL-wire connection string
    pub fn get_connection_string(&self) -> Option<&str> {
        self.postgres.connection_string.as_deref()
    }

    /// Check if configuration exists in a directory
    pub fn exists(dir: &Path) -> bool {
        dir.join(CONFIG_FILENAME).exists()
    }
}

fn resolve(base: &Path, configured: &str, default: &str) -> PathBuf {
    if configured.is_empty() {
        base.join(default)
    } else if Path::new(configured).is_absolute() {
        PathBuf::from(configured)
    } else {
        base.join(configured)
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# target-redshift configuration

[warehouse]
# Warehouse backend: "duckdb" (default) or "postgres" (Redshift)
backend = "duckdb"

# Schema holding the loaded tables and the _sdc_table_metadata table
schema = "public"

# Path to DuckDB database file (relative to this file, or absolute)
path = "target-redshift.duckdb"

# Redshift connection (used when backend = "postgres")
[postgres]
# connection_string = "host=examplecluster.abc123.us-west-2.redshift.amazonaws.com port=5439 user=loader dbname=dev"

[loader]
# Length of varchar columns for strings without a declared maxLength (max 65535)
default_column_length = 65535

# Create tables for streams whose batches carry no rows
persist_empty_tables = false

# Identifier handling: names are lower-cased and limited to [a-z0-9_$], 127 bytes
allow_invalid_identifier_characters = false
escape_identifier_characters = false
truncate_identifiers = false

[staging]
# Stager: "local" (DuckDB) or "s3" (Redshift)
type = "local"
local_directory = ".target-redshift-staging"
key_prefix = ""

# S3 staging (used when type = "s3")
# bucket = "my-staging-bucket"
# region = "us-west-2"
# endpoint = "http://localhost:9000"
force_path_style = false
# aws_access_key_id = "..."
# aws_secret_access_key = "..."
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::new();
        assert_eq!(config.warehouse.backend, BackendType::DuckDB);
        assert_eq!(config.warehouse.schema, "public");
        assert_eq!(config.warehouse.path, DEFAULT_DUCKDB_FILENAME);
        assert_eq!(config.loader.default_column_length, DEFAULT_COLUMN_LENGTH);
        assert!(!config.loader.persist_empty_tables);
        assert_eq!(config.staging.stager, StagerType::Local);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[warehouse]
backend = "duckdb"
schema = "tap_github"
path = "custom.duckdb"

[loader]
persist_empty_tables = true
truncate_identifiers = true
"#;
        let config = LoaderConfig::parse(toml).unwrap();
        assert_eq!(config.warehouse.schema, "tap_github");
        assert_eq!(config.warehouse.path, "custom.duckdb");
        assert!(config.loader.persist_empty_tables);
        assert!(config.loader.truncate_identifiers);
        assert!(!config.loader.escape_identifier_characters);
        assert_eq!(config.loader.default_column_length, DEFAULT_COLUMN_LENGTH);
    }

    #[test]
    fn test_parse_redshift_config() {
        let toml = r#"
[warehouse]
backend = "postgres"

[postgres]
connection_string = "host=localhost port=5439 dbname=dev"

[staging]
type = "s3"
bucket = "staging"
key_prefix = "loads/"
force_path_style = true
"#;
        let config = LoaderConfig::parse(toml).unwrap();
        assert_eq!(config.warehouse.backend, BackendType::Postgres);
        assert_eq!(
            config.get_connection_string(),
            Some("host=localhost port=5439 dbname=dev")
        );
        assert_eq!(config.staging.stager, StagerType::S3);
        assert_eq!(config.staging.bucket.as_deref(), Some("staging"));
        assert_eq!(config.staging.key_prefix, "loads/");
        assert!(config.staging.force_path_style);
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let result = LoaderConfig::parse("[warehouse]\nbackend = \"oracle\"\n");
        assert!(matches!(result, Err(DatabaseError::ConfigError(_))));
    }

    #[test]
    fn test_to_toml() {
        let config = LoaderConfig::postgres("host=localhost", "bucket");
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("postgres"));
        assert!(toml.contains("bucket"));

        let parsed = LoaderConfig::parse(&toml).unwrap();
        assert_eq!(parsed.staging.stager, StagerType::S3);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config = LoaderConfig::duckdb("my-db.duckdb");

        config.save(dir.path()).unwrap();
        assert!(LoaderConfig::exists(dir.path()));

        let loaded = LoaderConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.warehouse.path, "my-db.duckdb");
    }

    #[test]
    fn test_paths_resolve_against_base() {
        let config = LoaderConfig::duckdb("relative.duckdb");
        let base = Path::new("/workspace");
        assert_eq!(
            config.get_duckdb_path(base),
            PathBuf::from("/workspace/relative.duckdb")
        );
        assert_eq!(
            config.get_staging_directory(base),
            PathBuf::from("/workspace").join(DEFAULT_STAGING_DIRECTORY)
        );

        let absolute = LoaderConfig::duckdb("/data/wh.duckdb");
        assert_eq!(absolute.get_duckdb_path(base), PathBuf::from("/data/wh.duckdb"));
    }

    #[test]
    fn test_identifier_policy() {
        let mut config = LoaderConfig::new();
        config.loader.escape_identifier_characters = true;
        let policy = config.identifier_policy(127);
        assert_eq!(policy.max_length, 127);
        assert!(policy.escape_characters);
        assert!(!policy.truncate);
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!("duckdb".parse::<BackendType>().unwrap(), BackendType::DuckDB);
        assert_eq!("postgres".parse::<BackendType>().unwrap(), BackendType::Postgres);
        assert_eq!("Redshift".parse::<BackendType>().unwrap(), BackendType::Postgres);
        assert!("invalid".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_sample_config_is_valid() {
        let sample = sample_config();
        let result = LoaderConfig::parse(sample);
        assert!(result.is_ok(), "Sample config should be valid TOML");
    }
}
