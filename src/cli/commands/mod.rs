//! CLI command implementations
//!
//! Every command loads the configuration, opens the configured warehouse and
//! stager, and drives a [`BatchWriter`].

pub mod activate;
pub mod init;
pub mod load;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use target_redshift::database::config::CONFIG_FILENAME;
use target_redshift::{
    BackendType, BatchWriter, DuckDbDialect, LoaderConfig, ObjectStager, RedshiftDialect,
    StagerType, WarehouseConnection, WarehouseDialect,
};

use crate::error::CliError;

/// Load the configuration from a directory or an explicit file
///
/// Returns the configuration with environment overrides applied, and the
/// directory relative paths in it are resolved against.
pub fn load_config(path: &Path) -> Result<(LoaderConfig, PathBuf), CliError> {
    if path.is_file() {
        let mut config = LoaderConfig::load_file(path)
            .map_err(|e| CliError::IoError(format!("Failed to load config: {}", e)))?;
        config.apply_env_overrides();
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        return Ok((config, base));
    }

    if !path.exists() {
        return Err(CliError::FileNotFound(path.join(CONFIG_FILENAME)));
    }

    let config = LoaderConfig::load(path)
        .map_err(|e| CliError::IoError(format!("Failed to load config: {}", e)))?;
    Ok((config, path.to_path_buf()))
}

async fn connect(config: &LoaderConfig, base: &Path) -> Result<Arc<dyn WarehouseConnection>, CliError> {
    match config.warehouse.backend {
        BackendType::DuckDB => {
            #[cfg(feature = "duckdb-backend")]
            {
                use target_redshift::DuckDBBackend;

                let path = config.get_duckdb_path(base);
                let backend = DuckDBBackend::new(&path).map_err(|e| {
                    CliError::DatabaseError(format!("Failed to open {}: {}", path.display(), e))
                })?;
                info!("Opened DuckDB warehouse at {}", path.display());
                let connection: Arc<dyn WarehouseConnection> = Arc::new(backend);
                Ok(connection)
            }
            #[cfg(not(feature = "duckdb-backend"))]
            {
                let _ = base;
                Err(CliError::InvalidArgument(
                    "DuckDB support not enabled. Enable 'duckdb-backend' feature.".to_string(),
                ))
            }
        }
        BackendType::Postgres => {
            #[cfg(feature = "postgres-backend")]
            {
                use target_redshift::PostgresBackend;

                let connection_string = config.get_connection_string().ok_or_else(|| {
                    CliError::InvalidArgument("Warehouse connection string not configured".to_string())
                })?;
                let backend = PostgresBackend::new(connection_string)
                    .await
                    .map_err(|e| CliError::DatabaseError(e.to_string()))?;
                info!("Connected to {}", backend.connection_string_masked());
                let connection: Arc<dyn WarehouseConnection> = Arc::new(backend);
                Ok(connection)
            }
            #[cfg(not(feature = "postgres-backend"))]
            {
                Err(CliError::InvalidArgument(
                    "Redshift support not enabled. Enable 'postgres-backend' feature.".to_string(),
                ))
            }
        }
    }
}

fn dialect(config: &LoaderConfig) -> Arc<dyn WarehouseDialect> {
    match config.warehouse.backend {
        BackendType::DuckDB => Arc::new(DuckDbDialect),
        BackendType::Postgres => Arc::new(RedshiftDialect::new(config.loader.default_column_length)),
    }
}

async fn stager(config: &LoaderConfig, base: &Path) -> Result<Arc<dyn ObjectStager>, CliError> {
    match config.staging.stager {
        StagerType::Local => {
            use target_redshift::LocalStager;

            let stager = LocalStager::new(
                config.get_staging_directory(base),
                config.staging.key_prefix.clone(),
            )
            .map_err(|e| CliError::IoError(e.to_string()))?;
            let stager: Arc<dyn ObjectStager> = Arc::new(stager);
            Ok(stager)
        }
        StagerType::S3 => {
            #[cfg(feature = "s3")]
            {
                use target_redshift::{AccessCredentials, S3Stager, S3StagingConfig};

                let staging = &config.staging;
                let credentials = match (&staging.aws_access_key_id, &staging.aws_secret_access_key) {
                    (Some(key), Some(secret)) => Some(
                        AccessCredentials::new(key.clone(), secret.clone())
                            .with_session_token(staging.aws_session_token.clone()),
                    ),
                    _ => None,
                };

                let stager = S3Stager::new(S3StagingConfig {
                    bucket: staging.bucket.clone(),
                    key_prefix: staging.key_prefix.clone(),
                    region: staging.region.clone(),
                    endpoint: staging.endpoint.clone(),
                    force_path_style: staging.force_path_style,
                    credentials,
                })
                .await
                .map_err(target_redshift::LoaderError::from)?;
                let stager: Arc<dyn ObjectStager> = Arc::new(stager);
                Ok(stager)
            }
            #[cfg(not(feature = "s3"))]
            {
                Err(CliError::InvalidArgument(
                    "S3 staging not enabled. Enable 's3' feature.".to_string(),
                ))
            }
        }
    }
}

/// Open the configured warehouse and stager
pub async fn build_writer(config: &LoaderConfig, base: &Path) -> Result<BatchWriter, CliError> {
    let connection = connect(config, base).await?;
    let stager = stager(config, base).await?;
    Ok(BatchWriter::new(connection, dialect(config), stager, config))
}
