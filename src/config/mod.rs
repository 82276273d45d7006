//! Policy table loading and validation.
//!
//! The policy is read once at startup, either from a file (format chosen by
//! extension) or from the built-in canonical table, validated, and frozen
//! behind an `Arc`. [`ConfigVersion`] is a SHA-256 digest of the source text
//! so `/health` can tell operators which policy a running instance uses.

pub mod model;
pub mod validation;

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::RelayError;
use model::Config;
use validation::validate;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
}

impl ConfigVersion {
    /// First eight hex digits, enough to tell deployments apart.
    #[must_use]
    pub fn short(&self) -> &str {
        match self {
            Self::Hash(h) => h.get(..8).unwrap_or(h),
        }
    }
}

#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    pub version: ConfigVersion,
    pub source_name: String,
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Parse a policy string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Config, RelayError> {
    let parse_err = |source: Box<dyn std::error::Error + Send + Sync>| RelayError::ConfigParse {
        path: path_display.to_string(),
        source,
    };

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| parse_err(Box::new(e))),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| parse_err(Box::new(e))),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| parse_err(Box::new(e))),

        other => Err(RelayError::UnsupportedFormat(other.to_string())),
    }
}

/// Read, parse and validate a policy file.
pub async fn load_file(path: &Path) -> Result<LoadedConfig, RelayError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RelayError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            RelayError::Io(e)
        }
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let config = parse_config_str(ext, &content, &path.display().to_string())?;
    validate(&config).map_err(|errors| RelayError::ConfigValidation { errors })?;

    Ok(LoadedConfig {
        config,
        version: ConfigVersion::Hash(sha256_hex(content.as_bytes())),
        source_name: path.display().to_string(),
    })
}

/// The canonical policy compiled into the binary.
pub fn builtin() -> Result<LoadedConfig, RelayError> {
    let config = Config::default();
    let serialized = serde_json::to_vec(&config).map_err(|e| RelayError::ConfigParse {
        path: "builtin".into(),
        source: Box::new(e),
    })?;
    Ok(LoadedConfig {
        version: ConfigVersion::Hash(sha256_hex(&serialized)),
        config,
        source_name: "builtin".into(),
    })
}
