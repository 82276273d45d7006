//! `kapi-relay init` — write the built-in policy to a file.
//!
//! The canonical two-upstream policy is serialized in the requested
//! format so operators can add or adjust upstreams without a rebuild.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::config::model::Config;
use crate::error::RelayError;

const HEADER: &str = "kapi-relay policy: allowlisted upstreams and their protocol quirks";

pub fn execute(args: &InitArgs) -> Result<(), RelayError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("kapi-relay.{}", args.format.extension())));

    if output.exists() {
        return Err(RelayError::FileExists { path: output });
    }

    let content = render(&Config::default(), &args.format)?;
    std::fs::write(&output, content)?;
    println!("Created {}", output.display());
    Ok(())
}

/// Serialize a policy in the given format.
pub fn render(config: &Config, format: &ConfigFormat) -> Result<String, RelayError> {
    let serialize_err = |source: Box<dyn std::error::Error + Send + Sync>| RelayError::ConfigParse {
        path: format!("<{}>", format.extension()),
        source,
    };

    match format {
        #[cfg(feature = "yaml")]
        ConfigFormat::Yaml => serde_yml::to_string(config)
            .map(|body| format!("# {HEADER}\n{body}"))
            .map_err(|e| serialize_err(Box::new(e))),

        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map(|body| body + "\n")
            .map_err(|e| serialize_err(Box::new(e))),

        #[cfg(feature = "toml")]
        ConfigFormat::Toml => toml::to_string_pretty(config)
            .map(|body| format!("# {HEADER}\n{body}"))
            .map_err(|e| serialize_err(Box::new(e))),

        #[allow(unreachable_patterns)]
        other => Err(RelayError::UnsupportedFormat(other.extension().to_string())),
    }
}
