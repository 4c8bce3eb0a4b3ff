//! JSON schema and example `config.toml` generation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use schemars::generate::SchemaSettings;
use serde_json::json;

use crate::config::{AppConfig, CredentialConfig};

/// Generated schema filename.
pub const SCHEMA_FILENAME: &str = "config.schema.json";

/// Generated config filename.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Placeholder credential written to the example config.
const EXAMPLE_CORP_ID: &str = "ww0000000000000000";
const EXAMPLE_AGENT_ID: u64 = 1_000_002;

fn schema_url(repo_url: &str) -> String {
    format!("{repo_url}/schemas/{SCHEMA_FILENAME}")
}

/// Generate the JSON schema for `AppConfig` (draft-07).
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn generate_schema(project_name: &str, repo_url: &str) -> Result<String> {
    let mut schema = SchemaSettings::draft07()
        .into_generator()
        .into_root_schema_for::<AppConfig>();
    schema.insert("$id".to_string(), json!(schema_url(repo_url)));
    schema.insert(
        "title".to_string(),
        json!(format!("{project_name} configuration")),
    );
    serde_json::to_string_pretty(&schema).context("serializing JSON schema")
}

/// Generate an example TOML configuration with a placeholder credential.
///
/// The secret is left out; it belongs in the environment.
///
/// # Errors
///
/// Returns an error if TOML serialization fails.
pub fn generate_example_config(project_name: &str, repo_url: &str) -> Result<String> {
    let example = AppConfig {
        schema: Some(schema_url(repo_url)),
        credential: CredentialConfig {
            corp_id: Some(EXAMPLE_CORP_ID.to_string()),
            corp_secret: None,
            agent_id: Some(EXAMPLE_AGENT_ID),
        },
        ..AppConfig::default()
    };
    let body = toml::to_string_pretty(&example).context("serializing example config to TOML")?;

    Ok(format!(
        "# Example configuration for {project_name}.\n\
         # Set the application secret with COWECHAT__CREDENTIAL__CORP_SECRET.\n\n{body}"
    ))
}

/// Write the schema and example config into `output_dir`.
///
/// # Errors
///
/// Returns an error if directory creation or file writing fails.
pub fn write_generated_files(output_dir: &Path, project_name: &str, repo_url: &str) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory: {}", output_dir.display()))?;

    for (name, contents) in [
        (SCHEMA_FILENAME, generate_schema(project_name, repo_url)?),
        (CONFIG_FILENAME, generate_example_config(project_name, repo_url)?),
    ] {
        let path = output_dir.join(name);
        fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::APP_NAME;

    const REPO_URL: &str = "https://github.com/nikozhangwj/cowechat-rs";

    #[test]
    fn schema_describes_delivery_settings() {
        let schema = generate_schema(APP_NAME, REPO_URL).expect("schema generation failed");
        let value: serde_json::Value = serde_json::from_str(&schema).expect("schema is JSON");
        assert_eq!(value["title"], "cowechat configuration");
        assert_eq!(
            value["$id"],
            "https://github.com/nikozhangwj/cowechat-rs/schemas/config.schema.json"
        );
        assert!(schema.contains("retry_count"));
        assert!(schema.contains("LogLevel"));
    }

    #[test]
    fn example_config_loads_without_secret() {
        let config = generate_example_config(APP_NAME, REPO_URL).expect("config generation failed");
        assert!(config.contains("$schema"));
        assert!(config.contains("[delivery]"));
        assert!(!config.contains("corp_secret"));

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, &config).expect("write example");
        let loaded = AppConfig::load_from_path(&path).expect("example parses");
        assert_eq!(loaded.credential.corp_id.as_deref(), Some(EXAMPLE_CORP_ID));
        assert_eq!(loaded.credential.agent_id, Some(EXAMPLE_AGENT_ID));
        assert!(loaded.credential.corp_secret.is_none());
    }

    #[test]
    fn generated_files_land_in_output_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_generated_files(dir.path(), APP_NAME, REPO_URL).expect("write files");
        assert!(dir.path().join(SCHEMA_FILENAME).is_file());
        assert!(dir.path().join(CONFIG_FILENAME).is_file());
    }
}
