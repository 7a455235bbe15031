//! Config command - manage configuration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;

use inren_core::models::config::InrenConfig;
use inren_core::test_connection;

use super::{config_path, load_config, read_config};

/// Keys whose values are stored verbatim instead of parsed as JSON.
const STRING_KEYS: &[&str] = &[
    "api.api_endpoint",
    "api.api_key",
    "api.model",
    "api.custom_params",
    "naming.separator",
    "export.archive_name",
    "export.output_dir",
];

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration (API key masked)
    Show,

    /// Initialize a new configuration file
    Init(InitArgs),

    /// Get a specific configuration value
    Get {
        /// Configuration key (e.g., "api.model")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value
        value: String,
    },

    /// Show configuration file path
    Path,

    /// Restore the default configuration
    Reset,

    /// Check the API settings for problems
    Validate,

    /// Send a test request to the configured endpoint
    Test,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: ConfigArgs, explicit: Option<&str>) -> anyhow::Result<()> {
    let path = config_path(explicit);

    match args.command {
        ConfigCommand::Show => show_config(&path),
        ConfigCommand::Init(init_args) => init_config(init_args, &path),
        ConfigCommand::Get { key } => get_config(&path, &key),
        ConfigCommand::Set { key, value } => set_config(&path, &key, &value),
        ConfigCommand::Path => show_path(&path),
        ConfigCommand::Reset => reset_config(&path),
        ConfigCommand::Validate => validate_config(explicit),
        ConfigCommand::Test => test_config(explicit).await,
    }
}

fn show_config(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        println!(
            "{} No config file found, showing defaults.",
            style("ℹ").blue()
        );
    }
    let config = read_config(path, false)?;

    let mut json = serde_json::to_value(&config)?;
    if let Some(key) = json.pointer_mut("/api/api_key") {
        *key = Value::String(mask_key(&config.api.api_key));
    }

    println!("{}", serde_json::to_string_pretty(&json)?);

    Ok(())
}

fn init_config(args: InitArgs, default_path: &Path) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or_else(|| default_path.to_path_buf());

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    write_config(&output_path, &InrenConfig::default())?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );

    Ok(())
}

fn get_config(path: &Path, key: &str) -> anyhow::Result<()> {
    let config = read_config(path, false)?;
    let json = serde_json::to_value(&config)?;

    let mut current = &json;
    for part in key.split('.') {
        current = current
            .get(part)
            .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
    }

    println!("{}", serde_json::to_string_pretty(current)?);

    Ok(())
}

fn set_config(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let config = read_config(path, false)?;

    let parsed_value: Value = if STRING_KEYS.contains(&key) {
        Value::String(value.to_string())
    } else {
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
    };

    let mut json = serde_json::to_value(&config)?;
    // Unset optional keys are omitted when serialized.
    if let Some(api) = json.get_mut("api").and_then(Value::as_object_mut) {
        api.entry("custom_params").or_insert(Value::Null);
    }
    set_path(&mut json, key, parsed_value.clone())?;

    let config: InrenConfig = serde_json::from_value(json)
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))?;
    write_config(path, &config)?;

    let shown = if key.ends_with("api_key") {
        Value::String(mask_key(value))
    } else {
        parsed_value
    };
    println!(
        "{} Set {} = {}",
        style("✓").green(),
        key,
        serde_json::to_string(&shown)?
    );

    Ok(())
}

fn show_path(path: &Path) -> anyhow::Result<()> {
    println!("Configuration file: {}", path.display());

    if path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'inren config init' to create a configuration file.");
    }

    Ok(())
}

fn reset_config(path: &Path) -> anyhow::Result<()> {
    write_config(path, &InrenConfig::default())?;
    println!(
        "{} Configuration reset to defaults at {}",
        style("✓").green(),
        path.display()
    );
    Ok(())
}

fn validate_config(explicit: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(explicit)?;

    match config.api.validate() {
        Ok(()) => {
            println!("{} Configuration is valid", style("✓").green());
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", style("Configuration issues:").yellow());
            for issue in &e.issues {
                eprintln!("  - {}", issue);
            }
            Err(e.into())
        }
    }
}

async fn test_config(explicit: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(explicit)?;
    println!(
        "{} Testing {} with model {}...",
        style("ℹ").blue(),
        config.api.base_url(),
        config.api.model
    );

    let report = test_connection(&config.api).await;
    if report.success {
        println!("{} {}", style("✓").green(), report.message);
        Ok(())
    } else {
        anyhow::bail!("Connection failed: {}", report.message)
    }
}

fn write_config(path: &Path, config: &InrenConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    config.save(path)?;
    Ok(())
}

/// Set a dot-separated key inside a JSON object tree.
fn set_path(json: &mut Value, key: &str, value: Value) -> anyhow::Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let mut current = json;

    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            let Some(obj) = current.as_object_mut() else {
                anyhow::bail!("Cannot set value at non-object path");
            };
            if !obj.contains_key(*part) {
                anyhow::bail!("Configuration key not found: {}", key);
            }
            obj.insert((*part).to_string(), value);
            return Ok(());
        }
        current = current
            .get_mut(*part)
            .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
    }

    Ok(())
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n <= 8 => "*".repeat(n),
        n => format!(
            "{}...{}",
            chars[..3].iter().collect::<String>(),
            chars[n - 4..].iter().collect::<String>()
        ),
    }
}
