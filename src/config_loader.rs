use crate::config::Config;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Load and parse the scenario configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration file '{}'", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration file '{}'", config_path.display()))?;

    config.validate()?;

    info!("Loaded {} scenarios", config.scenarios.len());
    Ok(config)
}

/// Load the configuration file if one was given, otherwise the built-in scenario table
pub fn load_or_default(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => load_config(path),
        None => {
            info!("No configuration file given, using built-in scenarios");
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// CLI arguments that override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub proxy_binary: Option<std::path::PathBuf>,
    pub config_root: Option<std::path::PathBuf>,
    pub navigation_timeout: Option<std::time::Duration>,
    pub webdriver_url: Option<String>,
    pub show_browser: bool,
}

/// Apply CLI overrides to a loaded configuration
pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) -> Result<()> {
    let general = &mut config.general;

    if let Some(binary) = &overrides.proxy_binary {
        info!("Overriding proxy binary: {:?}", binary);
        general.proxy_binary = binary.clone();
    }
    if let Some(root) = &overrides.config_root {
        info!("Overriding config root: {:?}", root);
        general.config_root = root.clone();
    }
    if let Some(timeout) = overrides.navigation_timeout {
        info!("Overriding navigation timeout: {:?}", timeout);
        general.navigation_timeout = timeout;
    }
    if let Some(url) = &overrides.webdriver_url {
        info!("Overriding WebDriver URL: {}", url);
        general.webdriver_url = url.clone();
    }
    if overrides.show_browser {
        general.headless = false;
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}
