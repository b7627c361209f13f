use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::types::{FakeImageExpectation, ScenarioExpectation};

/// Harness configuration: general settings plus the scenario table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<ScenarioConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            scenarios: default_scenarios(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let general = &self.general;

        if general.proxy_binary.as_os_str().is_empty() {
            return Err(ValidationError::InvalidGeneral(
                "proxy_binary cannot be empty".to_string(),
            ));
        }
        if general.target_url.is_empty() {
            return Err(ValidationError::InvalidGeneral(
                "target_url cannot be empty".to_string(),
            ));
        }
        if general.port == 0 {
            return Err(ValidationError::InvalidGeneral(
                "port must be non-zero".to_string(),
            ));
        }
        for (name, timeout) in [
            ("navigation_timeout", general.navigation_timeout),
            ("proxy_start_timeout", general.proxy_start_timeout),
            ("port_release_timeout", general.port_release_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ValidationError::InvalidGeneral(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.scenarios.is_empty() {
            return Err(ValidationError::InvalidScenario(
                "at least one scenario must be defined".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !seen.insert(scenario.name.as_str()) {
                return Err(ValidationError::InvalidScenario(format!(
                    "duplicate scenario name '{}'",
                    scenario.name
                )));
            }
        }

        Ok(())
    }

    /// Scenarios selected by name, in configuration order.
    ///
    /// An empty filter selects everything.
    pub fn select_scenarios(&self, names: &[String]) -> Result<Vec<&ScenarioConfig>, ValidationError> {
        if let Some(unknown) = names
            .iter()
            .find(|name| !self.scenarios.iter().any(|s| &s.name == *name))
        {
            return Err(ValidationError::UnknownScenario(unknown.clone()));
        }

        Ok(self
            .scenarios
            .iter()
            .filter(|s| names.is_empty() || names.contains(&s.name))
            .collect())
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioConfig> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

/// Settings shared by every scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// nginx binary built with the ALPaCA module
    pub proxy_binary: PathBuf,
    /// Directory scenario `proxy_config` paths are relative to
    pub config_root: PathBuf,
    pub target_url: String,
    /// Port the proxy listens on; released between scenarios
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub proxy_start_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub port_release_timeout: Duration,
    /// Base URL of a running chromedriver
    pub webdriver_url: String,
    pub headless: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            proxy_binary: PathBuf::from("../build/nginx-1.18.0/objs/nginx"),
            config_root: PathBuf::from("."),
            target_url: "http://localhost:8888".to_string(),
            port: 8888,
            navigation_timeout: Duration::from_secs(10),
            proxy_start_timeout: Duration::from_secs(10),
            port_release_timeout: Duration::from_secs(10),
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            log_level: Some("info".to_string()),
        }
    }
}

/// One proxy configuration and the page-load contract it must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub proxy_config: PathBuf,
    pub inline_count: usize,
    pub fake_image_count: FakeImageExpectation,
}

impl ScenarioConfig {
    pub fn new(
        name: &str,
        proxy_config: &str,
        inline_count: usize,
        fake_image_count: FakeImageExpectation,
    ) -> Self {
        Self {
            name: name.to_string(),
            proxy_config: PathBuf::from(proxy_config),
            inline_count,
            fake_image_count,
        }
    }

    pub fn expectation(&self) -> ScenarioExpectation {
        ScenarioExpectation {
            inline_count: self.inline_count,
            fake_image_count: self.fake_image_count.clone(),
        }
    }

    /// Proxy config path, resolved against `root` when relative
    pub fn resolved_proxy_config(&self, root: &Path) -> PathBuf {
        if self.proxy_config.is_absolute() {
            self.proxy_config.clone()
        } else {
            root.join(&self.proxy_config)
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidScenario(
                "scenario name cannot be empty".to_string(),
            ));
        }
        if self.proxy_config.as_os_str().is_empty() {
            return Err(ValidationError::InvalidScenario(format!(
                "proxy_config cannot be empty for scenario '{}'",
                self.name
            )));
        }
        if let FakeImageExpectation::OneOf(set) = &self.fake_image_count {
            if set.is_empty() {
                return Err(ValidationError::InvalidScenario(format!(
                    "fake_image_count set cannot be empty for scenario '{}'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// The deterministic and probabilistic ALPaCA test configurations
pub fn default_scenarios() -> Vec<ScenarioConfig> {
    use FakeImageExpectation::{Exact, OneOf};

    vec![
        ScenarioConfig::new("deter_simple", "Deterministic/nginx_simple.conf", 0, Exact(2)),
        ScenarioConfig::new("deter_fake_imgs", "Deterministic/nginx_fake_imgs.conf", 0, Exact(3)),
        ScenarioConfig::new("deter_inline_all", "Deterministic/nginx_inline_all.conf", 3, Exact(0)),
        ScenarioConfig::new("deter_inline_some", "Deterministic/nginx_inline_some.conf", 2, Exact(0)),
        ScenarioConfig::new("prob_simple", "Probabilistic/nginx_simple.conf", 0, Exact(2)),
        ScenarioConfig::new("prob_fake_imgs", "Probabilistic/nginx_fake_imgs.conf", 0, OneOf(vec![1, 2, 3, 4])),
        ScenarioConfig::new("prob_inline_all", "Probabilistic/nginx_inline_all.conf", 3, Exact(0)),
        ScenarioConfig::new("prob_inline_some", "Probabilistic/nginx_inline_some.conf", 2, Exact(0)),
    ]
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid scenario configuration: {0}")]
    InvalidScenario(String),
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
}
