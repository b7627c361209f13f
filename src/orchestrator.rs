//! Scenario orchestrator.
//!
//! This module runs the selected scenarios one after the other: start the
//! proxy with the scenario's configuration, load the target page in a fresh
//! browser session, evaluate the captured log and tear the proxy down again.
//! Content failures are collected per scenario; only a port that cannot be
//! freed before the first scenario aborts the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use color_eyre::eyre::{Result, WrapErr};

use crate::analysis::{
    correlate, decode_all, validate, DecodeError, RawLogEntry, ResourceRecord, RunMetadata,
    RunReport, ScenarioExpectation, ScenarioOutcome, ValidationResult,
};
use crate::config::{GeneralConfig, ScenarioConfig};
use crate::proxy::ProxyControl;
use crate::session::{PageLoad, PageLoader};

/// Resources and verdict of one evaluated page load
#[derive(Debug, Clone)]
pub struct PageEvaluation {
    pub resources: Vec<ResourceRecord>,
    pub result: ValidationResult,
}

/// Decode, correlate and validate one captured page load.
///
/// The first response of a fresh session is the navigated document itself and
/// is not part of the scenario's resources.
pub fn evaluate_page_load(
    entries: &[RawLogEntry],
    expectation: &ScenarioExpectation,
) -> Result<PageEvaluation, DecodeError> {
    let events = decode_all(entries)?;
    let mut resources = correlate(&events);
    if !resources.is_empty() {
        resources.remove(0);
    }

    let result = validate(&resources, expectation);
    Ok(PageEvaluation { resources, result })
}

/// Write the raw log of a scenario to `<dir>/<scenario>.json`
pub fn dump_log(dir: &Path, scenario: &str, entries: &[RawLogEntry]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .wrap_err_with(|| format!("Failed to create log dump directory: {}", dir.display()))?;

    let path = dir.join(format!("{}.json", scenario));
    let json = serde_json::to_string_pretty(entries).wrap_err("Failed to serialize performance log")?;
    fs::write(&path, json)
        .wrap_err_with(|| format!("Failed to write performance log to {}", path.display()))?;

    Ok(path)
}

/// Drives scenarios through a proxy and a page loader
pub struct Orchestrator<P, L> {
    general: GeneralConfig,
    proxy: P,
    loader: L,
    dump_dir: Option<PathBuf>,
}

impl<P: ProxyControl, L: PageLoader> Orchestrator<P, L> {
    pub fn new(general: GeneralConfig, proxy: P, loader: L) -> Self {
        Self {
            general,
            proxy,
            loader,
            dump_dir: None,
        }
    }

    /// Keep the raw performance log of every completed page load
    pub fn with_dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dump_dir = dir;
        self
    }

    pub fn proxy(&self) -> &P {
        &self.proxy
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Run every scenario in order and collect their outcomes
    pub fn run(&mut self, scenarios: &[&ScenarioConfig], config_path: Option<&Path>) -> Result<RunReport> {
        let metadata = RunMetadata {
            started_at: chrono::Utc::now().to_rfc3339(),
            config_path: config_path.map(|p| p.display().to_string()),
            proxy_binary: self.general.proxy_binary.display().to_string(),
            target_url: self.general.target_url.clone(),
            scenario_count: scenarios.len(),
        };

        // A stale proxy from an earlier run would answer in place of ours
        self.proxy
            .release_port()
            .wrap_err("Failed to release the proxy port before the first scenario")?;

        let mut outcomes = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            outcomes.push(self.run_scenario(scenario));
        }

        Ok(RunReport {
            metadata,
            scenarios: outcomes,
        })
    }

    /// Run one scenario, always tearing the proxy down afterwards
    pub fn run_scenario(&mut self, scenario: &ScenarioConfig) -> ScenarioOutcome {
        log::info!("Running scenario {}", scenario.name);
        let started = Instant::now();

        let mut outcome = self.execute(scenario);

        if let Err(e) = self.proxy.stop() {
            log::warn!("Proxy teardown after {} failed: {}", scenario.name, e);
            outcome.success = false;
            outcome.diagnostics.push(format!("proxy teardown failed: {}", e));
        }

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        if outcome.success {
            log::info!("Scenario {} passed ({} resources)", scenario.name, outcome.resource_count);
        } else {
            log::info!("Scenario {} failed: {}", scenario.name, outcome.diagnostics.join("; "));
        }
        outcome
    }

    fn execute(&mut self, scenario: &ScenarioConfig) -> ScenarioOutcome {
        let proxy_config = scenario.resolved_proxy_config(&self.general.config_root);
        if let Err(e) = self.proxy.start(&proxy_config) {
            return ScenarioOutcome::failure(&scenario.name, format!("proxy failed to start: {}", e));
        }

        let load = self
            .loader
            .load(&self.general.target_url, self.general.navigation_timeout);
        let entries = match load {
            Ok(PageLoad::Completed(entries)) => entries,
            Ok(PageLoad::TimedOut) => {
                log::warn!("Connection timed out in {}", scenario.name);
                return ScenarioOutcome::timeout(&scenario.name);
            }
            Err(e) => {
                return ScenarioOutcome::failure(&scenario.name, format!("browser session failed: {}", e));
            }
        };

        if let Some(dir) = &self.dump_dir {
            match dump_log(dir, &scenario.name, &entries) {
                Ok(path) => log::debug!("Performance log written to {}", path.display()),
                Err(e) => log::warn!("{:#}", e),
            }
        }

        match evaluate_page_load(&entries, &scenario.expectation()) {
            Ok(evaluation) => ScenarioOutcome::from_validation(
                &scenario.name,
                evaluation.result,
                evaluation.resources.len(),
            ),
            Err(e) => ScenarioOutcome::failure(&scenario.name, e.to_string()),
        }
    }
}
