use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use env_logger::Env;
use log::info;

use alpaca_harness::analysis::{self, report::format_outcome_line, ScenarioOutcome};
use alpaca_harness::config::Config;
use alpaca_harness::config_loader::{self, CliOverrides};
use alpaca_harness::orchestrator::{evaluate_page_load, Orchestrator};
use alpaca_harness::proxy::NginxProxy;
use alpaca_harness::session::WebDriverSession;

/// Exit status for setup errors that prevented any verdict
const EXIT_FATAL: i32 = 2;

/// End-to-end verification harness for the ALPaCA nginx padding module
#[derive(Parser, Debug)]
#[command(name = "alpaca-harness")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the scenario configuration YAML file (built-in scenarios if omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run scenarios against a live proxy and browser
    Run {
        /// Only run the named scenario (repeatable)
        #[arg(short, long)]
        scenario: Vec<String>,

        /// Path to the nginx binary built with the ALPaCA module
        #[arg(long)]
        proxy_binary: Option<PathBuf>,

        /// Directory the scenario proxy configs are resolved against
        #[arg(long)]
        config_root: Option<PathBuf>,

        /// Navigation timeout, e.g. "10s"
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// chromedriver endpoint
        #[arg(long)]
        webdriver_url: Option<String>,

        /// Run the browser with a visible window
        #[arg(long)]
        show_browser: bool,

        /// Write a JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Keep each scenario's raw performance log in this directory
        #[arg(long)]
        dump_logs: Option<PathBuf>,
    },

    /// Validate a previously captured performance log
    CheckLog {
        /// Performance log as written by `run --dump-logs`
        #[arg(short, long)]
        log: PathBuf,

        /// Scenario whose expectations apply
        #[arg(short, long)]
        scenario: String,
    },

    /// List the configured scenarios
    List,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("Failed to install error handler: {}", e);
    }

    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:?}", e);
            process::exit(EXIT_FATAL);
        }
    }
}

/// Returns whether every checked scenario passed
fn run(cli: Cli) -> Result<bool> {
    let mut config = config_loader::load_or_default(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.general.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Run {
            scenario,
            proxy_binary,
            config_root,
            timeout,
            webdriver_url,
            show_browser,
            report,
            dump_logs,
        } => {
            let overrides = CliOverrides {
                proxy_binary,
                config_root,
                navigation_timeout: timeout,
                webdriver_url,
                show_browser,
            };
            config_loader::apply_overrides(&mut config, &overrides)?;
            run_scenarios(&config, cli.config, &scenario, report, dump_logs)
        }
        Commands::CheckLog { log, scenario } => check_log(&config, &log, &scenario),
        Commands::List => {
            list_scenarios(&config);
            Ok(true)
        }
    }
}

fn run_scenarios(
    config: &Config,
    config_path: Option<PathBuf>,
    names: &[String],
    report_path: Option<PathBuf>,
    dump_dir: Option<PathBuf>,
) -> Result<bool> {
    let general = &config.general;
    let selected = config.select_scenarios(names)?;

    info!("Starting ALPaCA harness with {} scenarios", selected.len());
    info!("Proxy binary: {:?}", general.proxy_binary);
    info!("Target URL: {}", general.target_url);

    let proxy = NginxProxy::from_config(general);
    proxy
        .validate_binary()
        .wrap_err("Cannot run scenarios without the proxy binary")?;

    let session = WebDriverSession::new(&general.webdriver_url, general.headless, general.navigation_timeout)
        .wrap_err("Failed to create WebDriver client")?;

    let mut orchestrator = Orchestrator::new(general.clone(), proxy, session).with_dump_dir(dump_dir);
    let report = orchestrator.run(&selected, config_path.as_deref())?;

    if let Some(path) = &report_path {
        analysis::generate_json_report(&report, path)?;
    }
    analysis::print_summary(&report);

    Ok(report.all_passed())
}

fn check_log(config: &Config, log_path: &std::path::Path, name: &str) -> Result<bool> {
    let scenario = config
        .scenario(name)
        .ok_or_else(|| eyre!("Unknown scenario '{}'", name))?;

    let text = fs::read_to_string(log_path)
        .wrap_err_with(|| format!("Failed to read performance log: {}", log_path.display()))?;
    let entries = analysis::parse_performance_log(&text)
        .wrap_err_with(|| format!("Failed to parse performance log: {}", log_path.display()))?;
    info!("Loaded {} log entries from {}", entries.len(), log_path.display());

    let outcome = match evaluate_page_load(&entries, &scenario.expectation()) {
        Ok(evaluation) => {
            ScenarioOutcome::from_validation(name, evaluation.result, evaluation.resources.len())
        }
        Err(e) => ScenarioOutcome::failure(name, e.to_string()),
    };

    for diagnostic in &outcome.diagnostics {
        println!("  {}: {}", outcome.name, diagnostic);
    }
    println!("{}", format_outcome_line(&outcome, false));
    Ok(outcome.success)
}

fn list_scenarios(config: &Config) {
    for scenario in &config.scenarios {
        println!(
            "{:17} {:40} inline={} fake_images={}",
            scenario.name,
            scenario.proxy_config.display().to_string(),
            scenario.inline_count,
            scenario.fake_image_count
        );
    }
}
