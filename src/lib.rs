//! # alpaca-harness - End-to-end verification for the ALPaCA nginx module
//!
//! ALPaCA pads the objects of a web page (and may inline images or inject
//! decoy images) so that an observer of encrypted traffic cannot fingerprint
//! the page by object sizes. This library checks that a padding-enabled nginx
//! actually does so, by loading a test page in a headless browser and
//! inspecting the DevTools network log of the load.
//!
//! ## Architecture
//!
//! - `analysis`: decoding of the browser performance log, request
//!   correlation, padding-target parsing, validation and reporting
//! - `config`: scenario table and harness settings
//! - `config_loader`: YAML loading and CLI overrides
//! - `session`: headless Chrome sessions over WebDriver
//! - `proxy`: nginx process lifecycle on the fixed test port
//! - `orchestrator`: runs scenarios one after the other
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use alpaca_harness::{config_loader, orchestrator::Orchestrator};
//! use alpaca_harness::proxy::NginxProxy;
//! use alpaca_harness::session::WebDriverSession;
//!
//! let config = config_loader::load_or_default(None)?;
//! let general = &config.general;
//!
//! let proxy = NginxProxy::from_config(general);
//! let session = WebDriverSession::new(&general.webdriver_url, general.headless, general.navigation_timeout)?;
//!
//! let scenarios: Vec<_> = config.scenarios.iter().collect();
//! let mut orchestrator = Orchestrator::new(general.clone(), proxy, session);
//! let report = orchestrator.run(&scenarios, None)?;
//! alpaca_harness::analysis::print_summary(&report);
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   proxy_binary: "../build/nginx-1.18.0/objs/nginx"
//!   navigation_timeout: "10s"
//!
//! scenarios:
//!   - name: prob_fake_imgs
//!     proxy_config: Probabilistic/nginx_fake_imgs.conf
//!     inline_count: 0
//!     fake_image_count: [1, 2, 3, 4]
//! ```
//!
//! ## Error Handling
//!
//! Domain failures are `thiserror` enums (`DecodeError`, `SessionError`,
//! `ProxyError`, `ValidationError`). Application-level functions return
//! `color_eyre::Result` with context attached.

pub mod analysis;
pub mod config;
pub mod config_loader;
pub mod orchestrator;
pub mod proxy;
pub mod session;
