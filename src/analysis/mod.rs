//! Browser network log analysis for ALPaCA scenarios.
//!
//! This module decodes the browser's performance log, correlates its events
//! into per-request resource records and validates those records against a
//! scenario's padding and count contract.

pub mod types;
pub mod log_parser;
pub mod correlator;
pub mod padding;
pub mod validator;
pub mod report;

pub use types::*;
pub use log_parser::{decode_all, decode_log_entry, parse_performance_log, DecodeError};
pub use correlator::{correlate, Correlator};
pub use padding::parse_padding_target;
pub use validator::validate;
pub use report::{generate_json_report, print_summary};
