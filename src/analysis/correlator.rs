//! Reconstruction of per-request resource records from network events.
//!
//! The performance log is a flat, interleaved stream covering every
//! sub-resource of the page. Events of one request are not contiguous and are
//! tied together only by their `requestId`. Byte counters accumulate so that
//! resources delivered in several chunks (or finished twice) add up.

use std::collections::HashMap;

use serde_json::Value;

use super::types::*;

/// Running correlation state for a single page load
#[derive(Debug, Default)]
pub struct Correlator {
    records: Vec<ResourceRecord>,
    /// requestId -> index into `records` of the newest record with that id
    index: HashMap<String, usize>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the state
    pub fn observe(&mut self, event: &NetworkEvent) {
        match event.method.as_str() {
            RESPONSE_RECEIVED => self.on_response(event),
            DATA_RECEIVED => {
                if let Some((record, len)) = self.lookup(event, "dataLength") {
                    record.decoded_bytes = record.decoded_bytes.saturating_add(len);
                }
            }
            LOADING_FINISHED => {
                if let Some((record, len)) = self.lookup(event, "encodedDataLength") {
                    record.encoded_bytes = record.encoded_bytes.saturating_add(len);
                }
            }
            _ => {}
        }
    }

    fn on_response(&mut self, event: &NetworkEvent) {
        let Some(Value::Object(response)) = event.params.get("response") else {
            return;
        };
        let field = |key: &str| {
            response
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let request_id = event.str_param("requestId").unwrap_or_default().to_string();

        // A repeated id (redirect, retry) opens an independent record
        self.index.insert(request_id.clone(), self.records.len());
        self.records
            .push(ResourceRecord::new(request_id, field("url"), field("statusText")));
    }

    /// Record targeted by a data/finish event, together with its byte counter
    fn lookup(&mut self, event: &NetworkEvent, counter: &str) -> Option<(&mut ResourceRecord, u64)> {
        let request_id = event.str_param("requestId")?;
        let len = event.byte_count(counter)?;
        let idx = *self.index.get(request_id)?;
        self.records.get_mut(idx).map(|record| (record, len))
    }

    /// Number of records opened so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Finalize, returning records in the order their responses were first seen
    pub fn finish(self) -> Vec<ResourceRecord> {
        self.records
    }
}

/// Correlate a closed batch of events
pub fn correlate<'a, I>(events: I) -> Vec<ResourceRecord>
where
    I: IntoIterator<Item = &'a NetworkEvent>,
{
    let mut correlator = Correlator::new();
    for event in events {
        correlator.observe(event);
    }
    log::debug!("Correlated {} resource records", correlator.len());
    correlator.finish()
}
