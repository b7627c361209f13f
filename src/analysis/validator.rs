//! Validation of one page load against a scenario's size and count contract.
//!
//! Checks run in a fixed order:
//!
//! 1. Padded size: every resource carrying a padding marker must have been
//!    decoded to exactly that many bytes. Only the first mismatch is reported.
//! 2. Inline count: number of `data:image` resources.
//! 3. Fake-image count: number of injected decoy images, exact or from a set.
//!
//! A size mismatch skips both count checks. The two count checks are
//! independent of each other and may both report.

use super::padding::parse_padding_target;
use super::types::*;

/// First resource whose decoded size differs from its padding target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeMismatch<'a> {
    pub record: &'a ResourceRecord,
    pub expected: u64,
}

pub fn first_size_mismatch(records: &[ResourceRecord]) -> Option<SizeMismatch<'_>> {
    records.iter().find_map(|record| {
        let expected = parse_padding_target(&record.url)?;
        (record.decoded_bytes != expected).then_some(SizeMismatch { record, expected })
    })
}

pub fn count_inline_images(records: &[ResourceRecord]) -> usize {
    records.iter().filter(|r| r.is_inline_image()).count()
}

pub fn count_fake_images(records: &[ResourceRecord]) -> usize {
    records.iter().filter(|r| r.is_fake_image()).count()
}

/// Validate the resources of one page load
pub fn validate(records: &[ResourceRecord], expectation: &ScenarioExpectation) -> ValidationResult {
    let mut result = ValidationResult::passed();

    if let Some(mismatch) = first_size_mismatch(records) {
        log::debug!(
            "Size mismatch on {}: expected {}, got {}",
            mismatch.record.url,
            mismatch.expected,
            mismatch.record.decoded_bytes
        );
        result.fail(format!(
            "expected size {}, got {}",
            mismatch.expected, mismatch.record.decoded_bytes
        ));
        return result;
    }

    let inlined = count_inline_images(records);
    if inlined != expectation.inline_count {
        result.fail(format!(
            "expected {} inlined objects, got {}",
            expectation.inline_count, inlined
        ));
    }

    let fakes = count_fake_images(records);
    if !expectation.fake_image_count.accepts(fakes) {
        result.fail(format!(
            "expected {} fake images, got {}",
            expectation.fake_image_count, fakes
        ));
    }

    result
}
