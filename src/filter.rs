//! Record-level glue: read the raw document from a record field, parse it,
//! and merge the rendered output back into the record.

use serde_json::{Map, Value as JsonValue};

use crate::error::ParseError;
use crate::options::FilterOptions;

/// Tag appended to a record's `tags` when its document cannot be parsed.
pub const FAILURE_TAG: &str = "_gpxparsefailure";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The source field is absent; the record is untouched.
    Skipped,
    /// The output was merged into the record.
    Matched,
    /// Parsing failed and the record was tagged.
    Failed,
}

/// Enrich `record` in place according to `opts`.
pub fn apply(record: &mut Map<String, JsonValue>, opts: &FilterOptions) -> FilterOutcome {
    tracing::debug!(source = %opts.source, format = %opts.format, "running activity filter");

    let Some(raw) = record.get(&opts.source) else {
        return FilterOutcome::Skipped;
    };

    let result = match raw.as_str() {
        Some(xml) => crate::parse_document(opts.format, xml).and_then(|doc| doc.render()),
        None => Err(ParseError::MalformedDocument(format!(
            "field '{}' is not a string",
            opts.source
        ))),
    };

    match result {
        Ok(output) => {
            match &opts.target {
                Some(target) => {
                    record.insert(target.clone(), JsonValue::Object(output));
                }
                None => record.extend(output),
            }
            tracing::debug!(source = %opts.source, "record enriched with activity data");
            FilterOutcome::Matched
        }
        Err(error) => {
            tracing::warn!(
                source = %opts.source,
                raw = %raw,
                error = %error,
                "trouble parsing activity document"
            );
            add_failure_tag(record);
            FilterOutcome::Failed
        }
    }
}

fn add_failure_tag(record: &mut Map<String, JsonValue>) {
    let tags = record
        .entry("tags")
        .or_insert_with(|| JsonValue::Array(Vec::new()));
    if !tags.is_array() {
        let existing = std::mem::take(tags);
        *tags = JsonValue::Array(vec![existing]);
    }
    if let JsonValue::Array(tags) = tags
        && !tags.iter().any(|t| t == FAILURE_TAG)
    {
        tags.push(JsonValue::String(FAILURE_TAG.to_string()));
    }
}
