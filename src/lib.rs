pub mod error;
pub mod filter;
pub mod gpx;
pub mod metrics;
pub mod model;
pub mod options;
pub mod tcx;
mod xml;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::error::ParseError;
use crate::metrics::ActivityDocument;
use crate::model::Activity;
use crate::options::{FilterOptions, Format};

/// Parse a document of the given format into its activities.
pub fn parse(format: Format, xml: &str) -> Result<Vec<Activity>, ParseError> {
    match format {
        Format::Gpx => gpx::parse(xml),
        Format::Tcx => tcx::parse(xml),
    }
}

/// Parse a document and derive its serialized metrics in one step.
pub fn parse_document(format: Format, xml: &str) -> Result<ActivityDocument, ParseError> {
    let activities = parse(format, xml)?;
    metrics::serialize(format, &activities)
}

/// Parse a GPX or TCX string, returned as a JS object.
#[wasm_bindgen(js_name = parseActivities)]
pub fn parse_activities(xml: &str, format: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let doc = parse_document(format.parse()?, xml)?;
    serde_wasm_bindgen::to_value(&doc).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Parse a GPX or TCX string, returned as a JSON string.
#[wasm_bindgen(js_name = parseActivitiesString)]
pub fn parse_activities_string(xml: &str, format: &str) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let map = parse_document(format.parse()?, xml)?.render()?;
    serde_json::to_string(&map).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Run the record filter over a JS object and return the enriched record.
/// Parse failures are reported through the record's tags, not as errors.
#[wasm_bindgen(js_name = filterRecord)]
pub fn filter_record(record: JsValue, options: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let mut record: serde_json::Map<String, serde_json::Value> =
        serde_wasm_bindgen::from_value(record).map_err(|e| JsValue::from_str(&e.to_string()))?;
    filter::apply(&mut record, &opts);
    record
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

fn parse_options(options: JsValue) -> Result<FilterOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(FilterOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
