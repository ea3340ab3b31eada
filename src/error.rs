use wasm_bindgen::JsValue;

/// Errors raised while turning an activity document into its output map.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Document contains no activities")]
    EmptyDocument,

    #[error("Unknown activity format '{0}'")]
    UnknownFormat(String),

    #[error("Failed to render output: {0}")]
    Render(#[from] serde_json::Error),
}

impl ParseError {
    pub(crate) fn missing(element: &str, parent: &str) -> Self {
        Self::MalformedDocument(format!("missing <{element}> in <{parent}>"))
    }

    pub(crate) fn invalid_time(value: &str) -> Self {
        Self::MalformedDocument(format!("invalid timestamp '{value}'"))
    }

    pub(crate) fn truncated(element: &str) -> Self {
        Self::MalformedDocument(format!("unexpected end of document inside <{element}>"))
    }
}

impl From<quick_xml::Error> for ParseError {
    fn from(e: quick_xml::Error) -> Self {
        Self::MalformedDocument(format!("XML parse error: {e}"))
    }
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::MalformedDocument(format!("XML attribute error: {e}"))
    }
}

impl From<ParseError> for JsValue {
    fn from(e: ParseError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
