use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Source document format. Chosen by the caller, never sniffed from content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Gpx,
    Tcx,
}

impl FromStr for Format {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpx" => Ok(Self::Gpx),
            "tcx" => Ok(Self::Tcx),
            other => Err(ParseError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gpx => "gpx",
            Self::Tcx => "tcx",
        })
    }
}

/// Options for enriching a record with a parsed activity document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    /// Record field holding the raw XML (default: "message")
    #[serde(default = "default_source")]
    pub source: String,

    /// Field to store the output under; merged at the root when absent.
    /// An existing value at `target` is overwritten.
    #[serde(default)]
    pub target: Option<String>,

    /// Format of the source document (default: gpx)
    #[serde(default)]
    pub format: Format,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            source: default_source(),
            target: None,
            format: Format::default(),
        }
    }
}

fn default_source() -> String {
    "message".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_str() {
        assert_eq!("gpx".parse::<Format>().unwrap(), Format::Gpx);
        assert_eq!(" TCX ".parse::<Format>().unwrap(), Format::Tcx);
        assert!(matches!(
            "fit".parse::<Format>(),
            Err(ParseError::UnknownFormat(name)) if name == "fit"
        ));
        assert_eq!(Format::Tcx.to_string(), "tcx");
    }

    #[test]
    fn test_options_defaults() {
        let opts: FilterOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, FilterOptions::default());
        assert_eq!(opts.source, "message");
        assert_eq!(opts.format, Format::Gpx);
        assert!(opts.target.is_none());
    }

    #[test]
    fn test_options_full() {
        let opts: FilterOptions =
            serde_json::from_str(r#"{"source":"payload","target":"doc","format":"tcx"}"#).unwrap();
        assert_eq!(opts.source, "payload");
        assert_eq!(opts.target.as_deref(), Some("doc"));
        assert_eq!(opts.format, Format::Tcx);

        assert!(serde_json::from_str::<FilterOptions>(r#"{"format":"fit"}"#).is_err());
    }
}
