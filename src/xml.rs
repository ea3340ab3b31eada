//! Shared quick-xml plumbing for the GPX and TCX readers.
//!
//! Namespace bindings are taken from the document root only and carried in a
//! [`Namespaces`] table that every traversal function receives explicitly.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{PrefixDeclaration, QName};
use quick_xml::Reader;

use crate::error::ParseError;

pub(crate) type Result<T> = std::result::Result<T, ParseError>;
pub(crate) type XmlReader<'a> = Reader<&'a [u8]>;

/// Prefix bindings declared on the document root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Namespaces {
    default: Option<String>,
    prefixes: HashMap<String, String>,
}

impl Namespaces {
    pub(crate) fn from_root(root: &BytesStart<'_>) -> Result<Self> {
        let mut ns = Self::default();
        for attr in root.attributes() {
            let attr = attr?;
            let uri = std::str::from_utf8(&attr.value)
                .map_err(|e| ParseError::MalformedDocument(e.to_string()))?
                .to_string();
            match attr.key.as_namespace_binding() {
                Some(PrefixDeclaration::Default) => ns.default = Some(uri),
                Some(PrefixDeclaration::Named(prefix)) => {
                    let prefix = String::from_utf8_lossy(prefix).into_owned();
                    ns.prefixes.insert(prefix, uri);
                }
                None => {}
            }
        }
        Ok(ns)
    }

    /// URI bound to `prefix` on the root, if any.
    pub(crate) fn uri_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    fn resolve(&self, name: QName<'_>) -> Option<&str> {
        match name.prefix() {
            None => self.default.as_deref(),
            Some(prefix) => {
                let prefix = std::str::from_utf8(prefix.as_ref()).ok()?;
                self.uri_for_prefix(prefix)
            }
        }
    }

    /// True if `name` is `local` in the document's default namespace.
    pub(crate) fn is(&self, name: QName<'_>, local: &[u8]) -> bool {
        if name.local_name().as_ref() != local {
            return false;
        }
        match name.prefix() {
            None => true,
            Some(_) => self.default.is_some() && self.resolve(name) == self.default.as_deref(),
        }
    }

    /// True if `name` is `local` in the namespace identified by `uri`.
    pub(crate) fn is_in(&self, name: QName<'_>, uri: &str, local: &[u8]) -> bool {
        name.local_name().as_ref() == local && self.resolve(name) == Some(uri)
    }
}

/// The document's root element.
pub(crate) enum Root<'a> {
    Open(BytesStart<'a>),
    Empty(BytesStart<'a>),
}

impl<'a> Root<'a> {
    pub(crate) fn start(&self) -> &BytesStart<'a> {
        match self {
            Self::Open(e) | Self::Empty(e) => e,
        }
    }
}

/// Advance past the prolog and return the root element.
pub(crate) fn read_root<'a>(reader: &mut XmlReader<'a>) -> Result<Root<'a>> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => return Ok(Root::Open(e)),
            Event::Empty(e) => return Ok(Root::Empty(e)),
            Event::Text(e) if e.iter().all(u8::is_ascii_whitespace) => {}
            Event::Text(_) | Event::CData(_) | Event::GeneralRef(_) => {
                return Err(ParseError::MalformedDocument(
                    "content before the root element".to_string(),
                ));
            }
            Event::End(_) => {
                return Err(ParseError::MalformedDocument(
                    "unexpected closing tag before the root element".to_string(),
                ));
            }
            Event::Eof => {
                return Err(ParseError::MalformedDocument(
                    "document has no root element".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Drain the document after the root element closed. Only comments,
/// processing instructions and whitespace may follow it.
pub(crate) fn finish(reader: &mut XmlReader<'_>) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Eof => return Ok(()),
            Event::Text(e) if e.iter().all(u8::is_ascii_whitespace) => {}
            Event::Comment(_) | Event::PI(_) => {}
            _ => {
                return Err(ParseError::MalformedDocument(
                    "content after the root element".to_string(),
                ));
            }
        }
    }
}

/// Skip an element and all of its children.
pub(crate) fn skip(reader: &mut XmlReader<'_>, start: &BytesStart<'_>) -> Result<()> {
    reader.read_to_end(start.name())?;
    Ok(())
}

/// Read the text content of an element, trimmed. Child elements are skipped.
/// Handles regular text, CDATA sections, and entity references.
pub(crate) fn read_text(reader: &mut XmlReader<'_>, start: &BytesStart<'_>) -> Result<String> {
    let end_name = start.name().as_ref().to_vec();
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                text.push_str(std::str::from_utf8(e.as_ref()).unwrap_or_default());
            }
            Event::CData(e) => {
                text.push_str(std::str::from_utf8(e.as_ref()).unwrap_or_default());
            }
            Event::GeneralRef(e) => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else {
                    match std::str::from_utf8(e.as_ref()).unwrap_or_default() {
                        "amp" => text.push('&'),
                        "lt" => text.push('<'),
                        "gt" => text.push('>'),
                        "quot" => text.push('"'),
                        "apos" => text.push('\''),
                        _ => {}
                    }
                }
            }
            Event::Start(e) => skip(reader, &e)?,
            Event::End(e) if e.name().as_ref() == end_name.as_slice() => break,
            Event::Eof => {
                return Err(ParseError::truncated(&String::from_utf8_lossy(&end_name)));
            }
            _ => {}
        }
    }

    Ok(text.trim().to_string())
}

/// Read an element's text as a float; absent or unparsable values are 0.0.
pub(crate) fn read_f64(reader: &mut XmlReader<'_>, start: &BytesStart<'_>) -> Result<f64> {
    Ok(parse_f64(&read_text(reader, start)?))
}

pub(crate) fn parse_f64(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(0.0)
}

/// Integer fields accept a fractional rendering ("512.0") and truncate it.
pub(crate) fn parse_u32(text: &str) -> u32 {
    let text = text.trim();
    text.parse::<u32>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(|v| v as u32))
        .unwrap_or(0)
}

/// Parse an absolute timestamp. Values without an offset are taken as UTC.
pub(crate) fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ParseError::invalid_time(text))
}

/// Float attribute by local name; absent or unparsable values are 0.0.
pub(crate) fn attr_f64(start: &BytesStart<'_>, key: &[u8]) -> Result<f64> {
    Ok(attr_string(start, key)?.map_or(0.0, |v| parse_f64(&v)))
}

pub(crate) fn attr_string(start: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == key {
            let value = std::str::from_utf8(&attr.value).unwrap_or_default();
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}
