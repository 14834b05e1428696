//! SOAP response parsing.
//!
//! Converts an XML document into a `serde_json::Value` tree: elements become
//! objects keyed by element name, attributes become `@name` keys, text next to
//! child elements becomes `#text`, and repeated siblings become arrays.
//! Elements in the well-known EWS namespaces are keyed by local name; any
//! other prefix is kept as written.
//!
//! Uses quick-xml, which never expands external entities.

use crate::error::EwsError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use serde_json::{Map, Value};

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
/// EWS messages namespace (`m:` prefix).
pub const MESSAGES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/messages";
/// EWS types namespace (`t:` prefix).
pub const TYPES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/types";
/// Autodiscover namespace (`a:` prefix).
pub const AUTODISCOVER_NS: &str = "http://schemas.microsoft.com/exchange/2010/Autodiscover";

/// Namespaces whose prefixes are dropped from element names.
pub const EWS_NAMESPACES: [&str; 5] = [
    SOAP_11_NS,
    SOAP_12_NS,
    MESSAGES_NS,
    TYPES_NS,
    AUTODISCOVER_NS,
];

/// Key used for text content of an element that also has children.
pub const TEXT_KEY: &str = "#text";

struct Frame {
    key: String,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn into_value(self) -> (String, Value) {
        let Frame {
            key,
            mut children,
            text,
        } = self;
        let value = if children.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text)
            }
        } else {
            if !text.is_empty() {
                children.insert(TEXT_KEY.to_string(), Value::String(text));
            }
            Value::Object(children)
        };
        (key, value)
    }
}

/// Parse a document using the default EWS namespace set.
pub fn parse_xml(data: &[u8]) -> Result<Value, EwsError> {
    parse_xml_with(data, &EWS_NAMESPACES)
}

/// Parse a document, dropping prefixes bound to any of `collapse`.
pub fn parse_xml_with(data: &[u8], collapse: &[&str]) -> Result<Value, EwsError> {
    let mut reader = NsReader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = vec![Frame {
        key: String::new(),
        children: Map::new(),
        text: String::new(),
    }];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let frame = open_frame(&reader, e, collapse)?;
                stack.push(frame);
            }

            Ok(Event::Empty(ref e)) => {
                let frame = open_frame(&reader, e, collapse)?;
                attach(&mut stack, frame);
            }

            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(EwsError::XmlParse("unbalanced end tag".to_string()));
                }
                if let Some(frame) = stack.pop() {
                    attach(&mut stack, frame);
                }
            }

            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| EwsError::XmlParse(format!("invalid text: {}", e)))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }

            Ok(Event::CData(e)) => {
                let bytes = e.into_inner();
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| EwsError::XmlParse(format!("invalid UTF-8 in CDATA: {}", e)))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(text);
                }
            }

            Ok(Event::DocType(_)) => {
                return Err(EwsError::XmlParse(
                    "DOCTYPE declarations are not allowed".to_string(),
                ));
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(EwsError::XmlParse(format!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }

            _ => {}
        }

        buf.clear();
    }

    if stack.len() != 1 {
        return Err(EwsError::XmlParse("unexpected end of document".to_string()));
    }

    let root = stack.pop().map(|f| f.children).unwrap_or_default();
    Ok(Value::Object(root))
}

fn open_frame<R>(reader: &NsReader<R>, e: &BytesStart, collapse: &[&str]) -> Result<Frame, EwsError> {
    let name = e.name();
    let (resolved, local) = reader.resolve_element(name);
    let qname = utf8(name.as_ref())?;
    let key = match resolved {
        ResolveResult::Bound(ns) if collapse.iter().any(|c| c.as_bytes() == ns.as_ref()) => {
            utf8(local.as_ref())?.to_string()
        }
        _ => qname.to_string(),
    };

    let mut children = Map::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| EwsError::XmlParse(format!("invalid attribute: {}", e)))?;
        let name = utf8(attr.key.as_ref())?;
        if name == "xmlns" || name.starts_with("xmlns:") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| EwsError::XmlParse(format!("invalid attribute value: {}", e)))?;
        children.insert(format!("@{}", name), Value::String(value.into_owned()));
    }

    Ok(Frame {
        key,
        children,
        text: String::new(),
    })
}

fn attach(stack: &mut [Frame], frame: Frame) {
    let (key, value) = frame.into_value();
    if let Some(parent) = stack.last_mut() {
        insert_child(&mut parent.children, key, value);
    }
}

/// Insert a child, turning repeated siblings into an array.
fn insert_child(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::take(existing);
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, EwsError> {
    std::str::from_utf8(bytes).map_err(|e| EwsError::XmlParse(format!("invalid UTF-8 name: {}", e)))
}

/// Key without any namespace prefix or attribute marker.
pub fn local_part(key: &str) -> &str {
    let key = key.trim_start_matches('@');
    match key.rfind(':') {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}
