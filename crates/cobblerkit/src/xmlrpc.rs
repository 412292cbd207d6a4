//! XML-RPC encoding and decoding.
//!
//! Requests are written by hand with `quick_xml` escaping. Responses are
//! read into a small element tree first and then converted to [`Value`],
//! which keeps the pull parser loop free of XML-RPC rules.

use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use quick_xml::escape::escape;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// An XML-RPC value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Name of the value's XML-RPC type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Struct(_) => "struct",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Encode a method call.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

fn encode_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Nil => out.push_str("<nil/>"),
        Value::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
        }
        Value::Int(i) => {
            let _ = write!(out, "<int>{i}</int>");
        }
        Value::Double(d) => {
            let _ = write!(out, "<double>{d}</double>");
        }
        Value::Str(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

/// Parsed XML element
#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Result<&Node> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::decode(format!("<{}> has no <{name}>", self.name)))
    }
}

fn parse_tree(xml: &str) -> Result<Node> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![Node::named(b"#document")];

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::decode(format!("malformed XML: {e}")))?;
        match event {
            Event::Start(start) => stack.push(Node::named(start.name().as_ref())),
            Event::Empty(empty) => {
                let node = Node::named(empty.name().as_ref());
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| Error::decode(format!("bad text: {e}")))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| Error::decode("unbalanced closing tag"))?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| Error::decode("unbalanced closing tag"))?;
                parent.children.push(node);
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(Error::decode("unexpected end of document"));
    }
    stack
        .pop()
        .and_then(|doc| doc.children.into_iter().next())
        .ok_or_else(|| Error::decode("empty document"))
}

fn decode_value(node: &Node) -> Result<Value> {
    // An untyped <value> is a string
    let Some(typed) = node.children.first() else {
        return Ok(Value::Str(node.text.clone()));
    };
    let text = typed.text.trim();

    match typed.name.as_str() {
        "string" | "base64" | "dateTime.iso8601" => Ok(Value::Str(typed.text.clone())),
        "int" | "i4" | "i8" => text
            .parse()
            .map(Value::Int)
            .map_err(|_| Error::decode(format!("bad integer '{text}'"))),
        "double" => text
            .parse()
            .map(Value::Double)
            .map_err(|_| Error::decode(format!("bad double '{text}'"))),
        "boolean" => match text {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            other => Err(Error::decode(format!("bad boolean '{other}'"))),
        },
        "nil" => Ok(Value::Nil),
        "array" => typed
            .child("data")?
            .children
            .iter()
            .filter(|c| c.name == "value")
            .map(decode_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member.child("name")?.text.clone();
                let value = decode_value(member.child("value")?)?;
                members.insert(name, value);
            }
            Ok(Value::Struct(members))
        }
        other => Err(Error::decode(format!("unknown value type <{other}>"))),
    }
}

/// Parse a method response, turning a fault into an error.
pub fn parse_response(xml: &str) -> Result<Value> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(Error::decode(format!(
            "expected <methodResponse>, got <{}>",
            root.name
        )));
    }

    if let Ok(fault) = root.child("fault") {
        let value = decode_value(fault.child("value")?)?;
        let members = value
            .as_struct()
            .ok_or_else(|| Error::decode("fault is not a struct"))?;
        let code = match members.get("faultCode") {
            Some(Value::Int(code)) => *code,
            _ => 0,
        };
        let message = members
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(Error::from_fault(code, message));
    }

    decode_value(root.child("params")?.child("param")?.child("value")?)
}
