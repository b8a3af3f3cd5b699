//! Wire model for engine terms.
//!
//! A [`Term`] is the envelope the engine uses for every value it exchanges with
//! the host: `{"id": u64, "offset": u64, "value": {<Tag>: <payload>}}`. This
//! module holds the typed form of that envelope and a strict reader/writer
//! over `serde_json::Value`. The reader checks the JSON node kind of every
//! payload and reports expected vs. actual kinds on mismatch.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map as JsonMap, Value as Json};

use crate::error::{TermError, TermResult};

/// A value exchanged with the engine, plus its provenance metadata.
///
/// `id` and `offset` are assigned by the engine and are never interpreted by
/// the host. Host-originated terms always carry zero for both.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub id: u64,
    pub offset: u64,
    pub value: Value,
}

/// Tagged payload of a [`Term`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Boolean(bool),
    Number(Numeric),
    List(Vec<Term>),
    Dictionary(Dictionary),
    ExternalInstance(ExternalInstance),
    Call(Call),
    Variable(String),
    Expression(Operation),
    Pattern(Pattern),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(i32),
    Float(f64),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    pub fields: BTreeMap<String, Term>,
}

/// Opaque reference to a host object.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalInstance {
    pub instance_id: u64,
    /// Engine-built instances carry the `new` call that created them.
    pub constructor: Option<Box<Term>>,
    pub repr: Option<String>,
    /// Registered class name of the object, `None` for unregistered classes.
    pub class_repr: Option<String>,
    pub class_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Term>,
    pub kwargs: Option<BTreeMap<String, Term>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operator: Operator,
    pub args: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Class-tagged pattern: `Tag{field: value, ...}`.
    Instance { tag: String, fields: Dictionary },
    /// Untagged field pattern: `{field: value, ...}`.
    Dictionary(Dictionary),
}

/// Operators of the engine grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Debug,
    Print,
    Cut,
    In,
    Isa,
    New,
    Dot,
    Not,
    Mul,
    Div,
    Mod,
    Rem,
    Add,
    Sub,
    Eq,
    Geq,
    Leq,
    Neq,
    Gt,
    Lt,
    Unify,
    Or,
    And,
    ForAll,
    Assign,
}

impl Operator {
    pub const ALL: [Operator; 25] = [
        Operator::Debug,
        Operator::Print,
        Operator::Cut,
        Operator::In,
        Operator::Isa,
        Operator::New,
        Operator::Dot,
        Operator::Not,
        Operator::Mul,
        Operator::Div,
        Operator::Mod,
        Operator::Rem,
        Operator::Add,
        Operator::Sub,
        Operator::Eq,
        Operator::Geq,
        Operator::Leq,
        Operator::Neq,
        Operator::Gt,
        Operator::Lt,
        Operator::Unify,
        Operator::Or,
        Operator::And,
        Operator::ForAll,
        Operator::Assign,
    ];

    /// Wire name of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Debug => "Debug",
            Operator::Print => "Print",
            Operator::Cut => "Cut",
            Operator::In => "In",
            Operator::Isa => "Isa",
            Operator::New => "New",
            Operator::Dot => "Dot",
            Operator::Not => "Not",
            Operator::Mul => "Mul",
            Operator::Div => "Div",
            Operator::Mod => "Mod",
            Operator::Rem => "Rem",
            Operator::Add => "Add",
            Operator::Sub => "Sub",
            Operator::Eq => "Eq",
            Operator::Geq => "Geq",
            Operator::Leq => "Leq",
            Operator::Neq => "Neq",
            Operator::Gt => "Gt",
            Operator::Lt => "Lt",
            Operator::Unify => "Unify",
            Operator::Or => "Or",
            Operator::And => "And",
            Operator::ForAll => "ForAll",
            Operator::Assign => "Assign",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = TermError;

    fn from_str(s: &str) -> TermResult<Self> {
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| TermError::UnknownOperator { name: s.to_string() })
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl Term {
    /// A host-originated term: provenance is zeroed for the engine to overwrite.
    pub fn new(value: Value) -> Self {
        Self {
            id: 0,
            offset: 0,
            value,
        }
    }

    /// Parse a term from its JSON text.
    pub fn parse(text: &str) -> TermResult<Self> {
        let json: Json = serde_json::from_str(text).map_err(|e| TermError::Json {
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Name of the value tag, e.g. `"Number"`.
    pub fn tag(&self) -> &'static str {
        self.value.tag()
    }
}

impl Value {
    pub fn tag(&self) -> &'static str {
        match self {
            Value::String(_) => "String",
            Value::Boolean(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::List(_) => "List",
            Value::Dictionary(_) => "Dictionary",
            Value::ExternalInstance(_) => "ExternalInstance",
            Value::Call(_) => "Call",
            Value::Variable(_) => "Variable",
            Value::Expression(_) => "Expression",
            Value::Pattern(_) => "Pattern",
        }
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Term::new(value)
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Name of a JSON node kind, for decode diagnostics.
pub fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn as_object<'a>(context: &str, json: &'a Json) -> TermResult<&'a JsonMap<String, Json>> {
    json.as_object()
        .ok_or_else(|| TermError::decode(context, "object", json_kind(json)))
}

fn as_array<'a>(context: &str, json: &'a Json) -> TermResult<&'a Vec<Json>> {
    json.as_array()
        .ok_or_else(|| TermError::decode(context, "array", json_kind(json)))
}

fn as_str<'a>(context: &str, json: &'a Json) -> TermResult<&'a str> {
    json.as_str()
        .ok_or_else(|| TermError::decode(context, "string", json_kind(json)))
}

fn as_u64(context: &str, json: &Json) -> TermResult<u64> {
    json.as_u64()
        .ok_or_else(|| TermError::decode(context, "unsigned integer", json_kind(json)))
}

fn field<'a>(context: &str, obj: &'a JsonMap<String, Json>, name: &str) -> TermResult<&'a Json> {
    obj.get(name)
        .ok_or_else(|| TermError::decode(context, format!("field `{name}`"), "nothing"))
}

fn optional_string(context: &str, json: Option<&Json>) -> TermResult<Option<String>> {
    match json {
        None | Some(Json::Null) => Ok(None),
        Some(other) => Ok(Some(as_str(context, other)?.to_string())),
    }
}

/// Split a single-key object into its tag and payload.
pub(crate) fn single_tag<'a>(context: &str, json: &'a Json) -> TermResult<(&'a str, &'a Json)> {
    let obj = as_object(context, json)?;
    let mut entries = obj.iter();
    match (entries.next(), entries.next()) {
        (Some((tag, payload)), None) => Ok((tag.as_str(), payload)),
        _ => Err(TermError::decode(
            context,
            "object with exactly one tag",
            format!("object with {} keys", obj.len()),
        )),
    }
}

fn terms_from_json(context: &str, json: &Json) -> TermResult<Vec<Term>> {
    as_array(context, json)?.iter().map(Term::from_json).collect()
}

fn fields_from_json(context: &str, json: &Json) -> TermResult<BTreeMap<String, Term>> {
    as_object(context, json)?
        .iter()
        .map(|(k, v)| Ok((k.clone(), Term::from_json(v)?)))
        .collect()
}

impl Dictionary {
    /// Read the `{"fields": {...}}` shape.
    fn from_json(context: &str, json: &Json) -> TermResult<Self> {
        let obj = as_object(context, json)?;
        let fields = fields_from_json(context, field(context, obj, "fields")?)?;
        Ok(Self { fields })
    }

    fn to_json(&self) -> Json {
        let fields: JsonMap<String, Json> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        json!({ "fields": fields })
    }
}

impl Numeric {
    fn from_json(json: &Json) -> TermResult<Self> {
        let (tag, payload) = single_tag("Number", json)?;
        match tag {
            "Integer" => {
                let n = payload
                    .as_number()
                    .ok_or_else(|| TermError::decode("Integer", "number", json_kind(payload)))?;
                let wide = n
                    .as_i64()
                    .ok_or_else(|| TermError::decode("Integer", "integer", n.to_string()))?;
                let narrow = i32::try_from(wide)
                    .map_err(|_| TermError::decode("Integer", "32-bit integer", wide.to_string()))?;
                Ok(Numeric::Integer(narrow))
            }
            "Float" => match payload {
                Json::String(s) => match s.as_str() {
                    "Infinity" => Ok(Numeric::Float(f64::INFINITY)),
                    "-Infinity" => Ok(Numeric::Float(f64::NEG_INFINITY)),
                    "NaN" => Ok(Numeric::Float(f64::NAN)),
                    other => Err(TermError::decode(
                        "Float",
                        "a floating point number",
                        format!("`{other}`"),
                    )),
                },
                Json::Number(n) => n
                    .as_f64()
                    .map(Numeric::Float)
                    .ok_or_else(|| TermError::decode("Float", "a floating point number", n.to_string())),
                other => Err(TermError::decode("Float", "number or string", json_kind(other))),
            },
            other => Err(TermError::UnrecognizedTag {
                tag: other.to_string(),
                context: "Number".into(),
            }),
        }
    }

    fn to_json(self) -> Json {
        match self {
            Numeric::Integer(i) => json!({ "Integer": i }),
            Numeric::Float(f) => {
                let payload = if f.is_nan() {
                    json!("NaN")
                } else if f == f64::INFINITY {
                    json!("Infinity")
                } else if f == f64::NEG_INFINITY {
                    json!("-Infinity")
                } else {
                    json!(f)
                };
                json!({ "Float": payload })
            }
        }
    }
}

impl Pattern {
    fn from_json(json: &Json) -> TermResult<Self> {
        let (tag, payload) = single_tag("Pattern", json)?;
        match tag {
            "Instance" => {
                let obj = as_object("Pattern.Instance", payload)?;
                let tag = as_str("Pattern.Instance.tag", field("Pattern.Instance", obj, "tag")?)?;
                let fields =
                    Dictionary::from_json("Pattern.Instance.fields", field("Pattern.Instance", obj, "fields")?)?;
                Ok(Pattern::Instance {
                    tag: tag.to_string(),
                    fields,
                })
            }
            "Dictionary" => Ok(Pattern::Dictionary(Dictionary::from_json(
                "Pattern.Dictionary",
                payload,
            )?)),
            other => Err(TermError::UnrecognizedTag {
                tag: other.to_string(),
                context: "Pattern".into(),
            }),
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Pattern::Instance { tag, fields } => json!({
                "Instance": { "tag": tag, "fields": fields.to_json() }
            }),
            Pattern::Dictionary(fields) => json!({ "Dictionary": fields.to_json() }),
        }
    }
}

impl ExternalInstance {
    fn from_json(json: &Json) -> TermResult<Self> {
        let ctx = "ExternalInstance";
        let obj = as_object(ctx, json)?;
        let instance_id = as_u64("ExternalInstance.instance_id", field(ctx, obj, "instance_id")?)?;
        let constructor = match obj.get("constructor") {
            None | Some(Json::Null) => None,
            Some(term) => Some(Box::new(Term::from_json(term)?)),
        };
        let class_id = match obj.get("class_id") {
            None | Some(Json::Null) => None,
            Some(id) => Some(as_u64("ExternalInstance.class_id", id)?),
        };
        Ok(Self {
            instance_id,
            constructor,
            repr: optional_string("ExternalInstance.repr", obj.get("repr"))?,
            class_repr: optional_string("ExternalInstance.class_repr", obj.get("class_repr"))?,
            class_id,
        })
    }

    fn to_json(&self) -> Json {
        let mut obj = JsonMap::new();
        obj.insert("instance_id".into(), json!(self.instance_id));
        if let Some(constructor) = &self.constructor {
            obj.insert("constructor".into(), constructor.to_json());
        }
        obj.insert("repr".into(), json!(self.repr));
        obj.insert("class_repr".into(), json!(self.class_repr));
        if let Some(class_id) = self.class_id {
            obj.insert("class_id".into(), json!(class_id));
        }
        Json::Object(obj)
    }
}

impl Call {
    fn from_json(json: &Json) -> TermResult<Self> {
        let obj = as_object("Call", json)?;
        let name = as_str("Call.name", field("Call", obj, "name")?)?.to_string();
        let args = terms_from_json("Call.args", field("Call", obj, "args")?)?;
        let kwargs = match obj.get("kwargs") {
            None | Some(Json::Null) => None,
            Some(kw) => Some(fields_from_json("Call.kwargs", kw)?),
        };
        Ok(Self { name, args, kwargs })
    }

    fn to_json(&self) -> Json {
        let args: Vec<Json> = self.args.iter().map(Term::to_json).collect();
        let mut obj = JsonMap::new();
        obj.insert("name".into(), json!(self.name));
        obj.insert("args".into(), Json::Array(args));
        if let Some(kwargs) = &self.kwargs {
            let kw: JsonMap<String, Json> =
                kwargs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
            obj.insert("kwargs".into(), Json::Object(kw));
        }
        Json::Object(obj)
    }
}

impl Term {
    /// Read a term from a parsed JSON tree.
    ///
    /// `id` and `offset` default to zero when absent; `value` is required.
    pub fn from_json(json: &Json) -> TermResult<Self> {
        let obj = as_object("Term", json)?;
        let id = match obj.get("id") {
            None => 0,
            Some(id) => as_u64("Term.id", id)?,
        };
        let offset = match obj.get("offset") {
            None => 0,
            Some(offset) => as_u64("Term.offset", offset)?,
        };
        let value = Value::from_json(field("Term", obj, "value")?)?;
        Ok(Self { id, offset, value })
    }

    /// Write the term in wire form.
    pub fn to_json(&self) -> Json {
        json!({
            "id": self.id,
            "offset": self.offset,
            "value": self.value.to_json(),
        })
    }
}

impl Value {
    pub fn from_json(json: &Json) -> TermResult<Self> {
        let (tag, payload) = single_tag("value", json)?;
        let value = match tag {
            "String" => Value::String(as_str("String", payload)?.to_string()),
            "Boolean" => Value::Boolean(
                payload
                    .as_bool()
                    .ok_or_else(|| TermError::decode("Boolean", "boolean", json_kind(payload)))?,
            ),
            "Number" => Value::Number(Numeric::from_json(payload)?),
            "List" => Value::List(terms_from_json("List", payload)?),
            "Dictionary" => Value::Dictionary(Dictionary::from_json("Dictionary", payload)?),
            "ExternalInstance" => Value::ExternalInstance(ExternalInstance::from_json(payload)?),
            "Call" => Value::Call(Call::from_json(payload)?),
            "Variable" => Value::Variable(as_str("Variable", payload)?.to_string()),
            "Expression" => {
                let obj = as_object("Expression", payload)?;
                let operator: Operator =
                    as_str("Expression.operator", field("Expression", obj, "operator")?)?.parse()?;
                let args = terms_from_json("Expression.args", field("Expression", obj, "args")?)?;
                Value::Expression(Operation { operator, args })
            }
            "Pattern" => Value::Pattern(Pattern::from_json(payload)?),
            other => {
                return Err(TermError::UnrecognizedTag {
                    tag: other.to_string(),
                    context: "value".into(),
                });
            }
        };
        Ok(value)
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::String(s) => json!({ "String": s }),
            Value::Boolean(b) => json!({ "Boolean": b }),
            Value::Number(n) => json!({ "Number": n.to_json() }),
            Value::List(items) => {
                json!({ "List": items.iter().map(Term::to_json).collect::<Vec<_>>() })
            }
            Value::Dictionary(dict) => json!({ "Dictionary": dict.to_json() }),
            Value::ExternalInstance(ext) => json!({ "ExternalInstance": ext.to_json() }),
            Value::Call(call) => json!({ "Call": call.to_json() }),
            Value::Variable(name) => json!({ "Variable": name }),
            Value::Expression(op) => json!({
                "Expression": {
                    "operator": op.operator.as_str(),
                    "args": op.args.iter().map(Term::to_json).collect::<Vec<_>>(),
                }
            }),
            Value::Pattern(pattern) => json!({ "Pattern": pattern.to_json() }),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Term {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Term {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        Term::from_json(&json).map_err(serde::de::Error::custom)
    }
}
