//! Host-side values.
//!
//! [`HostValue`] is the closed set of values host code exchanges with the
//! engine: the primitive and container kinds, the symbolic kinds the engine
//! emits (predicates, variables, expressions, patterns), and one opaque
//! [`HostObject`] variant for everything else.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::terms::{ExternalInstance, Operator};

type DebugFn = fn(&dyn Any, &mut fmt::Formatter<'_>) -> fmt::Result;

fn debug_as<T: Any + fmt::Debug>(value: &dyn Any, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.downcast_ref::<T>() {
        Some(v) => fmt::Debug::fmt(v, f),
        None => f.write_str("<opaque>"),
    }
}

/// Shared reference to an arbitrary host object.
///
/// Identity is the identity of the underlying allocation: two `HostObject`s
/// are equal only if they point at the same object.
#[derive(Clone)]
pub struct HostObject {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    debug: DebugFn,
}

impl HostObject {
    /// Wrap a fresh host object.
    pub fn new<T: Any + Send + Sync + fmt::Debug>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an object that is already shared.
    pub fn from_arc<T: Any + Send + Sync + fmt::Debug>(value: Arc<T>) -> Self {
        Self {
            value,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            debug: debug_as::<T>,
        }
    }

    /// Runtime type of the wrapped object.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name of the wrapped object, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Shared handle to the object if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        self.addr() == other.addr()
    }

    /// Address of the shared allocation; stable for as long as any clone lives.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.value) as *const () as usize
    }

    /// Untyped view of the object, for class equality hooks.
    pub(crate) fn as_any(&self) -> &dyn Any {
        &*self.value
    }

    /// Debug rendering used as the `repr` sent to the engine.
    pub fn repr(&self) -> String {
        format!("{self:?}")
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.debug)(&*self.value, f)
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// A predicate call value: `name(args...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub name: String,
    pub args: Vec<HostValue>,
    pub kwargs: Option<BTreeMap<String, HostValue>>,
}

impl Predicate {
    pub fn new(name: impl Into<String>, args: Vec<HostValue>) -> Self {
        Self {
            name: name.into(),
            args,
            kwargs: None,
        }
    }
}

/// A symbolic operation over (possibly unbound) values.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub operator: Operator,
    pub args: Vec<HostValue>,
}

/// A shape pattern; `tag` is `None` for untagged field patterns.
#[derive(Debug, Clone, PartialEq)]
pub struct HostPattern {
    pub tag: Option<String>,
    pub fields: BTreeMap<String, HostValue>,
}

/// A value on the host side of the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// The absent value. The engine sees it as the session's `nil` instance.
    Null,
    Boolean(bool),
    Integer(i32),
    Float(f64),
    String(String),
    List(Vec<HostValue>),
    Dictionary(BTreeMap<String, HostValue>),
    /// A host mapping with arbitrary keys; encodes only if every key is a string.
    Map(Vec<(HostValue, HostValue)>),
    /// Unresolved instance handle as decoded from the wire.
    Instance(ExternalInstance),
    Object(HostObject),
    Predicate(Predicate),
    Variable(String),
    Expression(Expression),
    Pattern(HostPattern),
}

impl HostValue {
    /// Short kind name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::Null => "nil",
            HostValue::Boolean(_) => "boolean",
            HostValue::Integer(_) => "integer",
            HostValue::Float(_) => "float",
            HostValue::String(_) => "string",
            HostValue::List(_) => "list",
            HostValue::Dictionary(_) => "dictionary",
            HostValue::Map(_) => "map",
            HostValue::Instance(_) => "instance",
            HostValue::Object(_) => "object",
            HostValue::Predicate(_) => "predicate",
            HostValue::Variable(_) => "variable",
            HostValue::Expression(_) => "expression",
            HostValue::Pattern(_) => "pattern",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn object<T: Any + Send + Sync + fmt::Debug>(value: T) -> Self {
        HostValue::Object(HostObject::new(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            HostValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Integer(i) => Some(f64::from(*i)),
            HostValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions from native Rust values
// ---------------------------------------------------------------------------

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Boolean(b)
    }
}

impl From<i32> for HostValue {
    fn from(i: i32) -> Self {
        HostValue::Integer(i)
    }
}

impl From<f64> for HostValue {
    fn from(f: f64) -> Self {
        HostValue::Float(f)
    }
}

impl From<f32> for HostValue {
    fn from(f: f32) -> Self {
        HostValue::Float(f64::from(f))
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<HostObject> for HostValue {
    fn from(obj: HostObject) -> Self {
        HostValue::Object(obj)
    }
}

impl From<Predicate> for HostValue {
    fn from(pred: Predicate) -> Self {
        HostValue::Predicate(pred)
    }
}

impl From<HostPattern> for HostValue {
    fn from(pattern: HostPattern) -> Self {
        HostValue::Pattern(pattern)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(HostValue::Null, Into::into)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// String-keyed maps become dictionaries; anything else stays a raw map.
fn from_pairs(pairs: impl IntoIterator<Item = (HostValue, HostValue)>) -> HostValue {
    let pairs: Vec<(HostValue, HostValue)> = pairs.into_iter().collect();
    if pairs.iter().all(|(k, _)| matches!(k, HostValue::String(_))) {
        let fields = pairs
            .into_iter()
            .filter_map(|(k, v)| match k {
                HostValue::String(k) => Some((k, v)),
                _ => None,
            })
            .collect();
        HostValue::Dictionary(fields)
    } else {
        HostValue::Map(pairs)
    }
}

impl<K: Into<HostValue>, V: Into<HostValue>, S> From<HashMap<K, V, S>> for HostValue {
    fn from(map: HashMap<K, V, S>) -> Self {
        from_pairs(map.into_iter().map(|(k, v)| (k.into(), v.into())))
    }
}

impl<K: Into<HostValue>, V: Into<HostValue>> From<BTreeMap<K, V>> for HostValue {
    fn from(map: BTreeMap<K, V>) -> Self {
        from_pairs(map.into_iter().map(|(k, v)| (k.into(), v.into())))
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[HostValue]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &BTreeMap<String, HostValue>) -> fmt::Result {
    f.write_str("{")?;
    for (i, (k, v)) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{k}: {v}")?;
    }
    f.write_str("}")
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("nil"),
            HostValue::Boolean(b) => write!(f, "{b}"),
            HostValue::Integer(i) => write!(f, "{i}"),
            HostValue::Float(x) => write!(f, "{x:?}"),
            HostValue::String(s) => write!(f, "{s:?}"),
            HostValue::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            HostValue::Dictionary(fields) => write_fields(f, fields),
            HostValue::Map(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            HostValue::Instance(ext) => match &ext.repr {
                Some(repr) => write!(f, "<instance {}: {repr}>", ext.instance_id),
                None => write!(f, "<instance {}>", ext.instance_id),
            },
            HostValue::Object(obj) => write!(f, "{obj:?}"),
            HostValue::Predicate(pred) => {
                write!(f, "{}(", pred.name)?;
                write_seq(f, &pred.args)?;
                f.write_str(")")
            }
            HostValue::Variable(name) => f.write_str(name),
            HostValue::Expression(expr) => {
                write!(f, "{}(", expr.operator)?;
                write_seq(f, &expr.args)?;
                f.write_str(")")
            }
            HostValue::Pattern(pattern) => {
                if let Some(tag) = &pattern.tag {
                    f.write_str(tag)?;
                }
                write_fields(f, &pattern.fields)
            }
        }
    }
}
