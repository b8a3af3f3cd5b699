//! Host session: the object the engine calls back into.
//!
//! A [`Host`] owns one session's [`InstanceRegistry`] and [`ClassRegistry`]
//! and implements the callbacks the engine cannot answer itself:
//!
//! - [`make_instance`](Host::make_instance): build a host object for a `new` call
//! - [`isa`](Host::isa): class membership of an instance
//! - [`is_subclass`](Host::is_subclass): class ancestry
//! - [`subspecializer`](Host::subspecializer): which of two tags is more specific
//!   for an instance
//! - [`operator`](Host::operator): operators over host values (`Eq` only)
//!
//! Every callback decodes its wire arguments first and fails with a typed
//! error; nothing is retried or defaulted.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::class::{Class, ClassRegistry};
use crate::codec::TermCodec;
use crate::config::HostConfig;
use crate::error::{ClassError, HostResult, OperatorError, TermError};
use crate::registry::{InstanceId, InstanceRegistry};
use crate::terms::{Operator, Term, Value};
use crate::value::{HostObject, HostValue};

/// The session's absent value, as seen by the engine.
#[derive(Debug)]
struct Nil;

/// Id the session's nil object is bound to. Host-assigned ids start at 1.
pub const NIL_INSTANCE_ID: InstanceId = 0;

/// One engine session's host state.
pub struct Host {
    config: HostConfig,
    instances: InstanceRegistry,
    classes: ClassRegistry,
    nil: HostObject,
}

impl Host {
    /// Create a session with no registered classes.
    pub fn new(config: HostConfig) -> Self {
        Self::with_classes(config, ClassRegistry::new())
    }

    /// Create a session over a prepared class table.
    pub fn with_classes(config: HostConfig, classes: ClassRegistry) -> Self {
        let instances = InstanceRegistry::new();
        let nil = HostObject::new(Nil);
        instances
            .register_with_id(nil.clone(), NIL_INSTANCE_ID)
            .expect("fresh instance registry has the nil id free");
        tracing::info!(
            accept_expression = config.accept_expression,
            classes = classes.len(),
            "initializing host session"
        );
        Self {
            config,
            instances,
            classes,
            nil,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn accept_expression(&self) -> bool {
        self.config.accept_expression
    }

    pub fn set_accept_expression(&mut self, accept: bool) {
        self.config.accept_expression = accept;
    }

    /// Codec bound to this session.
    pub fn codec(&self) -> TermCodec<'_> {
        TermCodec::new(&self.instances, &self.classes, &self.nil)
            .accept_expression(self.config.accept_expression)
            .reject_unregistered_classes(self.config.reject_unregistered_classes)
    }

    /// Encode a host value for the engine.
    pub fn to_polar(&self, value: &HostValue) -> HostResult<Term> {
        self.codec().encode(value)
    }

    /// Decode an engine term without resolving instance handles.
    pub fn to_host(&self, term: &Term) -> HostResult<HostValue> {
        self.codec().decode(term)
    }

    /// Decode an engine term and resolve its instance handles.
    pub fn to_host_resolved(&self, term: &Term) -> HostResult<HostValue> {
        self.codec().decode_resolved(term)
    }

    /// Swap decoded instance references for the objects they name.
    pub fn resolve(&self, value: &HostValue) -> HostResult<HostValue> {
        self.codec().resolve(value)
    }

    pub fn register_class(&self, class: Class) -> HostResult<Arc<Class>> {
        self.classes.register(class)
    }

    pub fn register_mro(&self, name: &str, ancestors: Vec<String>) -> HostResult<()> {
        self.classes.register_mro(name, ancestors)
    }

    /// Cache an object and return its handle.
    pub fn cache_instance(&self, object: &HostObject) -> HostResult<InstanceId> {
        self.instances.register(object)
    }

    pub fn has_instance(&self, id: InstanceId) -> bool {
        self.instances.has(id)
    }

    pub fn get_instance(&self, id: InstanceId) -> HostResult<HostObject> {
        self.instances.get(id)
    }

    /// Drop every cached instance. The session's nil object is re-registered.
    pub fn end_session(&self) {
        tracing::info!(instances = self.instances.len(), "ending host session");
        self.instances.clear();
        self.instances
            .register_with_id(self.nil.clone(), NIL_INSTANCE_ID)
            .expect("cleared instance registry has the nil id free");
    }

    // -----------------------------------------------------------------------
    // Engine callbacks
    // -----------------------------------------------------------------------

    /// Construct `class_name` from a List term of positional arguments and
    /// cache the result under the engine-chosen `instance_id`.
    pub fn make_instance(
        &self,
        class_name: &str,
        constructor_args: &Term,
        instance_id: InstanceId,
    ) -> HostResult<HostObject> {
        let Value::List(items) = &constructor_args.value else {
            return Err(TermError::decode(
                "constructor arguments",
                "List",
                constructor_args.tag(),
            )
            .into());
        };
        let codec = self.codec();
        let args = items
            .iter()
            .map(|t| codec.decode_resolved(t))
            .collect::<HostResult<Vec<_>>>()?;
        self.construct(class_name, &args, instance_id)
    }

    /// Construct from a `Call` term, as found in a `MakeExternal` event.
    pub fn make_instance_from_call(
        &self,
        constructor: &Term,
        instance_id: InstanceId,
    ) -> HostResult<HostObject> {
        let Value::Call(call) = &constructor.value else {
            return Err(TermError::decode("constructor", "Call", constructor.tag()).into());
        };
        if call.kwargs.as_ref().is_some_and(|kw| !kw.is_empty()) {
            return Err(ClassError::Constructor {
                class: call.name.clone(),
                message: "keyword arguments are not supported".into(),
            }
            .into());
        }
        let codec = self.codec();
        let args = call
            .args
            .iter()
            .map(|t| codec.decode_resolved(t))
            .collect::<HostResult<Vec<_>>>()?;
        self.construct(&call.name, &args, instance_id)
    }

    fn construct(
        &self,
        class_name: &str,
        args: &[HostValue],
        instance_id: InstanceId,
    ) -> HostResult<HostObject> {
        tracing::debug!(class = class_name, argc = args.len(), instance_id, "make instance");
        let class = self.classes.get(class_name)?;
        let object = class.construct(args)?;
        self.instances.register_with_id(object.clone(), instance_id)?;
        Ok(object)
    }

    /// Whether the instance named by an `ExternalInstance` term is a
    /// `class_name` (or a registered subclass of it).
    pub fn isa(&self, instance: &Term, class_name: &str) -> HostResult<bool> {
        let Value::ExternalInstance(ext) = &instance.value else {
            return Err(TermError::decode("isa instance", "ExternalInstance", instance.tag()).into());
        };
        let object = self.instances.get(ext.instance_id)?;
        if !self.classes.contains(class_name) {
            return Err(ClassError::UnknownClass {
                name: class_name.to_string(),
            }
            .into());
        }
        let answer = match self.classes.class_of(&object) {
            Some(runtime) => self.classes.is_subclass(&runtime, class_name)?,
            None => false,
        };
        tracing::debug!(instance_id = ext.instance_id, class = class_name, answer, "isa");
        Ok(answer)
    }

    /// Whether `left_tag` is `right_tag` or descends from it.
    pub fn is_subclass(&self, left_tag: &str, right_tag: &str) -> HostResult<bool> {
        let answer = self.classes.is_subclass(left_tag, right_tag)?;
        tracing::debug!(left = left_tag, right = right_tag, answer, "is subclass");
        Ok(answer)
    }

    /// Whether `left_tag` is strictly more specific than `right_tag` for the
    /// given instance.
    ///
    /// Walks the ancestry of the instance's exact runtime class outward; the
    /// first of the two tags met wins. Equal tags are never more specific than
    /// each other, and instances of unregistered classes have no specializers.
    pub fn subspecializer(
        &self,
        instance_id: InstanceId,
        left_tag: &str,
        right_tag: &str,
    ) -> HostResult<bool> {
        let object = self.instances.get(instance_id)?;
        if left_tag == right_tag {
            return Ok(false);
        }
        let Some(runtime) = self.classes.class_of(&object) else {
            return Ok(false);
        };
        let answer = self
            .classes
            .mro(&runtime)?
            .iter()
            .find(|tag| *tag == left_tag || *tag == right_tag)
            .is_some_and(|tag| tag == left_tag);
        tracing::debug!(instance_id, left = left_tag, right = right_tag, answer, "subspecializer");
        Ok(answer)
    }

    /// Evaluate a binary operator over a two-element List term.
    pub fn operator(&self, op: &str, args: &Term) -> HostResult<bool> {
        let operator = match op.parse::<Operator>() {
            Ok(Operator::Eq) => Operator::Eq,
            _ => {
                return Err(OperatorError::Unimplemented {
                    operator: op.to_string(),
                }
                .into());
            }
        };
        let Value::List(items) = &args.value else {
            return Err(TermError::decode("operator arguments", "List", args.tag()).into());
        };
        self.apply(operator, items)
    }

    /// Evaluate an operator over already-split argument terms.
    pub fn apply(&self, operator: Operator, args: &[Term]) -> HostResult<bool> {
        if operator != Operator::Eq {
            return Err(OperatorError::Unimplemented {
                operator: operator.to_string(),
            }
            .into());
        }
        let [left, right] = args else {
            return Err(OperatorError::Arity {
                operator: operator.to_string(),
                expected: 2,
                actual: args.len(),
            }
            .into());
        };
        let codec = self.codec();
        let left = codec.decode_resolved(left)?;
        let right = codec.decode_resolved(right)?;
        let answer = self.values_equal(&left, &right);
        tracing::debug!(%operator, %left, %right, answer, "external operator");
        Ok(answer)
    }

    /// Host value equality used by `Eq`.
    ///
    /// nil equals only nil. Integers and floats compare numerically, and NaN
    /// equals NaN. Objects are equal when identical or when their shared
    /// class's equality hook says so. Compound values compare member-wise
    /// under the same rules.
    pub fn values_equal(&self, left: &HostValue, right: &HostValue) -> bool {
        match (left, right) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Null, _) | (_, HostValue::Null) => false,
            (HostValue::Integer(_) | HostValue::Float(_), HostValue::Integer(_) | HostValue::Float(_)) => {
                match (left, right) {
                    (HostValue::Integer(a), HostValue::Integer(b)) => a == b,
                    _ => {
                        let (a, b) = (left.as_f64(), right.as_f64());
                        a == b || a.zip(b).is_some_and(|(a, b)| a.is_nan() && b.is_nan())
                    }
                }
            }
            (HostValue::Object(a), HostValue::Object(b)) => {
                a.ptr_eq(b) || self.classes.equal(a, b).unwrap_or(false)
            }
            (HostValue::List(a), HostValue::List(b)) => self.all_equal(a, b),
            (HostValue::Dictionary(a), HostValue::Dictionary(b)) => self.fields_equal(a, b),
            (HostValue::Map(a), HostValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((ka, va), (kb, vb))| {
                        self.values_equal(ka, kb) && self.values_equal(va, vb)
                    })
            }
            (HostValue::Predicate(a), HostValue::Predicate(b)) => {
                a.name == b.name
                    && self.all_equal(&a.args, &b.args)
                    && match (&a.kwargs, &b.kwargs) {
                        (Some(ka), Some(kb)) => self.fields_equal(ka, kb),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (HostValue::Expression(a), HostValue::Expression(b)) => {
                a.operator == b.operator && self.all_equal(&a.args, &b.args)
            }
            (HostValue::Pattern(a), HostValue::Pattern(b)) => {
                a.tag == b.tag && self.fields_equal(&a.fields, &b.fields)
            }
            _ => left == right,
        }
    }

    fn all_equal(&self, a: &[HostValue], b: &[HostValue]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.values_equal(x, y))
    }

    fn fields_equal(&self, a: &BTreeMap<String, HostValue>, b: &BTreeMap<String, HostValue>) -> bool {
        a.len() == b.len()
            && a
                .iter()
                .zip(b)
                .all(|((ka, va), (kb, vb))| ka == kb && self.values_equal(va, vb))
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.config)
            .field("instances", &self.instances)
            .field("classes", &self.classes)
            .finish()
    }
}
