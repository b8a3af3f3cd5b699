//! Term codec: host values ↔ wire terms.
//!
//! Decoding is pure apart from the expression gate: instance handles come back
//! as unresolved [`HostValue::Instance`] references. Encoding is registry-aware:
//! opaque objects are cached in the session's [`InstanceRegistry`] and sent as
//! `ExternalInstance` handles.

use std::collections::BTreeMap;

use crate::class::ClassRegistry;
use crate::error::{ClassError, HostResult, TermError};
use crate::registry::InstanceRegistry;
use crate::terms::{
    Call, Dictionary, ExternalInstance, Numeric, Operation, Pattern, Term, Value,
};
use crate::value::{Expression, HostObject, HostPattern, HostValue, Predicate};

/// Codec bound to one session's registries.
#[derive(Debug, Clone, Copy)]
pub struct TermCodec<'a> {
    instances: &'a InstanceRegistry,
    classes: &'a ClassRegistry,
    nil: &'a HostObject,
    accept_expression: bool,
    reject_unregistered_classes: bool,
}

impl<'a> TermCodec<'a> {
    pub fn new(
        instances: &'a InstanceRegistry,
        classes: &'a ClassRegistry,
        nil: &'a HostObject,
    ) -> Self {
        Self {
            instances,
            classes,
            nil,
            accept_expression: false,
            reject_unregistered_classes: false,
        }
    }

    /// Allow `Expression` terms to decode.
    pub fn accept_expression(mut self, accept: bool) -> Self {
        self.accept_expression = accept;
        self
    }

    /// Fail instead of sending `class_repr: null` for unregistered classes.
    pub fn reject_unregistered_classes(mut self, reject: bool) -> Self {
        self.reject_unregistered_classes = reject;
        self
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Turn a wire term into a host value.
    pub fn decode(&self, term: &Term) -> HostResult<HostValue> {
        tracing::trace!(tag = term.tag(), id = term.id, "decoding term");
        let value = match &term.value {
            Value::String(s) => HostValue::String(s.clone()),
            Value::Boolean(b) => HostValue::Boolean(*b),
            Value::Number(Numeric::Integer(i)) => HostValue::Integer(*i),
            Value::Number(Numeric::Float(f)) => HostValue::Float(*f),
            Value::List(items) => HostValue::List(self.decode_all(items)?),
            Value::Dictionary(dict) => HostValue::Dictionary(self.decode_fields(&dict.fields)?),
            Value::ExternalInstance(ext) => HostValue::Instance(ext.clone()),
            Value::Call(call) => HostValue::Predicate(Predicate {
                name: call.name.clone(),
                args: self.decode_all(&call.args)?,
                kwargs: call
                    .kwargs
                    .as_ref()
                    .map(|kw| self.decode_fields(kw))
                    .transpose()?,
            }),
            Value::Variable(name) => HostValue::Variable(name.clone()),
            Value::Expression(op) => {
                if !self.accept_expression {
                    return Err(TermError::ExpressionNotAllowed.into());
                }
                HostValue::Expression(Expression {
                    operator: op.operator,
                    args: self.decode_all(&op.args)?,
                })
            }
            Value::Pattern(Pattern::Instance { tag, fields }) => HostValue::Pattern(HostPattern {
                tag: Some(tag.clone()),
                fields: self.decode_fields(&fields.fields)?,
            }),
            Value::Pattern(Pattern::Dictionary(fields)) => HostValue::Pattern(HostPattern {
                tag: None,
                fields: self.decode_fields(&fields.fields)?,
            }),
        };
        Ok(value)
    }

    fn decode_all(&self, terms: &[Term]) -> HostResult<Vec<HostValue>> {
        terms.iter().map(|t| self.decode(t)).collect()
    }

    fn decode_fields(&self, fields: &BTreeMap<String, Term>) -> HostResult<BTreeMap<String, HostValue>> {
        fields
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.decode(v)?)))
            .collect()
    }

    /// Decode, then replace instance handles by the objects they name.
    pub fn decode_resolved(&self, term: &Term) -> HostResult<HostValue> {
        let value = self.decode(term)?;
        self.resolve(&value)
    }

    /// Replace every instance handle in `value` by its registered object.
    ///
    /// The session's nil object resolves to [`HostValue::Null`]. Unknown
    /// handles are an error.
    pub fn resolve(&self, value: &HostValue) -> HostResult<HostValue> {
        let resolved = match value {
            HostValue::Instance(ext) => {
                let obj = self.instances.get(ext.instance_id)?;
                if obj.ptr_eq(self.nil) {
                    HostValue::Null
                } else {
                    HostValue::Object(obj)
                }
            }
            HostValue::List(items) => HostValue::List(self.resolve_all(items)?),
            HostValue::Dictionary(fields) => HostValue::Dictionary(self.resolve_fields(fields)?),
            HostValue::Map(pairs) => HostValue::Map(
                pairs
                    .iter()
                    .map(|(k, v)| Ok((self.resolve(k)?, self.resolve(v)?)))
                    .collect::<HostResult<_>>()?,
            ),
            HostValue::Predicate(pred) => HostValue::Predicate(Predicate {
                name: pred.name.clone(),
                args: self.resolve_all(&pred.args)?,
                kwargs: pred
                    .kwargs
                    .as_ref()
                    .map(|kw| self.resolve_fields(kw))
                    .transpose()?,
            }),
            HostValue::Expression(expr) => HostValue::Expression(Expression {
                operator: expr.operator,
                args: self.resolve_all(&expr.args)?,
            }),
            HostValue::Pattern(pattern) => HostValue::Pattern(HostPattern {
                tag: pattern.tag.clone(),
                fields: self.resolve_fields(&pattern.fields)?,
            }),
            other => other.clone(),
        };
        Ok(resolved)
    }

    fn resolve_all(&self, items: &[HostValue]) -> HostResult<Vec<HostValue>> {
        items.iter().map(|v| self.resolve(v)).collect()
    }

    fn resolve_fields(
        &self,
        fields: &BTreeMap<String, HostValue>,
    ) -> HostResult<BTreeMap<String, HostValue>> {
        fields
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.resolve(v)?)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Turn a host value into a wire term with zeroed provenance.
    pub fn encode(&self, value: &HostValue) -> HostResult<Term> {
        let value = match value {
            HostValue::Null => Value::ExternalInstance(self.instance(self.nil, Some("nil".into()), None)?),
            HostValue::Boolean(b) => Value::Boolean(*b),
            HostValue::Integer(i) => Value::Number(Numeric::Integer(*i)),
            HostValue::Float(f) => Value::Number(Numeric::Float(*f)),
            HostValue::String(s) => Value::String(s.clone()),
            HostValue::List(items) => Value::List(self.encode_all(items)?),
            HostValue::Dictionary(fields) => Value::Dictionary(Dictionary {
                fields: self.encode_fields(fields)?,
            }),
            HostValue::Map(pairs) => {
                let mut fields = BTreeMap::new();
                for (k, v) in pairs {
                    let HostValue::String(key) = k else {
                        return Err(TermError::NonStringKey { key: k.to_string() }.into());
                    };
                    fields.insert(key.clone(), self.encode(v)?);
                }
                Value::Dictionary(Dictionary { fields })
            }
            HostValue::Instance(ext) => Value::ExternalInstance(ext.clone()),
            HostValue::Object(obj) => {
                let class_repr = self.classes.class_of(obj);
                if class_repr.is_none() && self.reject_unregistered_classes {
                    return Err(ClassError::UnknownClass {
                        name: obj.type_name().to_string(),
                    }
                    .into());
                }
                Value::ExternalInstance(self.instance(obj, Some(obj.repr()), class_repr)?)
            }
            HostValue::Predicate(pred) => Value::Call(Call {
                name: pred.name.clone(),
                args: self.encode_all(&pred.args)?,
                kwargs: pred
                    .kwargs
                    .as_ref()
                    .map(|kw| self.encode_fields(kw))
                    .transpose()?,
            }),
            HostValue::Variable(name) => Value::Variable(name.clone()),
            HostValue::Expression(expr) => Value::Expression(Operation {
                operator: expr.operator,
                args: self.encode_all(&expr.args)?,
            }),
            HostValue::Pattern(pattern) => {
                let fields = Dictionary {
                    fields: self.encode_fields(&pattern.fields)?,
                };
                match &pattern.tag {
                    Some(tag) => Value::Pattern(Pattern::Instance {
                        tag: tag.clone(),
                        fields,
                    }),
                    None => Value::Pattern(Pattern::Dictionary(fields)),
                }
            }
        };
        let term = Term::new(value);
        tracing::trace!(tag = term.tag(), "encoded term");
        Ok(term)
    }

    fn instance(
        &self,
        obj: &HostObject,
        repr: Option<String>,
        class_repr: Option<String>,
    ) -> HostResult<ExternalInstance> {
        Ok(ExternalInstance {
            instance_id: self.instances.register(obj)?,
            constructor: None,
            repr,
            class_repr,
            class_id: None,
        })
    }

    fn encode_all(&self, items: &[HostValue]) -> HostResult<Vec<Term>> {
        items.iter().map(|v| self.encode(v)).collect()
    }

    fn encode_fields(&self, fields: &BTreeMap<String, HostValue>) -> HostResult<BTreeMap<String, Term>> {
        fields
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.encode(v)?)))
            .collect()
    }
}
