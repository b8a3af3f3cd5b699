//! Engine callback events.
//!
//! While a query runs, the engine suspends and emits an event whenever it
//! needs the host. The five host-answered events map one-to-one onto the
//! [`Host`] callbacks:
//!
//! | Event | Callback | Answer |
//! |---|---|---|
//! | `MakeExternal` | [`Host::make_instance_from_call`] | none |
//! | `ExternalIsa` | [`Host::isa`] | bool |
//! | `ExternalIsSubclass` | [`Host::is_subclass`] | bool |
//! | `ExternalIsSubSpecializer` | [`Host::subspecializer`] | bool |
//! | `ExternalOp` | [`Host::operator`] | bool |

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{HostResult, TermError, TermResult};
use crate::host::Host;
use crate::registry::InstanceId;
use crate::terms::{single_tag, Term, Value};

const EVENT_TAGS: [&str; 5] = [
    "MakeExternal",
    "ExternalIsa",
    "ExternalIsSubclass",
    "ExternalIsSubSpecializer",
    "ExternalOp",
];

/// A callback request from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostEvent {
    MakeExternal {
        instance_id: InstanceId,
        constructor: Term,
    },
    ExternalIsa {
        call_id: u64,
        instance: Term,
        class_tag: String,
    },
    ExternalIsSubclass {
        call_id: u64,
        left_class_tag: String,
        right_class_tag: String,
    },
    ExternalIsSubSpecializer {
        call_id: u64,
        instance_id: InstanceId,
        left_class_tag: String,
        right_class_tag: String,
    },
    ExternalOp {
        call_id: u64,
        operator: String,
        args: Vec<Term>,
    },
}

/// The host's reply to a question-style event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAnswer {
    pub call_id: u64,
    pub result: bool,
}

impl HostEvent {
    /// Read an event object such as `{"ExternalIsa": {...}}`.
    pub fn from_json(json: &Json) -> TermResult<Self> {
        let (tag, _) = single_tag("event", json)?;
        if !EVENT_TAGS.contains(&tag) {
            return Err(TermError::UnrecognizedTag {
                tag: tag.to_string(),
                context: "event".into(),
            });
        }
        serde_json::from_value(json.clone())
            .map_err(|e| TermError::decode(tag, "event payload", e.to_string()))
    }

    /// Parse an event from its JSON text.
    pub fn parse(text: &str) -> TermResult<Self> {
        let json: Json = serde_json::from_str(text).map_err(|e| TermError::Json {
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HostEvent::MakeExternal { .. } => "MakeExternal",
            HostEvent::ExternalIsa { .. } => "ExternalIsa",
            HostEvent::ExternalIsSubclass { .. } => "ExternalIsSubclass",
            HostEvent::ExternalIsSubSpecializer { .. } => "ExternalIsSubSpecializer",
            HostEvent::ExternalOp { .. } => "ExternalOp",
        }
    }
}

impl Host {
    /// Run the callback an event asks for.
    ///
    /// Returns the answer to send back, or `None` for `MakeExternal`, which the
    /// engine does not wait on.
    pub fn handle_event(&self, event: &HostEvent) -> HostResult<Option<CallbackAnswer>> {
        tracing::debug!(event = event.kind(), "handling engine event");
        let answer = match event {
            HostEvent::MakeExternal {
                instance_id,
                constructor,
            } => {
                self.make_instance_from_call(constructor, *instance_id)?;
                return Ok(None);
            }
            HostEvent::ExternalIsa {
                call_id,
                instance,
                class_tag,
            } => CallbackAnswer {
                call_id: *call_id,
                result: self.isa(instance, class_tag)?,
            },
            HostEvent::ExternalIsSubclass {
                call_id,
                left_class_tag,
                right_class_tag,
            } => CallbackAnswer {
                call_id: *call_id,
                result: self.is_subclass(left_class_tag, right_class_tag)?,
            },
            HostEvent::ExternalIsSubSpecializer {
                call_id,
                instance_id,
                left_class_tag,
                right_class_tag,
            } => CallbackAnswer {
                call_id: *call_id,
                result: self.subspecializer(*instance_id, left_class_tag, right_class_tag)?,
            },
            HostEvent::ExternalOp {
                call_id,
                operator,
                args,
            } => CallbackAnswer {
                call_id: *call_id,
                result: self.operator(operator, &Term::new(Value::List(args.clone())))?,
            },
        };
        Ok(Some(answer))
    }
}
