//! # Task Envelope
//!
//! The unit exchanged on the task channel, an ordered array:
//!
//! ```text
//! [task_id, "call",      function, arg0, arg1, ...]
//! [task_id, "result",    value?]
//! [task_id, "exception", type_name, message, traceback]
//! ```
//!
//! The array is serialized through serde as a sequence and packed as
//! MessagePack. Elements are modelled as JSON values; a MessagePack `bin`
//! element decodes to an array of its byte values.

use crate::correlation::TaskId;
use crate::errors::{EnvelopeError, RemoteTaskError};
use bytes::Bytes;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Action name of a call.
pub const ACTION_CALL: &str = "call";
/// Action name of a successful result.
pub const ACTION_RESULT: &str = "result";
/// Action name of a failed result.
pub const ACTION_EXCEPTION: &str = "exception";

/// What an envelope carries.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskMessage {
    /// Invoke `function` with positional `args`.
    Call { function: String, args: Vec<Value> },
    /// The handler returned, optionally with a value.
    Result { value: Option<Value> },
    /// The handler failed.
    Exception {
        type_name: String,
        message: String,
        traceback: String,
    },
}

impl TaskMessage {
    /// Wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Call { .. } => ACTION_CALL,
            Self::Result { .. } => ACTION_RESULT,
            Self::Exception { .. } => ACTION_EXCEPTION,
        }
    }
}

/// A task message addressed by its correlation ID.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<Value>")]
pub struct TaskEnvelope {
    pub task_id: TaskId,
    pub message: TaskMessage,
}

impl TaskEnvelope {
    /// A `call` envelope.
    pub fn call(task_id: TaskId, function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            task_id,
            message: TaskMessage::Call {
                function: function.into(),
                args,
            },
        }
    }

    /// A `result` envelope.
    pub fn result(task_id: TaskId, value: Value) -> Self {
        Self {
            task_id,
            message: TaskMessage::Result { value: Some(value) },
        }
    }

    /// An `exception` envelope.
    pub fn exception(task_id: TaskId, error: RemoteTaskError) -> Self {
        Self {
            task_id,
            message: TaskMessage::Exception {
                type_name: error.exc_type_name,
                message: error.exc_message,
                traceback: error.formatted_traceback,
            },
        }
    }

    /// Serialize for the wire.
    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        rmp_serde::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| EnvelopeError::Encode(e.to_string()))
    }

    /// Parse a wire payload.
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let values: Vec<WireValue> =
            rmp_serde::from_slice(payload).map_err(|e| EnvelopeError::Decode(e.to_string()))?;
        Self::try_from(values.into_iter().map(|v| v.0).collect::<Vec<_>>())
    }
}

/// One decoded envelope element.
struct WireValue(Value);

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WireValueVisitor).map(WireValue)
    }
}

struct WireValueVisitor;

impl<'de> Visitor<'de> for WireValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a MessagePack value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Array(v.iter().map(|b| Value::from(*b)).collect()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        WireValue::deserialize(deserializer).map(|v| v.0)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(WireValue(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut object = Map::new();
        while let Some((key, WireValue(value))) = map.next_entry::<String, WireValue>()? {
            object.insert(key, value);
        }
        Ok(Value::Object(object))
    }
}

impl Serialize for TaskEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 2 + match &self.message {
            TaskMessage::Call { args, .. } => 1 + args.len(),
            TaskMessage::Result { value } => usize::from(value.is_some()),
            TaskMessage::Exception { .. } => 3,
        };

        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.task_id)?;
        seq.serialize_element(self.message.action())?;
        match &self.message {
            TaskMessage::Call { function, args } => {
                seq.serialize_element(function)?;
                for arg in args {
                    seq.serialize_element(arg)?;
                }
            }
            TaskMessage::Result { value } => {
                if let Some(value) = value {
                    seq.serialize_element(value)?;
                }
            }
            TaskMessage::Exception {
                type_name,
                message,
                traceback,
            } => {
                seq.serialize_element(type_name)?;
                seq.serialize_element(message)?;
                seq.serialize_element(traceback)?;
            }
        }
        seq.end()
    }
}

fn string_at(values: &[Value], index: usize, what: &str) -> Result<String, EnvelopeError> {
    match values.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(EnvelopeError::Malformed(format!(
            "{what} must be a string, got {other}"
        ))),
        None => Err(EnvelopeError::Malformed(format!("missing {what}"))),
    }
}

impl TryFrom<Vec<Value>> for TaskEnvelope {
    type Error = EnvelopeError;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        let task_id = TaskId::from(string_at(&values, 0, "task id")?);
        let action = string_at(&values, 1, "action")?;

        let message = match action.as_str() {
            ACTION_CALL => {
                let function = string_at(&values, 2, "function name")?;
                TaskMessage::Call {
                    function,
                    args: values.into_iter().skip(3).collect(),
                }
            }
            ACTION_RESULT => TaskMessage::Result {
                value: values.into_iter().nth(2),
            },
            ACTION_EXCEPTION => TaskMessage::Exception {
                type_name: string_at(&values, 2, "exception type")?,
                message: string_at(&values, 3, "exception message").unwrap_or_default(),
                traceback: string_at(&values, 4, "traceback").unwrap_or_default(),
            },
            _ => return Err(EnvelopeError::UnknownAction { task_id, action }),
        };

        Ok(Self { task_id, message })
    }
}
