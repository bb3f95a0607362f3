//! Wire messages exchanged on a substream.

use std::fmt;

use pagelet_core::Data;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::RpcError;

/// Message `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Rpc,
    Emit,
    Get,
    Post,
    Put,
    Fragment,
    Err,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rpc => "rpc",
            Self::Emit => "emit",
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Fragment => "fragment",
            Self::Err => "err",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation id, echoed back on replies. Clients send numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallId {
    Number(u64),
    Text(String),
}

impl From<u64> for CallId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

/// One substream frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CallId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Inbound message, sorted by what the pagelet has to do with it.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `rpc`: invoke a method and reply.
    Call {
        id: Option<CallId>,
        method: Option<String>,
        args: Vec<Data>,
    },
    /// `emit`: notify listeners, no reply.
    Event { name: Option<String>, args: Vec<Data> },
    /// `get`: render and reply with the view and state.
    Render { id: Option<CallId> },
    /// `post` / `put`: run the handler on the fields, then render.
    Submit {
        verb: MessageKind,
        id: Option<CallId>,
        fields: Data,
    },
    /// Outbound-only types sent by the client.
    Unsupported { kind: MessageKind, id: Option<CallId> },
}

impl RpcMessage {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            id: None,
            method: None,
            args: Vec::new(),
        }
    }

    /// Client-side `rpc` call.
    pub fn call(id: impl Into<CallId>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: Some(id.into()),
            method: Some(method.into()),
            args,
            ..Self::new(MessageKind::Rpc)
        }
    }

    pub fn with_id(mut self, id: impl Into<CallId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Successful `rpc` reply: `args = [null, ...values]`.
    pub fn reply_ok(id: Option<CallId>, values: Vec<Value>) -> Self {
        let mut args = Vec::with_capacity(values.len() + 1);
        args.push(Value::Null);
        args.extend(values);
        Self {
            id,
            args,
            ..Self::new(MessageKind::Rpc)
        }
    }

    /// Failed `rpc` reply: `args = [{name, message}]`.
    pub fn reply_err(id: Option<CallId>, name: &str, message: &str) -> Self {
        Self {
            id,
            args: vec![error_value(name, message)],
            ..Self::new(MessageKind::Rpc)
        }
    }

    /// Rendered view and state: `args = [markup, state]`.
    pub fn fragment(id: Option<CallId>, markup: String, state: Value) -> Self {
        Self {
            id,
            args: vec![Value::String(markup), state],
            ..Self::new(MessageKind::Fragment)
        }
    }

    /// Failure outside of an `rpc` call: `args = [{name, message}]`.
    pub fn err(id: Option<CallId>, error: &RpcError) -> Self {
        Self {
            id,
            args: vec![error_value(error.name(), &error.to_string())],
            ..Self::new(MessageKind::Err)
        }
    }

    pub fn from_json(frame: &str) -> Result<Self, RpcError> {
        Ok(serde_json::from_str(frame)?)
    }

    pub fn to_json(&self) -> String {
        // Plain data fields; serializing them cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"type":"{}"}}"#, self.kind))
    }

    pub fn classify(self) -> Inbound {
        let Self {
            kind,
            id,
            method,
            args,
        } = self;

        match kind {
            MessageKind::Rpc => Inbound::Call { id, method, args },
            MessageKind::Emit => Inbound::Event { name: method, args },
            MessageKind::Get => Inbound::Render { id },
            MessageKind::Post | MessageKind::Put => Inbound::Submit {
                verb: kind,
                id,
                fields: args.into_iter().next().unwrap_or_else(|| json!({})),
            },
            MessageKind::Fragment | MessageKind::Err => Inbound::Unsupported { kind, id },
        }
    }
}

fn error_value(name: &str, message: &str) -> Value {
    json!({"name": name, "message": message})
}
