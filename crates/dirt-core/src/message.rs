use serde::{Deserialize, Serialize};

use crate::value::{Args, KwArgs, Value};

/// The six wire message types (spec §3). `call`/`call_ignore` travel
/// client-to-server; `return`/`raise`/`yield`/`stop` travel server-to-client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Call {
        name: String,
        args: Args,
        kwargs: KwArgs,
    },
    CallIgnore {
        name: String,
        args: Args,
        kwargs: KwArgs,
    },
    Return(Value),
    Raise(String),
    Yield(Value),
    Stop,
}

impl Message {
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Call { .. } => "call",
            Message::CallIgnore { .. } => "call_ignore",
            Message::Return(_) => "return",
            Message::Raise(_) => "raise",
            Message::Yield(_) => "yield",
            Message::Stop => "stop",
        }
    }
}
