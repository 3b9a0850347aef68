//! Messages exchanged between the membrane and a connected worker.
//!
//! A worker opens one long-lived stream, sends [`ClientMessage::Init`] and waits for
//! [`ServerMessage::InitAck`]. After that the membrane sends one [`ServerMessage::TriggerRequest`]
//! at a time and the worker answers each with a [`ClientMessage::TriggerResponse`] carrying the same id.

use {
    std::collections::HashMap,
    serde::{Serialize, Deserialize},
    crate::trigger::{Trigger, Response},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    Init(InitRequest),
    TriggerResponse {
        id: String,
        response: TriggerResponse,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    InitAck,
    InitRejected {
        reason: String,
    },
    TriggerRequest {
        id: String,
        request: TriggerRequest,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub trigger: Trigger,
    /// Trace propagation headers, forwarded so the worker can continue the caller's trace.
    pub trace_context: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerResponse {
    Http(Response),
    Event {
        success: bool,
    },
}

impl TriggerResponse {
    pub fn event_handled() -> Self {
        Self::Event { success: true }
    }

    pub fn event_failed() -> Self {
        Self::Event { success: false }
    }
}
