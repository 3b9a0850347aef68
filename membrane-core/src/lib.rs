pub use {
    http::HeaderMap,
    crate::{
        error::{DecodeError, FrameError},
        trigger::{Trigger, TriggerKind, HttpRequest, Event, Response, QueryParams, append_header},
        query::parse_query,
    },
};

pub mod error;
pub mod frame;
pub mod protocol;
mod query;
mod trigger;
