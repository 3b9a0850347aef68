pub use {
    membrane_core::{
        Trigger,
        HttpRequest,
        Event,
        Response,
        protocol::{TriggerRequest, TriggerResponse},
    },
    crate::{
        client::WorkerClient,
        error::SdkError,
        handler::{BoxFuture, TriggerHandler},
    },
};

mod client;
mod error;
mod handler;
