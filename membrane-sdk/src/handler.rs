use {
    std::pin::Pin,
    membrane_core::protocol::{TriggerRequest, TriggerResponse},
};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// User function invoked once per trigger. Implemented for async closures taking a [`TriggerRequest`].
pub trait TriggerHandler: Send + Sync + 'static {
    fn call(&self, request: TriggerRequest) -> BoxFuture<TriggerResponse>;
}

impl<F, Fut> TriggerHandler for F
where
    F: Fn(TriggerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TriggerResponse> + Send + 'static,
{
    fn call(&self, request: TriggerRequest) -> BoxFuture<TriggerResponse> {
        Box::pin(self(request))
    }
}
