pub use self::{
    worker::{Worker, WorkerId, BoxedReader, BoxedWriter},
    pool::{WorkerPool, BoxedWorkerPool, FaasWorkerPool, UnimplementedWorkerPool, WORKER_POLL_INTERVAL},
    listener::{WorkerListener, accept_worker},
};

mod listener;
mod pool;
mod worker;
