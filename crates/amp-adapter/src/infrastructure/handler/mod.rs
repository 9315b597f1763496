//! Handler implementations.
//!
//! - [`worker`]: the generic action-table handler with its worker thread.
//! - [`loopback`]: a self-contained SUT that answers stimuli with responses,
//!   shipped with the binary for broker smoke tests.

pub mod loopback;
pub mod worker;

pub use loopback::loopback_handler;
pub use worker::{required_param, ActionTable, WorkerHandler};

/// Waits for the next event a handler pushed into its sink.
#[cfg(test)]
pub(crate) async fn next_event(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<crate::application::handler::SutEvent>,
) -> crate::application::handler::SutEvent {
    tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await
        .expect("no event from worker within 2s")
        .expect("response sink dropped")
}
