//! Loopback SUT.
//!
//! Every stimulus is answered immediately with a response carrying the same
//! parameter:
//!
//! | stimulus                  | response                   |
//! |---------------------------|----------------------------|
//! | `echo { text: string }`   | `echoed { text }`          |
//! | `ping { token: integer }` | `pong { token }`           |
//! | `inspect { payload: struct }` | `inspected { payload }` |

use amp_core::protocol::{Label, LabelType};
use tracing::info;

use crate::application::handler::ResponseSink;
use crate::infrastructure::handler::worker::{required_param, ActionTable, WorkerHandler};

/// Builds the action table of the loopback SUT.
pub fn loopback_table() -> ActionTable {
    let mut table = ActionTable::new();
    for (stimulus, response, param, type_name) in [
        ("echo", "echoed", "text", "string"),
        ("ping", "pong", "token", "integer"),
        ("inspect", "inspected", "payload", "struct"),
    ] {
        table = table
            .on_stimulus(
                Label::declare(stimulus, LabelType::Stimulus, &[(param, type_name)]),
                move |label| {
                    let value = required_param(label, param)?;
                    Ok(vec![Label::response(response).with_param(param, value)])
                },
            )
            .declare_response(Label::declare(
                response,
                LabelType::Response,
                &[(param, type_name)],
            ));
    }
    table
}

/// A [`WorkerHandler`] driving the loopback SUT.
pub fn loopback_handler(sink: ResponseSink, headless: bool) -> WorkerHandler {
    info!("loopback SUT configured (headless: {headless})");
    WorkerHandler::new(loopback_table(), sink)
}
