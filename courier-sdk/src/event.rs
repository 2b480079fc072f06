//! Connection lifecycle events emitted to the consumer.

use crate::error::Error;

/// A transport state transition, delivered on the `connection_changed`
/// channel. One event is emitted per successful connect and per loss or
/// failure, in order.
#[derive(Debug)]
pub struct ConnectionState {
    pub connected: bool,
    /// The error that caused a disconnect or failed attempt, if any.
    pub error: Option<Error>,
}

impl ConnectionState {
    pub(crate) fn up() -> Self {
        Self {
            connected: true,
            error: None,
        }
    }

    pub(crate) fn down(error: Error) -> Self {
        Self {
            connected: false,
            error: Some(error),
        }
    }
}
