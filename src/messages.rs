use error_stack::Result;
use tokio::sync::oneshot;

use crate::channel::{Field, WireValue};
use crate::error::AdapterError;
use crate::state::Value;

/// An already validated set operation, owned by the dispatcher until the device answers.
#[derive(Debug)]
pub struct PendingCommand {
    pub field: Field,
    pub value: Value,
    pub wire: WireValue,
    pub reply: oneshot::Sender<Result<(), AdapterError>>,
}

#[derive(Debug)]
pub enum ToDispatcherMessage {
    SetTarget(PendingCommand),
}
