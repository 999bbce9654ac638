//! # courrier-shared
//!
//! Types shared across the Courrier sync engine: identifier newtypes,
//! the message body model, the delivery-status state machine, tuned
//! constants, and the error taxonomy for remote collaborators.

pub mod constants;
pub mod error;
pub mod status;
pub mod types;

pub use error::RemoteError;
pub use status::DeliveryStatus;
pub use types::{ConversationId, LocalId, MessageBody, UserId};
