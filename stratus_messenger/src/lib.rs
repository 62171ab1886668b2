// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

pub mod envelope;
pub mod local_bus;
pub mod messenger;
pub mod pending;
pub mod redis_bus;
pub mod transport;

pub use envelope::MessageEnvelope;
pub use messenger::{EventHandler, IncomingEvent, Messenger, Outbound};
pub use transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("no reply received within {0:?}")]
    Timeout(std::time::Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request id already pending: {0}")]
    DuplicateRequestId(String),
    #[error("malformed message: {0}")]
    Codec(String),
}

/// Consumer group used when every subscriber must receive every message.
pub const EXCLUSIVE_GROUP: &str = "";
