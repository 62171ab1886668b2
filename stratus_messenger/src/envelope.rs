// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use crate::MessengerError;

/// Message as it travels on the bus.
///
/// A reply carries the `request_id` of the request it answers, which is the
/// only key used to correlate the two.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MessageEnvelope {
    pub request_id: String,
    pub event_id: String,
    /// Application identifier of the sender.
    pub source: String,
    /// Topic where the reply is expected, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub completed: bool,
}

impl MessageEnvelope {
    pub fn encode(&self) -> Result<Vec<u8>, MessengerError> {
        serde_json::to_vec(self).map_err(|err| MessengerError::Codec(err.to_string()))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, MessengerError> {
        serde_json::from_slice(raw).map_err(|err| MessengerError::Codec(err.to_string()))
    }

    /// Deserialize the payload into a typed value.
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, MessengerError> {
        serde_json::from_value(self.payload.clone()).map_err(|err| MessengerError::Codec(err.to_string()))
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
