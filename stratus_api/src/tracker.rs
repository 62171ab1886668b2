// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RequestTrackerResponse {
    pub status: u16,
    pub message: serde_json::Value,
}

/// A log line produced while serving a tracked request.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct TrackerLog {
    #[serde(rename = "type")]
    pub log_type: String,
    pub message: String,
    /// Function workload or component that produced the line.
    pub source: String,
    pub time: String,
}

/// The history of one request travelling through functions and gateway.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct RequestTracker {
    pub request_id: String,
    pub source: String,
    pub response: RequestTrackerResponse,
    pub created_at: String,
    pub completed_at: String,
    pub logs: Vec<TrackerLog>,
}

impl crate::entity::Entity for RequestTracker {
    const KIND: &'static str = "request-tracker";

    fn identity(&self) -> &str {
        &self.request_id
    }

    fn set_identity(&mut self, id: String) {
        self.request_id = id;
    }
}

/// Message published on the request-tracker event.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct RequestTrackerMessage {
    pub request_id: String,
    pub source: String,
    pub response: Option<RequestTrackerResponse>,
    pub log: Option<TrackerLog>,
    pub completed: bool,
}
