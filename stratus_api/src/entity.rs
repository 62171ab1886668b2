// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

/// A record managed by the persistence collaborator.
///
/// Every kind of record declares the bucket where it is stored and how its
/// identity is read and written, so that the storage layer never needs to
/// introspect the records.
pub trait Entity: serde::Serialize + serde::de::DeserializeOwned + Send + Sync {
    /// Name of the bucket holding the records of this kind.
    const KIND: &'static str;

    fn identity(&self) -> &str;

    fn set_identity(&mut self, id: String);

    /// Stamp the last-modified time, if the record keeps one.
    fn set_modified_at(&mut self) {}

    /// Attach the audit log kept by the store next to the record.
    fn attach_log(&mut self, _log: Vec<EntityLog>) {}
}

/// One state transition in the audit log of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct EntityLog {
    pub time: String,
    pub state: String,
    pub message: String,
}

impl EntityLog {
    pub fn new(state: &str, message: &str) -> Self {
        Self {
            time: crate::common::current_time(),
            state: state.to_string(),
            message: message.to_string(),
        }
    }
}

/// States recorded in the audit logs.
pub mod log_state {
    pub const SAVED: &str = "saved";
    pub const IMAGE_BUILDING_FAILED: &str = "image-building-failed";
    pub const IMAGE_CREATED: &str = "image-created";
    pub const DEPLOYED: &str = "deployed";
    pub const DEPLOYMENT_FAILED: &str = "deployment-failed";
    pub const STOPPED: &str = "stopped";
}
