// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use crate::entity::EntityLog;

/// Where a manager component can be reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ComponentDeployment {
    pub host: String,
    pub port: u16,
}

/// A peer service deployed and registered by the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ManagerComponent {
    pub id: String,
    pub image: String,
    pub access_key: String,
    pub deployment: ComponentDeployment,
    pub log: Vec<EntityLog>,
    pub created_at: String,
    pub modified_at: String,
}

impl crate::entity::Entity for ManagerComponent {
    const KIND: &'static str = "manager-component";

    fn identity(&self) -> &str {
        &self.id
    }

    fn set_identity(&mut self, id: String) {
        self.id = id;
    }

    fn set_modified_at(&mut self) {
        let now = crate::common::current_time();
        if self.created_at.is_empty() {
            self.created_at = now.clone();
        }
        self.modified_at = now;
    }

    fn attach_log(&mut self, log: Vec<EntityLog>) {
        self.log = log;
    }
}

/// Payload of the reply to a gateway configuration fetch.
///
/// Both collections are always serialized, empty when there are no records.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct GatewayData {
    pub manager_components: Vec<ManagerComponent>,
    pub resources: Vec<crate::resource::Resource>,
}
