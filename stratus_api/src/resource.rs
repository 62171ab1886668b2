// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

/// Default request timeout of a route, in ms.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default status returned by a route on success.
pub const DEFAULT_SUCCESS_STATUS: u16 = 200;

/// HTTP methods accepted for routes.
pub const ROUTE_METHODS: [&str; 5] = ["GET", "POST", "PUT", "DELETE", "PATCH"];

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct RequestMappingTemplate {
    pub event_attribute: String,
    pub request_attribute: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct HeaderMappingTemplate {
    pub event_attribute: String,
    pub header_attribute: String,
}

/// A route exposed by the API gateway, mapping a URL and method to an event.
///
/// The identifier is `URL:METHOD`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub request_method: String,
    pub url: String,
    #[serde(rename = "async")]
    pub is_async: bool,
    pub request_timeout: u64,
    pub success_response_status: u16,
    pub event: String,
    pub request_mapping: Vec<RequestMappingTemplate>,
    pub header_mapping: Vec<HeaderMappingTemplate>,
    pub headers_to_pass: Vec<String>,
    pub created_at: String,
    pub modified_at: String,
}

impl Default for Resource {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            request_method: String::new(),
            url: String::new(),
            is_async: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_MS,
            success_response_status: DEFAULT_SUCCESS_STATUS,
            event: String::new(),
            request_mapping: vec![],
            header_mapping: vec![],
            headers_to_pass: vec![],
            created_at: String::new(),
            modified_at: String::new(),
        }
    }
}

impl Resource {
    pub fn make_id(url: &str, method: &str) -> String {
        format!("{}:{}", url, method.to_uppercase())
    }
}

impl crate::entity::Entity for Resource {
    const KIND: &'static str = "resource";

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
}

/// An event of the catalog, with identifier `<prefix>.<group>.<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Event {
    pub id: String,
    pub group: String,
    pub name: String,
    pub created_at: String,
    pub modified_at: String,
}

impl crate::entity::Entity for Event {
    const KIND: &'static str = "event";

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
}
