// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

/// Error rendered towards the outer layers (e.g., an HTTP front-end).
///
/// `cause` is a stable tag, `message` the list of human-readable reasons.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ErrorResponse {
    pub cause: String,
    pub message: Vec<String>,
    pub status: u16,
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(fmt, "{} ({}): {}", self.cause, self.status, self.message.join("; "))
    }
}

/// Event identifiers are made of segments joined by this separator.
pub const EVENT_JOIN: &str = ".";

/// Prefix of the events declared by users.
pub const EVENT_PREFIX_USER_DEFINED: &str = "users";

/// Prefix of the events that invoke a function directly.
pub const EVENT_PREFIX_FUNCTION: &str = "function";

/// Event used by peers (e.g., the API gateway) to fetch routes and components.
pub const EVENT_APIGATEWAY_DATA_FETCH: &str = "stratus.apigateway.data.fetch";

/// Event published when the route table changed.
pub const EVENT_APIGATEWAY_RELOAD: &str = "stratus.apigateway.reload";

/// Event on which functions and the gateway publish request-tracking logs.
pub const EVENT_REQUEST_TRACKER: &str = "stratus.request.tracker";

/// Consumer group of the manager's own subscriptions.
pub const CONSUMER_MGR: &str = "stratus-mgr";

/// Manager component identifiers.
pub const COMPONENT_EVENT_BUS: &str = "stratus-eventbus";
pub const COMPONENT_API_GATEWAY: &str = "stratus-apigateway";
pub const COMPONENT_EVENT_BOX: &str = "stratus-eventbox";

/// Names of the environment variables injected into function workloads.
pub mod env_keys {
    pub const APP_ID: &str = "app_id";
    pub const EVENTBUS_HOST: &str = "eventbus_host";
    pub const EVENTBUS_PORT: &str = "eventbus_port";
    pub const EVENTBUS_EXCHANGE: &str = "eventbus_exchange";
    pub const EVENTBUS_MANAGEMENT_USERNAME: &str = "eventbus_management_username";
    pub const EVENTBUS_MANAGEMENT_PASSWORD: &str = "eventbus_management_password";
    pub const EVENT_PREFIX_USER_DEFINED: &str = "event_prefix_user_defined";
    pub const EVENT_LOG_LISTENER: &str = "event_log_listener";
    pub const EVENTS: &str = "events";
    pub const ARTIFACT_LOCATION: &str = "artifact_location";
    pub const FUNCTION_PATH: &str = "function_path";
    pub const EVENTBOX_URI: &str = "eventbox_uri";

    /// All the names reserved by the platform, which users cannot declare.
    pub const RESERVED: [&str; 12] = [
        APP_ID,
        EVENTBUS_HOST,
        EVENTBUS_PORT,
        EVENTBUS_EXCHANGE,
        EVENTBUS_MANAGEMENT_USERNAME,
        EVENTBUS_MANAGEMENT_PASSWORD,
        EVENT_PREFIX_USER_DEFINED,
        EVENT_LOG_LISTENER,
        EVENTS,
        ARTIFACT_LOCATION,
        FUNCTION_PATH,
        EVENTBOX_URI,
    ];
}

/// Current time as an RFC 3339 string, used for all the timestamps stored.
pub fn current_time() -> String {
    chrono::Utc::now().to_rfc3339()
}
