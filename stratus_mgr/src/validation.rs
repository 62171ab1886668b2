// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use stratus_api::common::env_keys;
use stratus_api::function::{Function, FunctionSubmission, Runtime, INITIAL_VERSION, LATEST_VERSION};
use stratus_api::resource::{Event, Resource, ROUTE_METHODS};

use crate::error::FunctionError;
use crate::event_catalog::{resolve_event, ResolvedEvent};
use crate::store::Store;

pub const MSG_NAME_EMPTY: &str = "name field should not be empty";
pub const MSG_NAME_SPACES: &str = "name field not allow to contain spaces";
pub const MSG_RUNTIME_EMPTY: &str = "runtime field should not be empty";
pub const MSG_HANDLER_EMPTY: &str = "handler field should not be empty";
pub const MSG_RUNTIME_NOT_MATCH: &str = "runtime not match";
pub const MSG_REPLICAS_INVALID: &str = "replicas value is invalide";
pub const MSG_ALREADY_EXISTS: &str = "function is already exists";
pub const MSG_NOT_FOUND: &str = "function not found";
pub const MSG_HANDLER_INVALID: &str = "handler is invalide. unable to found module";
pub const MSG_ARTIFACT_INVALID: &str = "artifact file type invalide for runtime";

/// Name of the entry file of a java function inside the image.
pub const JAVA_ENTRY_FILE: &str = "function.jar";

/// Directory where packaged artifacts are extracted inside the image.
pub const PACKAGE_DIR: &str = "function_handler";

const PACKAGE_EXTENSIONS: [&str; 3] = [".tar", ".gz", ".tgz"];

/// Resolve the entry file and the entry path of a handler, given the
/// extension of the artifact submitted with it.
pub fn resolve_handler(runtime: Runtime, handler: &str, extension: &str) -> Result<(String, String), String> {
    let is_package = PACKAGE_EXTENSIONS.contains(&extension);
    if runtime == Runtime::Java {
        return match extension {
            ".jar" => Ok((JAVA_ENTRY_FILE.to_string(), handler.to_string())),
            _ => Err(MSG_ARTIFACT_INVALID.to_string()),
        };
    }

    // module.function
    let parts: Vec<&str> = handler.split('.').collect();
    if parts.len() < 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(MSG_HANDLER_INVALID.to_string());
    }
    let (module, path) = (parts[0], parts[1].to_string());

    match runtime {
        Runtime::NodeJS if is_package => Ok((format!("{}/{}.js", PACKAGE_DIR, module), path)),
        Runtime::NodeJS if extension == ".js" => Ok((format!("{}.js", module), path)),
        Runtime::Python27 | Runtime::Python36 if is_package => Ok((format!("{}/{}.py", PACKAGE_DIR, module), path)),
        _ => Err(MSG_ARTIFACT_INVALID.to_string()),
    }
}

/// Check the fields of a submission, normalizing them in place.
///
/// Every failure is reported. Events are rewritten with their resolved
/// identifiers and the user events to register are returned.
pub fn validate_fields(submission: &mut FunctionSubmission) -> (Vec<String>, Vec<Event>) {
    let mut errors = vec![];
    let function = &mut submission.function;
    function.name = function.name.trim().to_string();

    if function.name.is_empty() {
        errors.push(MSG_NAME_EMPTY.to_string());
    }
    if function.name.chars().any(char::is_whitespace) {
        errors.push(MSG_NAME_SPACES.to_string());
    }
    if function.runtime.is_empty() {
        errors.push(MSG_RUNTIME_EMPTY.to_string());
    }
    if function.handler.is_empty() {
        errors.push(MSG_HANDLER_EMPTY.to_string());
    }

    if !function.runtime.is_empty() {
        match function.runtime() {
            None => errors.push(MSG_RUNTIME_NOT_MATCH.to_string()),
            Some(runtime) => {
                if !function.handler.is_empty() {
                    match resolve_handler(runtime, &function.handler, &submission.artifact.extension()) {
                        Ok((handler_file, handler_path)) => {
                            function.handler_file = handler_file;
                            function.handler_path = handler_path;
                        }
                        Err(err) => errors.push(err),
                    }
                }
            }
        }
    }

    if function.replicas < 0 {
        errors.push(MSG_REPLICAS_INVALID.to_string());
    }

    let mut to_register = vec![];
    let mut resolved = vec![];
    for raw in &function.events {
        match resolve_event(raw) {
            Ok(event) => {
                if !resolved.iter().any(|id| id == event.id()) {
                    resolved.push(event.id().to_string());
                }
                if let ResolvedEvent::User(event) = event {
                    to_register.push(event);
                }
            }
            Err(err) => errors.push(err),
        }
    }
    function.events = resolved;

    let mut env_names = std::collections::HashSet::new();
    for env in &function.env {
        let name = env.name.trim();
        if name.is_empty() {
            errors.push("env name should not be empty".to_string());
        } else if env_keys::RESERVED.contains(&name) {
            errors.push(format!("env name is reserved: {}", name));
        } else if !env_names.insert(name.to_string()) {
            errors.push(format!("env name is duplicated: {}", name));
        }
    }

    if let Some(route) = submission.route.as_mut() {
        errors.append(&mut validate_route(route));
    }

    (errors, to_register)
}

/// Check a route bound to a function, if a URL is given.
pub fn validate_route(route: &mut Resource) -> Vec<String> {
    let mut errors = vec![];
    route.url = route.url.trim().to_string();
    if route.url.is_empty() {
        return errors;
    }
    if !route.url.starts_with('/') {
        errors.push("route url should start with /".to_string());
    }
    route.request_method = route.request_method.trim().to_uppercase();
    if !ROUTE_METHODS.contains(&route.request_method.as_str()) {
        errors.push(format!("route request method is invalide: '{}'", route.request_method));
    }
    errors
}

/// Settle the version and the version history of a submission against the
/// stored function, if any.
///
/// An empty version or `latest` keeps the stored version (or starts from the
/// initial version), a new version is appended to the history once.
pub fn resolve_versions(function: &mut Function, stored: Option<&Function>) {
    let keep_current = function.version.is_empty() || function.version == LATEST_VERSION;
    match stored {
        Some(stored) => {
            function.versions = stored.versions.clone();
            if keep_current {
                function.version = stored.version.clone();
            }
        }
        None => {
            function.versions = vec![];
            if keep_current {
                function.version = INITIAL_VERSION.to_string();
            }
        }
    }
    if !function.has_version(&function.version) {
        function.versions.push(function.version.clone());
    }
}

/// Result of a successful validation.
pub struct Validated {
    /// The stored function, on update.
    pub stored: Option<Function>,
    /// User events to register in the catalog.
    pub events: Vec<Event>,
}

/// Validate a submission for creation or update, also settling its versions.
///
/// Field errors are reported all together as invalid input, and the
/// existence failure is added to them if any. An existence failure alone is
/// reported as such.
pub async fn validate_submission(store: &Store, submission: &mut FunctionSubmission, is_create: bool) -> Result<Validated, FunctionError> {
    let (mut errors, events) = validate_fields(submission);

    let stored = match submission.function.name.is_empty() {
        true => None,
        false => store.find::<Function>(&submission.function.name).await?,
    };
    let existence_error = match (is_create, stored.is_some()) {
        (true, true) => Some(FunctionError::AlreadyExists(MSG_ALREADY_EXISTS.to_string())),
        (false, false) => Some(FunctionError::NotFound(MSG_NOT_FOUND.to_string())),
        _ => None,
    };

    match (errors.is_empty(), existence_error) {
        (true, Some(err)) => Err(err),
        (false, existence_error) => {
            if let Some(err) = existence_error {
                errors.append(&mut err.messages());
            }
            Err(FunctionError::InvalidInput(errors))
        }
        (true, None) => {
            resolve_versions(&mut submission.function, stored.as_ref());
            Ok(Validated { stored, events })
        }
    }
}
