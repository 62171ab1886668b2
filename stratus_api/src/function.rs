// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use crate::entity::EntityLog;

/// Version assigned to a function created without an explicit version.
pub const INITIAL_VERSION: &str = "0.1.0";

/// Version sentinel meaning "keep the version currently stored".
pub const LATEST_VERSION: &str = "latest";

/// Status reported for a function without a workload.
pub const FUNCTION_STATUS_NOT_FOUND: &str = "not-found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum Runtime {
    #[serde(rename = "java")]
    Java,
    #[serde(rename = "nodejs")]
    NodeJS,
    #[serde(rename = "python_2.7")]
    Python27,
    #[serde(rename = "python_3.6")]
    Python36,
}

impl Runtime {
    pub fn all() -> [Runtime; 4] {
        [Self::Java, Self::NodeJS, Self::Python27, Self::Python36]
    }

    pub fn from_string(runtime: &str) -> Option<Self> {
        match runtime {
            "java" => Some(Self::Java),
            "nodejs" => Some(Self::NodeJS),
            "python_2.7" => Some(Self::Python27),
            "python_3.6" => Some(Self::Python36),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::NodeJS => "nodejs",
            Self::Python27 => "python_2.7",
            Self::Python36 => "python_3.6",
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

/// A named, versioned deployable unit.
///
/// - `source`: name of the artifact file the function was built from
/// - `handler`: handler as given by the user
/// - `handler_file`: entry file resolved from the handler and the artifact
/// - `handler_path`: entry path (e.g., exported function) inside the entry file
/// - `runtime`: one of the [`Runtime`] identifiers, kept verbatim so that
///   unsupported values can be reported by the validation
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Function {
    pub name: String,
    pub version: String,
    pub versions: Vec<String>,
    pub image: String,
    pub source: String,
    pub handler: String,
    pub handler_path: String,
    pub handler_file: String,
    pub runtime: String,
    pub events: Vec<String>,
    pub replicas: i32,
    pub env: Vec<EnvironmentVariable>,
    pub secret_key: String,
    pub route: String,
    pub log: Vec<EntityLog>,
    pub modified_at: String,
    pub status: String,
}

impl Function {
    pub fn runtime(&self) -> Option<Runtime> {
        Runtime::from_string(&self.runtime)
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }
}

impl crate::entity::Entity for Function {
    const KIND: &'static str = "function";

    fn identity(&self) -> &str {
        &self.name
    }

    fn set_identity(&mut self, id: String) {
        self.name = id;
    }

    fn set_modified_at(&mut self) {
        self.modified_at = crate::common::current_time();
    }

    fn attach_log(&mut self, log: Vec<EntityLog>) {
        self.log = log;
    }
}

/// Artifact uploaded together with a function definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionArtifact {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl FunctionArtifact {
    /// Extension of the artifact file name, including the leading dot.
    pub fn extension(&self) -> String {
        match std::path::Path::new(&self.file_name).extension() {
            Some(ext) => format!(".{}", ext.to_string_lossy()),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct BuildOptions {
    /// Push the image to the configured registry after the build.
    pub publish: bool,
}

/// A function definition as submitted for creation or update.
#[derive(Debug, Clone, Default)]
pub struct FunctionSubmission {
    pub function: Function,
    pub route: Option<crate::resource::Resource>,
    pub artifact: FunctionArtifact,
    pub options: BuildOptions,
}
