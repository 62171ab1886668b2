// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use stratus_api::function::{Function, FunctionArtifact, Runtime};
use stratus_api::image_builder::ImageBuilder;

use crate::error::FunctionError;
use crate::validation::{JAVA_ENTRY_FILE, PACKAGE_DIR};

/// Temporary build context, removed when dropped.
pub struct StagingDir {
    path: std::path::PathBuf,
}

impl StagingDir {
    pub fn new(build_root: &std::path::Path) -> anyhow::Result<Self> {
        let path = build_root.join(format!("stratus-build-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            log::warn!("could not remove build context {}: {}", self.path.display(), err);
        }
    }
}

/// Image the function images are built from.
pub fn base_image(runtime: Runtime) -> &'static str {
    match runtime {
        Runtime::Java => "stratus/stratus-container-java:0.1.0",
        Runtime::NodeJS => "stratus/stratus-container-nodejs:0.1.0",
        Runtime::Python27 => "stratus/stratus-container-python-2_7:0.1.0",
        Runtime::Python36 => "stratus/stratus-container-python-3_6:0.1.0",
    }
}

/// Image reference of a function version.
pub fn image_tag(registry_server: Option<&str>, name: &str, version: &str) -> String {
    match registry_server {
        Some(server) if !server.is_empty() => format!("{}/{}:{}", server, name, version),
        _ => format!("{}:{}", name, version),
    }
}

/// Name of the artifact inside the build context.
pub fn artifact_file_name(function: &Function, artifact: &FunctionArtifact) -> String {
    match artifact.extension().as_str() {
        ".jar" => JAVA_ENTRY_FILE.to_string(),
        ".js" => function.handler_file.clone(),
        ".tar" => format!("{}.tar", PACKAGE_DIR),
        _ => format!("{}.tar.gz", PACKAGE_DIR),
    }
}

/// Dockerfile of a function image.
///
/// Packaged artifacts are extracted by `ADD` under the package directory.
pub fn dockerfile(runtime: Runtime, artifact_name: &str, access_key: &str) -> String {
    let add = match artifact_name.starts_with(PACKAGE_DIR) {
        true => format!("ADD {} /app/{}/", artifact_name, PACKAGE_DIR),
        false => format!("ADD {} /app/{}", artifact_name, artifact_name),
    };
    format!("FROM {}\n{}\nENV access_key {}\n", base_image(runtime), add, access_key)
}

/// Build the image of a function from its artifact, returning the image
/// reference. The image is pushed to the registry if `publish` is set.
pub async fn build_function_image(
    builder: &dyn ImageBuilder,
    build_root: &std::path::Path,
    function: &Function,
    artifact: &FunctionArtifact,
    tag: &str,
    publish: bool,
) -> Result<String, FunctionError> {
    let runtime = function
        .runtime()
        .ok_or_else(|| FunctionError::InvalidInput(vec![crate::validation::MSG_RUNTIME_NOT_MATCH.to_string()]))?;

    let staging = StagingDir::new(build_root).map_err(|err| FunctionError::BuildFailed(format!("could not create build context: {}", err)))?;
    let artifact_name = artifact_file_name(function, artifact);
    let write = |name: &str, content: &[u8]| {
        std::fs::write(staging.path().join(name), content).map_err(|err| FunctionError::BuildFailed(format!("could not write {}: {}", name, err)))
    };
    write(&artifact_name, &artifact.content)?;
    write("Dockerfile", dockerfile(runtime, &artifact_name, &function.secret_key).as_bytes())?;

    log::info!("building image {} of function {} ({})", tag, function.name, runtime);
    let image = builder.build(staging.path(), runtime, tag).await?;
    if publish {
        log::info!("publishing image {}", image);
        builder.push(&image).await?;
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_api::image_builder::BuildError;

    struct RecordingBuilder {
        fail: bool,
        seen: std::sync::Mutex<Vec<(std::path::PathBuf, String, bool)>>,
    }

    #[async_trait::async_trait]
    impl ImageBuilder for RecordingBuilder {
        async fn build(&self, context_dir: &std::path::Path, _runtime: Runtime, tag: &str) -> Result<String, BuildError> {
            let dockerfile = std::fs::read_to_string(context_dir.join("Dockerfile")).unwrap();
            self.seen.lock().unwrap().push((context_dir.to_path_buf(), dockerfile, context_dir.join("index.js").exists()));
            match self.fail {
                true => Err(BuildError::BuildFailed("boom".to_string())),
                false => Ok(tag.to_string()),
            }
        }

        async fn push(&self, _image: &str) -> Result<(), BuildError> {
            Ok(())
        }
    }

    fn function() -> (Function, FunctionArtifact) {
        (
            Function {
                name: "hello".to_string(),
                runtime: "nodejs".to_string(),
                handler: "index.handler".to_string(),
                handler_file: "index.js".to_string(),
                handler_path: "handler".to_string(),
                secret_key: "s3cr3t".to_string(),
                ..Default::default()
            },
            FunctionArtifact {
                file_name: "index.js".to_string(),
                content: b"exports.handler = () => {}".to_vec(),
            },
        )
    }

    #[test]
    fn test_dockerfile() {
        assert_eq!(
            "FROM stratus/stratus-container-java:0.1.0\nADD function.jar /app/function.jar\nENV access_key k\n",
            dockerfile(Runtime::Java, "function.jar", "k")
        );
        assert_eq!(
            "FROM stratus/stratus-container-python-3_6:0.1.0\nADD function_handler.tar.gz /app/function_handler/\nENV access_key k\n",
            dockerfile(Runtime::Python36, "function_handler.tar.gz", "k")
        );
        assert_eq!("registry:5000/hello:0.1.0", image_tag(Some("registry:5000"), "hello", "0.1.0"));
        assert_eq!("hello:0.1.0", image_tag(None, "hello", "0.1.0"));
    }

    #[tokio::test]
    async fn test_staging_removed_on_success_and_failure() {
        let build_root = std::env::temp_dir();
        let (function, artifact) = function();
        for fail in [false, true] {
            let builder = RecordingBuilder {
                fail,
                seen: std::sync::Mutex::new(vec![]),
            };
            let res = build_function_image(&builder, &build_root, &function, &artifact, "hello:0.1.0", false).await;
            assert_eq!(fail, res.is_err());

            let seen = builder.seen.lock().unwrap();
            let (context_dir, dockerfile, has_artifact) = &seen[0];
            assert!(dockerfile.contains("ADD index.js /app/index.js"));
            assert!(dockerfile.contains("ENV access_key s3cr3t"));
            assert!(*has_artifact);
            assert!(!context_dir.exists());
        }
    }
}
