// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT

use base64::Engine;
use stratus_api::image_builder::{BuildError, ImageBuilder};

use super::client::{with_query, EngineClient};

/// Builds images with the Docker Engine and pushes them to a registry.
#[derive(Clone)]
pub struct DockerImageBuilder {
    client: EngineClient,
    registry: Option<crate::RegistrySettings>,
}

impl DockerImageBuilder {
    pub fn new(socket_path: &str, registry: Option<crate::RegistrySettings>) -> Self {
        Self {
            client: EngineClient::new(socket_path),
            registry,
        }
    }

    fn registry_auth(&self) -> Option<String> {
        self.registry.as_ref().map(|registry| {
            let auth = serde_json::json!({
                "username": registry.username,
                "password": registry.password,
                "serveraddress": registry.server,
            });
            base64::engine::general_purpose::URL_SAFE.encode(auth.to_string())
        })
    }
}

/// Pack a build context directory as a gzipped tarball.
pub fn pack_context(context_dir: &std::path::Path) -> anyhow::Result<Vec<u8>> {
    let enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut tar = tar::Builder::new(enc);
    tar.append_dir_all(".", context_dir)?;
    Ok(tar.into_inner()?.finish()?)
}

/// Scan the JSON messages streamed by a build or push, returning the
/// first error reported.
pub fn stream_error(raw: &[u8]) -> Option<String> {
    for line in String::from_utf8_lossy(raw).lines() {
        let msg: serde_json::Value = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(_) => continue,
        };
        if let Some(err) = msg["error"].as_str() {
            return Some(err.trim().to_string());
        }
        if let Some(stream) = msg["stream"].as_str() {
            let stream = stream.trim();
            if !stream.is_empty() {
                log::debug!("{}", stream);
            }
        }
    }
    None
}

/// Split `repository:tag`, keeping registry ports in the repository.
pub fn split_tag(image: &str) -> (String, String) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
        _ => (image.to_string(), "latest".to_string()),
    }
}

#[async_trait::async_trait]
impl ImageBuilder for DockerImageBuilder {
    async fn build(&self, context_dir: &std::path::Path, runtime: stratus_api::function::Runtime, tag: &str) -> Result<String, BuildError> {
        log::info!("building image {} ({})", tag, runtime);
        let context_dir = context_dir.to_path_buf();
        let context = tokio::task::spawn_blocking(move || pack_context(&context_dir))
            .await
            .map_err(|err| BuildError::BuildFailed(err.to_string()))?
            .map_err(|err| BuildError::BuildFailed(format!("could not pack the build context: {}", err)))?;

        let path = with_query("/build", &[("t", tag.to_string()), ("rm", "true".to_string()), ("forcerm", "true".to_string())]);
        let response = self
            .client
            .request_raw(hyper::Method::POST, &path, context, &[("Content-Type", "application/x-tar".to_string())])
            .await
            .map_err(|err| BuildError::BuildFailed(err.to_string()))?;
        if !response.is_success() {
            return Err(BuildError::BuildFailed(response.message()));
        }
        if let Some(err) = stream_error(&response.body) {
            return Err(BuildError::BuildFailed(err));
        }
        log::info!("image {} built", tag);
        Ok(tag.to_string())
    }

    async fn push(&self, image: &str) -> Result<(), BuildError> {
        let (repository, tag) = split_tag(image);
        let path = with_query(&format!("/images/{}/push", repository), &[("tag", tag)]);
        let headers = match self.registry_auth() {
            Some(auth) => vec![("X-Registry-Auth", auth)],
            None => vec![],
        };
        let response = self
            .client
            .request_raw(hyper::Method::POST, &path, vec![], &headers)
            .await
            .map_err(|err| BuildError::PushFailed(err.to_string()))?;
        if !response.is_success() {
            return Err(BuildError::PushFailed(response.message()));
        }
        if let Some(err) = stream_error(&response.body) {
            return Err(BuildError::PushFailed(err));
        }
        log::info!("image {} pushed", image);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tag() {
        assert_eq!(("hello".to_string(), "0.1.0".to_string()), split_tag("hello:0.1.0"));
        assert_eq!(("localhost:5000/hello".to_string(), "1.0".to_string()), split_tag("localhost:5000/hello:1.0"));
        assert_eq!(("localhost:5000/hello".to_string(), "latest".to_string()), split_tag("localhost:5000/hello"));
        assert_eq!(("hello".to_string(), "latest".to_string()), split_tag("hello"));
    }

    #[test]
    fn test_registry_auth() {
        let builder = DockerImageBuilder::new("/var/run/docker.sock", None);
        assert!(builder.registry_auth().is_none());
        let builder = DockerImageBuilder::new(
            "/var/run/docker.sock",
            Some(crate::RegistrySettings {
                server: "registry:5000".to_string(),
                username: "u".to_string(),
                password: "p".to_string(),
            }),
        );
        let auth = base64::engine::general_purpose::URL_SAFE.decode(builder.registry_auth().unwrap()).unwrap();
        let auth: serde_json::Value = serde_json::from_slice(&auth).unwrap();
        assert_eq!("registry:5000", auth["serveraddress"]);
        assert_eq!("u", auth["username"]);
    }

    #[test]
    fn test_stream_error() {
        let ok = b"{\"stream\":\"Step 1/3 : FROM node\\n\"}\n{\"aux\":{\"ID\":\"sha256:abc\"}}\n";
        assert_eq!(None, stream_error(ok));
        let failed = b"{\"stream\":\"Step 1/3\"}\n{\"errorDetail\":{\"message\":\"bad\"},\"error\":\"bad instruction\"}\n";
        assert_eq!(Some("bad instruction".to_string()), stream_error(failed));
    }

    #[test]
    fn test_pack_context() {
        let dir = std::env::temp_dir().join(format!("stratus-context-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("function_handler")).unwrap();
        std::fs::write(dir.join("Dockerfile"), "FROM scratch\n").unwrap();
        std::fs::write(dir.join("function_handler/index.js"), "exports.handle = () => {}\n").unwrap();

        let packed = pack_context(&dir).unwrap();
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(packed.as_slice()));
        let names = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect::<Vec<String>>();
        assert!(names.iter().any(|n| n.ends_with("Dockerfile")));
        assert!(names.iter().any(|n| n.ends_with("function_handler/index.js")));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
