// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use http_body_util::BodyExt;
use stratus_api::deployment::DeploymentError;

/// Response of the Docker Engine API with the body fully collected.
pub struct EngineResponse {
    pub status: u16,
    pub body: hyper::body::Bytes,
}

impl EngineResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Error message returned by the Engine, or the raw body.
    pub fn message(&self) -> String {
        match serde_json::from_slice::<serde_json::Value>(&self.body) {
            Ok(val) => match val["message"].as_str() {
                Some(msg) => msg.to_string(),
                None => val.to_string(),
            },
            Err(_) => String::from_utf8_lossy(&self.body).trim().to_string(),
        }
    }

    /// Map a non-successful response to the deployment error space.
    pub fn into_error(self, name: &str) -> DeploymentError {
        match self.status {
            404 => DeploymentError::NotFound(name.to_string()),
            503 => DeploymentError::BackendUnavailable(self.message()),
            _ => DeploymentError::Rejected(format!("{} (status {})", self.message(), self.status)),
        }
    }
}

/// Minimal HTTP/1 client of the Docker Engine API over its unix socket.
///
/// A new connection is opened for every request.
#[derive(Clone)]
pub struct EngineClient {
    socket_path: std::path::PathBuf,
}

impl EngineClient {
    pub fn new(socket_path: &str) -> Self {
        Self {
            socket_path: std::path::PathBuf::from(socket_path),
        }
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Send a request and return the response with its body still streaming.
    pub async fn send(
        &self,
        method: hyper::Method,
        path_and_query: &str,
        body: Vec<u8>,
        headers: &[(&str, String)],
    ) -> Result<hyper::Response<hyper::body::Incoming>, DeploymentError> {
        let stream = tokio::net::UnixStream::connect(&self.socket_path).await.map_err(|err| {
            DeploymentError::BackendUnavailable(format!("could not connect to Docker at {}: {}", self.socket_path.display(), err))
        })?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|err| DeploymentError::BackendUnavailable(err.to_string()))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                log::debug!("Docker connection closed with error: {}", err);
            }
        });

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(path_and_query)
            .header(hyper::header::HOST, "docker");
        if !body.is_empty() && !headers.iter().any(|(key, _)| key.eq_ignore_ascii_case("content-type")) {
            builder = builder.header(hyper::header::CONTENT_TYPE, "application/json");
        }
        for (key, value) in headers {
            builder = builder.header(*key, value.as_str());
        }
        let request = builder
            .body(http_body_util::Full::new(hyper::body::Bytes::from(body)))
            .map_err(|err| DeploymentError::Rejected(err.to_string()))?;

        sender
            .send_request(request)
            .await
            .map_err(|err| DeploymentError::BackendUnavailable(err.to_string()))
    }

    pub async fn request(&self, method: hyper::Method, path_and_query: &str, body: Option<&serde_json::Value>) -> Result<EngineResponse, DeploymentError> {
        let body = match body {
            Some(val) => serde_json::to_vec(val).map_err(|err| DeploymentError::Rejected(err.to_string()))?,
            None => vec![],
        };
        self.request_raw(method, path_and_query, body, &[]).await
    }

    pub async fn request_raw(
        &self,
        method: hyper::Method,
        path_and_query: &str,
        body: Vec<u8>,
        headers: &[(&str, String)],
    ) -> Result<EngineResponse, DeploymentError> {
        log::debug!("Docker request: {} {}", method, path_and_query);
        let response = self.send(method, path_and_query, body, headers).await?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|err| DeploymentError::BackendUnavailable(err.to_string()))?
            .to_bytes();
        Ok(EngineResponse { status, body })
    }
}

/// Build a path with an url-encoded query string.
pub fn with_query(path: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        query.append_pair(key, value);
    }
    format!("{}?{}", path, query.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_query() {
        assert_eq!("/services", with_query("/services", &[]));
        assert_eq!(
            "/tasks?filters=%7B%22service%22%3A%5B%22f%22%5D%7D",
            with_query("/tasks", &[("filters", r#"{"service":["f"]}"#.to_string())])
        );
    }

    #[test]
    fn test_response_error_mapping() {
        let response = |status: u16, body: &'static str| EngineResponse {
            status,
            body: hyper::body::Bytes::from(body),
        };
        assert!(matches!(response(404, r#"{"message":"no such service"}"#).into_error("f"), DeploymentError::NotFound(name) if name == "f"));
        match response(400, r#"{"message":"invalid spec"}"#).into_error("f") {
            DeploymentError::Rejected(msg) => assert_eq!("invalid spec (status 400)", msg),
            err => panic!("unexpected error: {}", err),
        }
        assert_eq!("plain text", response(500, "plain text\n").message());
        assert!(response(201, "").is_success());
    }
}
