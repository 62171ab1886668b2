// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("image build failed: {0}")]
    BuildFailed(String),
    #[error("image push failed: {0}")]
    PushFailed(String),
}

/// Turns a prepared build context into a container image.
#[async_trait::async_trait]
pub trait ImageBuilder: Sync + Send {
    /// Build the image from `context_dir` (which holds a Dockerfile) and tag
    /// it as `tag`, returning the image reference.
    async fn build(&self, context_dir: &std::path::Path, runtime: crate::function::Runtime, tag: &str) -> Result<String, BuildError>;

    async fn push(&self, image: &str) -> Result<(), BuildError>;
}
