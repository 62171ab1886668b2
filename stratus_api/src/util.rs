// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

/// Write a configuration template, refusing to overwrite an existing file.
pub fn create_template(path: &str, content: &str) -> anyhow::Result<()> {
    anyhow::ensure!(!path.is_empty(), "empty configuration file path");
    match std::path::Path::new(&path).exists() {
        true => anyhow::bail!("cannot overwrite configuration file: {}", path),
        false => {
            std::fs::write(path, content)?;
            Ok(())
        }
    }
}

/// Generate a random access key for secrets and component credentials.
pub fn new_access_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
