//! Harvest files left in a session's working directory

use crate::types::Artifact;
use crate::Result;
use std::path::Path;

/// Encode and remove every regular file directly inside `workdir`.
///
/// Each file is deleted right after it is encoded. Subdirectories and other
/// non-regular entries are left alone.
pub async fn capture(workdir: &Path) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::new();
    let mut entries = tokio::fs::read_dir(workdir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        let bytes = tokio::fs::read(&path).await?;
        artifacts.push(Artifact::encode(filename, &bytes));
        tokio::fs::remove_file(&path).await?;
    }

    tracing::debug!(
        workdir = %workdir.display(),
        count = artifacts.len(),
        "Captured artifacts"
    );
    Ok(artifacts)
}
