//! Copies a finished run into an externally supplied artifact directory.

use crate::error::FetchError;
use crate::status::FleetStatus;
use std::path::{Path, PathBuf};
use tracing::info;

/// Copies every recorded file by base name, then the configuration file.
/// Returns the number of log files copied.
pub async fn copy_artifacts(
    status: &FleetStatus,
    config_path: &Path,
    artifact_dir: &Path,
) -> Result<usize, FetchError> {
    tokio::fs::create_dir_all(artifact_dir)
        .await
        .map_err(|source| FetchError::Setup {
            path: artifact_dir.to_path_buf(),
            source,
        })?;

    let mut copied = 0;
    for path in status.all_paths() {
        copy_by_base_name(path, artifact_dir).await?;
        copied += 1;
    }
    copy_by_base_name(config_path, artifact_dir).await?;

    info!(artifact_dir = %artifact_dir.display(), files = copied, "copied log files");
    Ok(copied)
}

async fn copy_by_base_name(from: &Path, dir: &Path) -> Result<PathBuf, FetchError> {
    let to = match from.file_name() {
        Some(name) => dir.join(name),
        None => dir.to_path_buf(),
    };
    tokio::fs::copy(from, &to)
        .await
        .map_err(|source| FetchError::Copy {
            from: from.to_path_buf(),
            to: to.clone(),
            source,
        })?;
    Ok(to)
}
