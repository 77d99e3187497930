use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tracing::warn;

use crate::schedule::types::is_task_id;

/// An artifact directory found under the scratch root.
#[derive(Debug, Clone)]
pub struct TaskDir {
    pub task_id: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Lists directories directly under `root` whose names are task ids.
///
/// A missing root yields an empty list. Entries that vanish or cannot be
/// inspected while listing are skipped.
pub async fn list_task_dirs(root: &Path) -> std::io::Result<Vec<TaskDir>> {
    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(String::from) else {
            continue;
        };
        if !is_task_id(&name) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                warn!("Failed to inspect {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !metadata.is_dir() {
            continue;
        }
        let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());

        dirs.push(TaskDir {
            task_id: name,
            path: entry.path(),
            modified,
        });
    }
    Ok(dirs)
}

/// Total size in bytes of the regular files below `path`.
pub async fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    let mut pending = vec![path.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if metadata.is_dir() {
                pending.push(entry.path());
            } else if metadata.is_file() {
                total += metadata.len();
            }
        }
    }
    Ok(total)
}
