//! Local content walker
//!
//! Lists the files of an add once, asynchronously; the result feeds both the
//! `size` tag and the multipart upload.

use std::path::{Path, PathBuf};
use tokio::fs;

/// A file queued for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    /// Name sent to the cluster: the file name, or the path relative to the tree's parent
    pub name: String,
    pub len: u64,
}

/// Collect the files under `root` (or `root` itself when it is a file),
/// sorted by upload name
pub async fn collect_files(root: &Path) -> std::io::Result<Vec<UploadFile>> {
    let metadata = fs::metadata(root).await?;
    if metadata.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(vec![UploadFile {
            path: root.to_path_buf(),
            name,
            len: metadata.len(),
        }]);
    }

    let base = root.parent().unwrap_or(root);
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut entries = fs::read_dir(&current).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let len = entry.metadata().await?.len();
                let name = path
                    .strip_prefix(base)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                files.push(UploadFile { path, name, len });
            }
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Total bytes of a file list
pub fn total_len(files: &[UploadFile]) -> u64 {
    files.iter().map(|f| f.len).sum()
}
