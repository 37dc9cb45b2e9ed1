use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::aggregate::CommentMap;
use crate::error::OutputError;

pub fn render_comment_map(comments: &CommentMap, pretty: bool) -> Result<String, OutputError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(comments)?
    } else {
        serde_json::to_string(comments)?
    };
    Ok(rendered)
}

/// Write the whole document next to `path` first and rename it into place, so
/// readers never observe a half-written file.
pub fn write_comment_map(
    path: &Path,
    comments: &CommentMap,
    pretty: bool,
) -> Result<usize, OutputError> {
    let rendered = render_comment_map(comments, pretty)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| OutputError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let staging = staging_path(path);
    fs::write(&staging, rendered.as_bytes()).map_err(|source| OutputError::Write {
        path: staging.clone(),
        source,
    })?;
    if let Err(source) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(OutputError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    debug!(path = %path.display(), bytes = rendered.len(), "wrote comment map");
    Ok(rendered.len())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "comments.json".into());
    name.push(".partial");
    path.with_file_name(name)
}
