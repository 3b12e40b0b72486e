use std::fs::Metadata;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};

/// A plugin executable found in a plugin directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEntry {
    /// Plugin name derived from the file name.
    pub name: String,
    /// Full path of the executable.
    pub path: PathBuf,
}

/// List the plugin executables directly inside `dir`, sorted by name.
///
/// Subdirectories and non-executable files are skipped. Symlinks are
/// followed; a dangling symlink is skipped.
pub fn discover(dir: impl AsRef<Path>) -> Result<Vec<PluginEntry>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|source| TransportError::Discover {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut plugins = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| TransportError::Discover {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !metadata.is_file() || !is_executable(&path, &metadata) {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            debug!(path = %path.display(), "skipping non-utf8 file name");
            continue;
        };

        plugins.push(PluginEntry {
            name: plugin_name(file_name),
            path,
        });
    }

    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(plugins)
}

/// Derive a plugin name from an executable file name.
pub fn plugin_name(file_name: &str) -> String {
    file_name
        .strip_suffix(".exe")
        .unwrap_or(file_name)
        .to_string()
}

#[cfg(unix)]
fn is_executable(_path: &Path, metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(path: &Path, _metadata: &Metadata) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
}
