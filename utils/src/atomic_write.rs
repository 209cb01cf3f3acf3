//! Atomic file write helpers.
//!
//! Writes go to a temp file in the destination directory and are renamed over
//! the target. Where rename-over-existing fails (Windows), the old file is
//! moved aside to `.bak` first and restored if the second rename fails.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileVisibility {
    /// Inherit the process umask.
    #[default]
    Default,
    /// Owner-only read/write (0o600 on Unix). Used for anything holding a token.
    OwnerOnly,
}

impl FileVisibility {
    #[cfg(unix)]
    fn unix_mode(self) -> Option<u32> {
        match self {
            Self::Default => None,
            Self::OwnerOnly => Some(0o600),
        }
    }
}

fn parent_of(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Create `dir` (and parents) and tighten it to 0o700 if we own it and it is
/// group/world accessible.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};
        let metadata = fs::metadata(dir)?;
        // SAFETY: getuid has no preconditions and cannot fail.
        let our_uid = unsafe { libc::getuid() };
        if metadata.uid() == our_uid && metadata.permissions().mode() & 0o077 != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn apply_visibility(path: &Path, visibility: FileVisibility) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = visibility.unix_mode() {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_visibility(_path: &Path, _visibility: FileVisibility) -> io::Result<()> {
    Ok(())
}

/// Write `bytes` to `path` atomically, syncing the data before the rename.
pub fn atomic_write(
    path: impl AsRef<Path>,
    bytes: &[u8],
    visibility: FileVisibility,
) -> io::Result<()> {
    let path = path.as_ref();
    let parent = parent_of(path);

    let mut tmp = NamedTempFile::new_in(parent)?;
    // Restrict before any secret bytes land on disk.
    apply_visibility(tmp.path(), visibility)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }
        let backup = path.with_extension("bak");
        let _ = fs::remove_file(&backup);
        fs::rename(path, &backup)?;
        if let Err(retry) = err.file.persist(path) {
            let _ = fs::rename(&backup, path);
            return Err(retry.error);
        }
        if let Err(e) = fs::remove_file(&backup) {
            warn!(path = %backup.display(), "Failed to remove .bak after atomic write: {e}");
        }
    }

    apply_visibility(path, visibility)?;

    #[cfg(unix)]
    if let Err(e) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        debug!(path = %parent.display(), "Parent directory sync failed (best-effort): {e}");
    }

    Ok(())
}

/// Remove `path`, treating "already gone" as success.
pub fn remove_if_exists(path: impl AsRef<Path>) -> io::Result<()> {
    match fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
