//! Output delivery for server-save mode
//!
//! Saved files get ownership mapped to the configured PUID/PGID so external
//! consumers (media server, file sync) running under a different identity can
//! use them.

use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use yt2mp3_core::metadata::unique_path;

/// Ownership target: (uid, gid), either side optional
pub type Owner = (Option<u32>, Option<u32>);

/// Copy a finished file into the save directory under a collision-free name
/// and apply ownership. The source stays in the job's scratch dir and is
/// removed when the artifact drops.
pub async fn save_file(
    src: &Path,
    filename: &str,
    dir: &Path,
    owner: Option<Owner>,
) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let dest = unique_path(dir, filename);
    tokio::fs::copy(src, &dest).await?;

    if let Some((uid, gid)) = owner {
        apply_ownership(&dest, uid, gid)?;
    }

    info!("Saved to: {}", dest.display());
    Ok(dest)
}

#[cfg(unix)]
fn apply_ownership(path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    tracing::debug!(
        "Setting ownership of {} to {:?}:{:?}",
        path.display(),
        uid,
        gid
    );
    std::os::unix::fs::chown(path, uid, gid)
}

#[cfg(not(unix))]
fn apply_ownership(path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> io::Result<()> {
    tracing::warn!(
        "Ownership mapping is not supported on this platform; {} keeps the service identity",
        path.display()
    );
    Ok(())
}
