//! Deferred link creation.
//!
//! Archives routinely place a link before the file it points at, so
//! links are queued during the scan and resolved once afterwards, in
//! encounter order. A hardlink whose filesystem refuses `link(2)`
//! (cross-device targets, FAT) degrades to a content copy; a target
//! that never materialized is reported, not fatal.

use shuck_core::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// A link recorded during the scan, waiting for resolution.
#[derive(Debug, Clone)]
pub struct PendingLink {
    /// Path the link points at, as stored in the archive.
    pub target: String,
    /// Path of the link itself, relative to the extraction root.
    pub link_name: PathBuf,
    /// Hardlink rather than symlink.
    pub hard: bool,
}

/// Links that could not be created because their target was missing.
#[derive(Debug, Default)]
pub struct LinkReport {
    /// Targets that never appeared.
    pub broken: Vec<PendingLink>,
}

fn hardlink_or_copy(target: &Path, link: &Path) -> std::io::Result<()> {
    match fs::hard_link(target, link) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::debug!(
                "hard_link {} -> {} failed ({e}), copying instead",
                link.display(),
                target.display()
            );
            fs::copy(target, link).map(|_| ())
        }
    }
}

#[cfg(unix)]
fn make_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    // No symlinks to speak of; a text file holding the target name is
    // what historic ports do.
    fs::write(link, target)
}

/// Resolve all pending links under `root`, in the order they were
/// recorded.
pub fn resolve(root: &Path, pending: Vec<PendingLink>, unlink_old: bool) -> Result<LinkReport> {
    let mut report = LinkReport::default();
    for link in pending {
        let link_path = root.join(&link.link_name);
        if unlink_old && link_path.symlink_metadata().is_ok() {
            let _ = fs::remove_file(&link_path);
        }
        let outcome = if link.hard {
            let target_path = root.join(&link.target);
            if target_path.symlink_metadata().is_err() {
                log::warn!(
                    "hardlink target {} missing for {}",
                    link.target,
                    link_path.display()
                );
                report.broken.push(link);
                continue;
            }
            hardlink_or_copy(&target_path, &link_path)
        } else {
            // Symlink targets are created verbatim; dangling ones are
            // legitimate archive content.
            make_symlink(&link.target, &link_path)
        };
        if let Err(e) = outcome {
            log::warn!("cannot create link {}: {e}", link_path.display());
            report.broken.push(link);
        }
    }
    Ok(report)
}
