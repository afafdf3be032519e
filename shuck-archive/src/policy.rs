//! Extraction policy toggles.

/// Independent switches controlling how entries are materialized.
/// Each maps to a long CLI option; the defaults match what a bare
/// `tar -x` does.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Restore each file's recorded modification time.
    pub restore_mtime: bool,
    /// Create missing parent directories for every entry.
    pub make_leading_dirs: bool,
    /// Remove an existing file before writing its replacement.
    pub unlink_old: bool,
    /// Only replace files older than the archived copy.
    pub only_if_newer: bool,
    /// Restore uid/gid (root only in practice).
    pub restore_owner: bool,
    /// Restore permission bits instead of honoring the umask.
    pub restore_perm: bool,
    /// Ignore symbolic owner names, use numeric ids as stored.
    pub numeric_owner: bool,
    /// Truncate existing files instead of unlinking them.
    pub truncate: bool,
    /// Record processed names for hardlink resolution.
    pub remember_names: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            restore_mtime: true,
            make_leading_dirs: true,
            unlink_old: false,
            only_if_newer: false,
            restore_owner: false,
            restore_perm: false,
            numeric_owner: false,
            truncate: false,
            remember_names: true,
        }
    }
}

impl Policy {
    /// Default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle modification-time restore.
    pub fn restore_mtime(mut self, on: bool) -> Self {
        self.restore_mtime = on;
        self
    }

    /// Toggle parent-directory creation.
    pub fn make_leading_dirs(mut self, on: bool) -> Self {
        self.make_leading_dirs = on;
        self
    }

    /// Toggle unlink-before-write.
    pub fn unlink_old(mut self, on: bool) -> Self {
        self.unlink_old = on;
        self
    }

    /// Toggle keep-newer-files.
    pub fn only_if_newer(mut self, on: bool) -> Self {
        self.only_if_newer = on;
        self
    }

    /// Toggle ownership restore.
    pub fn restore_owner(mut self, on: bool) -> Self {
        self.restore_owner = on;
        self
    }

    /// Toggle permission restore.
    pub fn restore_perm(mut self, on: bool) -> Self {
        self.restore_perm = on;
        self
    }

    /// Toggle numeric-owner lookup.
    pub fn numeric_owner(mut self, on: bool) -> Self {
        self.numeric_owner = on;
        self
    }

    /// Toggle truncate-in-place.
    pub fn truncate(mut self, on: bool) -> Self {
        self.truncate = on;
        self
    }

    /// Toggle processed-name tracking.
    pub fn remember_names(mut self, on: bool) -> Self {
        self.remember_names = on;
        self
    }
}
