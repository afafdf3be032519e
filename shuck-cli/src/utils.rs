//! Utility functions for the CLI.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use shuck_archive::EntryAction;
use shuck_core::entry::EntryMetadata;
use shuck_core::error::Result;
use std::io::Read;

/// Create a progress bar with standard styling.
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .expect("progress bar template is valid")
            .progress_chars("█▓▒░ "),
    );
    pb
}

/// One entry in machine-readable listings.
#[derive(Debug, Serialize)]
pub struct JsonEntry {
    /// Sanitized entry name.
    pub name: String,
    /// Entry kind, lowercase.
    pub kind: String,
    /// Data size in bytes.
    pub size: u64,
    /// Permission bits, octal string.
    pub mode: String,
    /// Owner uid.
    pub uid: u32,
    /// Owner gid.
    pub gid: u32,
    /// Modification time, epoch seconds.
    pub mtime: u64,
    /// Link target, when the entry is a link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Collects entries for JSON output instead of printing them.
#[derive(Default)]
pub struct JsonListAction {
    /// Collected rows.
    pub entries: Vec<JsonEntry>,
}

impl EntryAction for JsonListAction {
    fn handle(&mut self, meta: &EntryMetadata, _data: Option<&mut dyn Read>) -> Result<()> {
        self.entries.push(JsonEntry {
            name: meta.sanitized_name(),
            kind: format!("{:?}", meta.kind).to_lowercase(),
            size: meta.size,
            mode: format!("{:04o}", meta.mode),
            uid: meta.uid,
            gid: meta.gid,
            mtime: meta.mtime,
            target: meta.link_target.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_entry_shape() {
        let mut action = JsonListAction::default();
        action
            .handle(&EntryMetadata::symlink("s", "t"), None)
            .unwrap();
        let json = serde_json::to_string(&action.entries[0]).unwrap();
        assert!(json.contains("\"kind\":\"symlink\""));
        assert!(json.contains("\"target\":\"t\""));
    }

    #[test]
    fn test_json_skips_absent_target() {
        let mut action = JsonListAction::default();
        action
            .handle(&EntryMetadata::file("f", 1).with_mode(0o644), None)
            .unwrap();
        let json = serde_json::to_string(&action.entries[0]).unwrap();
        assert!(!json.contains("target"));
        assert!(json.contains("\"mode\":\"0644\""));
    }
}
