//! Atomic read/write of per-client artifacts.
//!
//! Every write goes through temp-file + fsync + rename, so a crash mid-write
//! never leaves a partial file visible: the previous version stays intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sitewright_types::{ClientId, Result, SitewrightError, Theme};

/// Write `content` to `path` atomically.
///
/// The temp file lives in the target directory (rename is only atomic within
/// one filesystem) and is fsynced before the rename.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| SitewrightError::Other(format!("no parent dir for {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = (|| -> Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(content.as_bytes())?;
        f.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Read a file, returning `default` when it is missing or unreadable.
pub fn read_or_default(path: &Path, default: &str) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "read_or_default fallback");
            default.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// ClientWorkspace
// ---------------------------------------------------------------------------

/// A client's artifact directory under the clients root.
///
/// Layout: `intake.md` (input), `brief.md` + `brief.orig.md`, `content.md` +
/// `content.orig.md`, `theme.json`, `qa_report.md`, `qa_mobile.png`. The
/// rename of `intake.md` to `intake-processed.md` marks the job finalized and
/// must be the last durable write of a run.
#[derive(Debug, Clone)]
pub struct ClientWorkspace {
    id: ClientId,
    dir: PathBuf,
}

impl ClientWorkspace {
    pub fn new(clients_root: &Path, id: ClientId) -> Self {
        let dir = clients_root.join(id.as_str());
        Self { id, dir }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn intake_path(&self) -> PathBuf {
        self.dir.join("intake.md")
    }

    pub fn processed_intake_path(&self) -> PathBuf {
        self.dir.join("intake-processed.md")
    }

    pub fn brief_path(&self) -> PathBuf {
        self.dir.join("brief.md")
    }

    pub fn content_path(&self) -> PathBuf {
        self.dir.join("content.md")
    }

    pub fn theme_path(&self) -> PathBuf {
        self.dir.join("theme.json")
    }

    pub fn qa_report_path(&self) -> PathBuf {
        self.dir.join("qa_report.md")
    }

    pub fn screenshot_path(&self) -> PathBuf {
        self.dir.join("qa_mobile.png")
    }

    /// Target path of the generated page under the site's pages root.
    pub fn page_path(&self, pages_root: &Path) -> PathBuf {
        pages_root.join(self.id.as_str()).join("page.tsx")
    }

    pub fn has_pending_intake(&self) -> bool {
        self.intake_path().is_file()
    }

    pub fn read_intake(&self) -> Result<String> {
        Ok(fs::read_to_string(self.intake_path())?)
    }

    pub fn read_brief(&self) -> Result<String> {
        Ok(fs::read_to_string(self.brief_path())?)
    }

    pub fn read_content(&self) -> Result<String> {
        Ok(fs::read_to_string(self.content_path())?)
    }

    pub fn read_theme(&self) -> Option<Theme> {
        let raw = fs::read_to_string(self.theme_path()).ok()?;
        match serde_json::from_str(&raw) {
            Ok(theme) => Some(theme),
            Err(e) => {
                tracing::warn!(client = %self.id, error = %e, "Malformed theme.json, ignoring");
                None
            }
        }
    }

    /// Write a working artifact and, only on the first write, an immutable
    /// `.orig` copy alongside it.
    pub fn write_with_original(&self, name: &str, content: &str) -> Result<()> {
        let working = self.dir.join(name);
        atomic_write(&working, content)?;

        let orig = self.orig_name(name);
        if !orig.exists() {
            atomic_write(&orig, content)?;
        }
        Ok(())
    }

    fn orig_name(&self, name: &str) -> PathBuf {
        match name.rsplit_once('.') {
            Some((stem, ext)) => self.dir.join(format!("{stem}.orig.{ext}")),
            None => self.dir.join(format!("{name}.orig")),
        }
    }

    pub fn write_brief(&self, content: &str) -> Result<()> {
        self.write_with_original("brief.md", content)
    }

    pub fn write_content(&self, content: &str) -> Result<()> {
        self.write_with_original("content.md", content)
    }

    pub fn write_theme(&self, theme: &Theme) -> Result<()> {
        let json = serde_json::to_string_pretty(theme)?;
        atomic_write(&self.theme_path(), &json)
    }

    pub fn write_qa_report(&self, report: &str) -> Result<()> {
        atomic_write(&self.qa_report_path(), report)
    }

    /// Finalize the job: rename `intake.md` to `intake-processed.md`.
    ///
    /// Must only be called after every other artifact of the run is durably
    /// written; a crash before this rename leaves the job retryable.
    pub fn mark_processed(&self) -> Result<()> {
        fs::rename(self.intake_path(), self.processed_intake_path())?;
        Ok(())
    }
}

/// Scan the clients root for directories with a pending `intake.md`.
///
/// Entries whose names fail [`ClientId`] validation are skipped with a
/// warning rather than aborting the scan.
pub fn pending_clients(clients_root: &Path) -> Result<Vec<ClientId>> {
    let mut pending = Vec::new();
    if !clients_root.is_dir() {
        return Ok(pending);
    }
    for entry in fs::read_dir(clients_root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        match ClientId::parse(name) {
            Ok(id) => {
                if ClientWorkspace::new(clients_root, id.clone()).has_pending_intake() {
                    pending.push(id);
                }
            }
            Err(_) => {
                tracing::warn!(dir = %name, "Skipping client directory with unsafe name");
            }
        }
    }
    pending.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    Ok(pending)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
