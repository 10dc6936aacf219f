//! Whole-file persistence for the vault.

use anyhow::{Context, Result};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Location of a vault file plus crash-safe read/write of its bytes.
#[derive(Clone, Debug)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole file.
    pub fn load(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).with_context(|| format!("failed to read {}", self.path.display()))
    }

    /// Replaces the file contents so that a crash leaves either the old or the
    /// new bytes on disk, never a torn write.
    ///
    /// The data goes to a uniquely named sibling first, is fsynced, renamed over
    /// the target, and the directory entry is fsynced. Missing parent
    /// directories are created.
    pub fn save(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.parent_dir() {
            fs::create_dir_all(parent)?;
        }

        let staged = self.staging_path()?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)
            .context("failed to create staging file")?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = self.swap_in(&staged) {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }

        if let Some(parent) = self.parent_dir() {
            File::open(parent)?.sync_all()?;
        }

        Ok(())
    }

    /// `None` for a bare file name in the working directory.
    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// `<name>.tmp.<16 hex chars>` next to the target.
    fn staging_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        fill(&mut buf).map_err(|_| anyhow::anyhow!("OS random generator unavailable"))?;
        let suffix: String = buf.iter().map(|b| format!("{:02x}", b)).collect();

        let name = self
            .path
            .file_name()
            .context("vault path has no file name")?
            .to_string_lossy();

        Ok(self.path.with_file_name(format!("{name}.tmp.{suffix}")))
    }

    /// `ReplaceFileW` with write-through, which is atomic on NTFS.
    #[cfg(target_os = "windows")]
    fn swap_in(&self, staged: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            fs::rename(staged, &self.path)?;
            return Ok(());
        }

        fn wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target = wide(self.path.as_os_str());
        let source = wide(staged.as_os_str());

        // SAFETY: both buffers are NUL-terminated UTF-16 and outlive the call;
        // the API keeps no reference to them afterwards.
        let ok = unsafe {
            ReplaceFileW(
                target.as_ptr(),
                source.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if ok == 0 {
            return Err(std::io::Error::last_os_error()).context("atomic replace failed");
        }

        Ok(())
    }

    /// `rename(2)` is atomic within one filesystem.
    #[cfg(not(target_os = "windows"))]
    fn swap_in(&self, staged: &Path) -> Result<()> {
        fs::rename(staged, &self.path).context("atomic replace failed")
    }
}
