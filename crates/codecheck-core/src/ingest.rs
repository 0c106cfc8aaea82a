//! Upload gate: validates submitted files and stages them on local disk.
//!
//! A file that fails validation never reaches the registry. A staged file
//! lives until the check that owns it is finalized, then it is released.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempPath;

use crate::domain::ValidationError;

/// Default upload size cap (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Extensions accepted by default.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "js", "ts", "py", "java", "cpp", "go", "php", "rb", "json", "yml", "yaml", "md",
];

/// Lower-cased extension of `file_name`, without the dot.
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Allow-list and size cap applied to every upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub allowed_extensions: BTreeSet<String>,
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    /// Override the size cap.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Validate a submitted file name and payload size.
    ///
    /// File names are restricted to ASCII alphanumerics, `.`, `_` and `-`
    /// because they become a path in the remote repository and a value in
    /// the pipeline document.
    pub fn validate(&self, file_name: &str, size: u64) -> Result<(), ValidationError> {
        if file_name.is_empty() {
            return Err(ValidationError::EmptyFileName);
        }
        let charset_ok = file_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !charset_ok || file_name.starts_with('.') {
            return Err(ValidationError::InvalidFileName {
                name: file_name.to_string(),
            });
        }

        let extension = extension_of(file_name).unwrap_or_default();
        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::DisallowedExtension { extension });
        }

        if size > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

/// A validated upload copied to local disk.
///
/// The on-disk copy is removed by [`StagedFile::release`] or, failing
/// that, when the value is dropped.
#[derive(Debug)]
pub struct StagedFile {
    file_name: String,
    size: u64,
    digest: String,
    path: TempPath,
}

impl StagedFile {
    /// Original submitted name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// SHA-256 hex digest of the content.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Location of the staged copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the staged content back.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Delete the staged copy.
    pub fn release(self) -> std::io::Result<()> {
        self.path.close()
    }
}

/// Writes uploads into a staging directory.
#[derive(Debug, Clone)]
pub struct Stager {
    dir: PathBuf,
}

impl Default for Stager {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl Stager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `content` to a uniquely named file in the staging directory.
    pub async fn stage(&self, file_name: &str, content: Vec<u8>) -> std::io::Result<StagedFile> {
        let dir = self.dir.clone();
        let file_name = file_name.to_string();
        tokio::task::spawn_blocking(move || stage_blocking(&dir, file_name, &content))
            .await
            .map_err(std::io::Error::other)?
    }
}

fn stage_blocking(dir: &Path, file_name: String, content: &[u8]) -> std::io::Result<StagedFile> {
    std::fs::create_dir_all(dir)?;
    let suffix = extension_of(&file_name)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let mut file = tempfile::Builder::new()
        .prefix("codecheck-")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    file.write_all(content)?;
    file.flush()?;

    let mut hasher = Sha256::new();
    hasher.update(content);

    Ok(StagedFile {
        file_name,
        size: content.len() as u64,
        digest: hex::encode(hasher.finalize()),
        path: file.into_temp_path(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("main.PY"), Some("py".to_string()));
        assert_eq!(extension_of("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(extension_of("Makefile"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_policy_accepts_allow_listed() {
        let policy = UploadPolicy::default();
        assert!(policy.validate("main.py", 10).is_ok());
        assert!(policy.validate("App.Java", 10).is_ok());
        assert!(policy.validate("config.yaml", 0).is_ok());
    }

    #[test]
    fn test_policy_rejects_disallowed_extension() {
        let policy = UploadPolicy::default();
        assert_eq!(
            policy.validate("setup.exe", 10),
            Err(ValidationError::DisallowedExtension {
                extension: "exe".to_string()
            })
        );
        assert!(matches!(
            policy.validate("README", 10),
            Err(ValidationError::DisallowedExtension { .. })
        ));
    }

    #[test]
    fn test_policy_rejects_unsafe_names() {
        let policy = UploadPolicy::default();
        for name in ["../etc.py", "a b.py", "x;rm.py", "${{x}}.js", ".hidden.py", "dir/a.py"] {
            assert!(
                matches!(
                    policy.validate(name, 1),
                    Err(ValidationError::InvalidFileName { .. })
                ),
                "{name} should be rejected"
            );
        }
        assert_eq!(policy.validate("", 1), Err(ValidationError::EmptyFileName));
    }

    #[test]
    fn test_policy_size_cap() {
        let policy = UploadPolicy::default();
        assert!(policy.validate("a.py", DEFAULT_MAX_UPLOAD_BYTES).is_ok());
        assert!(matches!(
            policy.validate("a.py", DEFAULT_MAX_UPLOAD_BYTES + 1),
            Err(ValidationError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_stage_read_release() {
        let dir = tempfile::tempdir().unwrap();
        let stager = Stager::new(dir.path());

        let staged = stager
            .stage("main.py", b"print('hi')\n".to_vec())
            .await
            .unwrap();
        assert_eq!(staged.file_name(), "main.py");
        assert_eq!(staged.size(), 12);
        assert_eq!(staged.digest().len(), 64);
        assert_eq!(staged.read().await.unwrap(), b"print('hi')\n");

        let path = staged.path().to_path_buf();
        assert!(path.exists());
        staged.release().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stage_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let stager = Stager::new(dir.path());
        let staged = stager.stage("a.js", b"1".to_vec()).await.unwrap();
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }
}
