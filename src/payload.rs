//! File-backed request payloads.
//!
//! The adapter's only contract is "produce bytes or fail". Contents are read
//! once, on first use, and shared immutably across workers afterwards: runs
//! are reproducible even if the file changes mid-run, and file-descriptor
//! usage stays bounded at high concurrency.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::config::TestConfig;
use crate::errors::{ErrorKind, RequestError};

/// One memoized multipart file part.
#[derive(Debug)]
pub struct FormFilePart {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Lazily-loaded, run-scoped payload cache.
pub struct PayloadStore {
    body_file: Option<PathBuf>,
    body_cache: OnceCell<Result<Arc<String>, RequestError>>,
    form_files: Vec<(String, PathBuf)>,
    form_cache: OnceCell<Result<Arc<Vec<FormFilePart>>, RequestError>>,
}

impl PayloadStore {
    pub fn new(config: &TestConfig) -> Self {
        Self {
            body_file: config.body_file.clone(),
            body_cache: OnceCell::new(),
            form_files: config.form_files.clone(),
            form_cache: OnceCell::new(),
        }
    }

    /// Body text from the configured body file, or `None` when no body file
    /// is configured. A read failure is reported for every request that needs
    /// the payload, as a `File`-kind error.
    pub async fn body(&self) -> Option<Result<Arc<String>, RequestError>> {
        let path = self.body_file.as_ref()?;
        let loaded = self
            .body_cache
            .get_or_init(|| async {
                tokio::fs::read_to_string(path)
                    .await
                    .map(Arc::new)
                    .map_err(|e| file_error(path, &e))
            })
            .await;
        Some(loaded.clone())
    }

    /// All configured form-file parts, loaded as binary blobs.
    pub async fn form_parts(&self) -> Result<Arc<Vec<FormFilePart>>, RequestError> {
        self.form_cache
            .get_or_init(|| async {
                let mut parts = Vec::with_capacity(self.form_files.len());
                for (field, path) in &self.form_files {
                    let bytes = tokio::fs::read(path)
                        .await
                        .map_err(|e| file_error(path, &e))?;
                    parts.push(FormFilePart {
                        field: field.clone(),
                        file_name: file_name_of(path),
                        bytes,
                    });
                }
                Ok(Arc::new(parts))
            })
            .await
            .clone()
    }
}

fn file_error(path: &Path, error: &std::io::Error) -> RequestError {
    RequestError::new(
        ErrorKind::File,
        format!("failed to read '{}': {}", path.display(), error),
    )
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_with_body_file(path: PathBuf) -> TestConfig {
        let mut config = TestConfig::new(vec!["http://localhost/".to_string()]);
        config.body_file = Some(path);
        config
    }

    #[tokio::test]
    async fn test_no_body_file_yields_none() {
        let config = TestConfig::new(vec!["http://localhost/".to_string()]);
        let store = PayloadStore::new(&config);
        assert!(store.body().await.is_none());
    }

    #[tokio::test]
    async fn test_body_file_is_read_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first contents").unwrap();

        let store = PayloadStore::new(&config_with_body_file(file.path().to_path_buf()));
        let body = store.body().await.unwrap().unwrap();
        assert_eq!(body.as_str(), "first contents");

        // The cache must survive the file changing mid-run.
        std::fs::write(file.path(), "changed").unwrap();
        let again = store.body().await.unwrap().unwrap();
        assert_eq!(again.as_str(), "first contents");
    }

    #[tokio::test]
    async fn test_missing_body_file_is_a_file_error() {
        let store = PayloadStore::new(&config_with_body_file(PathBuf::from(
            "/nonexistent/body.txt",
        )));
        let err = store.body().await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::File);
        assert!(err.message.contains("/nonexistent/body.txt"));
    }

    #[tokio::test]
    async fn test_form_parts_carry_field_and_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"\x00\x01binary").unwrap();

        let mut config = TestConfig::new(vec!["http://localhost/".to_string()]);
        config.form_files.push(("attachment".to_string(), path));

        let store = PayloadStore::new(&config);
        let parts = store.form_parts().await.unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].field, "attachment");
        assert_eq!(parts[0].file_name, "upload.bin");
        assert_eq!(parts[0].bytes, b"\x00\x01binary");
    }

    #[tokio::test]
    async fn test_missing_form_file_is_a_file_error() {
        let mut config = TestConfig::new(vec!["http://localhost/".to_string()]);
        config
            .form_files
            .push(("f".to_string(), PathBuf::from("/nonexistent/upload.bin")));

        let store = PayloadStore::new(&config);
        let err = store.form_parts().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::File);
    }
}
