//! Upload resolution: turn a user-supplied path or URL into an in-memory upload.
//!
//! Everything checked here fails synchronously, before a job exists: a
//! missing file, an oversized upload or a non-PDF is a request error, not a
//! failed job. The magic bytes (`%PDF`) are checked so the worker never
//! spends an LLM call on a file that could not have been a statement.

use crate::config::ParserConfig;
use crate::error::StatementError;
use std::path::PathBuf;
use tracing::{debug, info};

/// A statement file held in memory, ready to be queued.
#[derive(Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl Upload {
    /// Wrap bytes received from elsewhere (an HTTP form, a message bus),
    /// applying the same checks as file and URL inputs.
    pub fn from_bytes(
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        config: &ParserConfig,
    ) -> Result<Self, StatementError> {
        let upload = Self {
            file_name: file_name.into(),
            bytes,
        };
        upload.check(config.max_file_bytes)?;
        Ok(upload)
    }

    fn check(&self, max_file_bytes: usize) -> Result<(), StatementError> {
        if self.bytes.is_empty() {
            return Err(StatementError::EmptyUpload {
                file_name: self.file_name.clone(),
            });
        }
        if self.bytes.len() > max_file_bytes {
            return Err(StatementError::FileTooLarge {
                file_name: self.file_name.clone(),
                size: self.bytes.len(),
                limit: max_file_bytes,
            });
        }
        if !self.bytes.starts_with(b"%PDF") {
            return Err(StatementError::NotAPdf {
                file_name: self.file_name.clone(),
                magic: self.bytes.iter().take(4).copied().collect(),
            });
        }
        Ok(())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or download a URL into an [`Upload`].
pub async fn load_upload(input: &str, config: &ParserConfig) -> Result<Upload, StatementError> {
    if input.trim().is_empty() {
        return Err(StatementError::InvalidInput {
            input: input.to_string(),
        });
    }

    let upload = if is_url(input) {
        download_url(input, config.download_timeout_secs).await?
    } else {
        read_local(input).await?
    };

    upload.check(config.max_file_bytes)?;
    Ok(upload)
}

async fn read_local(path_str: &str) -> Result<Upload, StatementError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(StatementError::PermissionDenied { path });
        }
        Err(_) => return Err(StatementError::FileNotFound { path }),
    };

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("statement.pdf")
        .to_string();

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(Upload { file_name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, StatementError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StatementError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            StatementError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            StatementError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(StatementError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| StatementError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes from {}", bytes.len(), url);

    Ok(Upload {
        file_name: file_name_from_url(url),
        bytes: bytes.to_vec(),
    })
}

/// Last path segment of the URL if it looks like a file name.
fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
