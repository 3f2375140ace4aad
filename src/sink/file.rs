use super::ResultSink;
use crate::counter::WindowResult;
use crate::error::DeliveryError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Appends one line per window to a local file.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

fn format_line(result: &WindowResult) -> String {
    format!(
        "{} No.of unique entries {}\n",
        result.timestamp.format("%Y-%m-%d %H:%M:%S"),
        result.unique_count
    )
}

#[async_trait]
impl ResultSink for FileSink {
    async fn deliver(&self, result: &WindowResult) -> Result<(), DeliveryError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format_line(result).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
