use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::{ByteSink, ThumbError, ThumbResult};

/// Local file output.
///
/// Bytes go to a temporary file next to the target; `close` renames it into
/// place and `abort` removes it, so the target path only ever holds a complete
/// result.
pub struct FileSink {
    name: String,
    target: PathBuf,
    file: Option<File>,
    temp_path: Option<TempPath>,
}

impl FileSink {
    pub async fn create<P: AsRef<Path>>(target: P) -> ThumbResult<Self> {
        let target = target.as_ref().to_path_buf();
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let temp = tempfile::Builder::new()
            .prefix(".thumb-")
            .tempfile_in(&dir)
            .map_err(|err| ThumbError::input_with(format!("Cannot write to {}", target.display()), err))?;
        let (file, temp_path) = temp.into_parts();

        Ok(Self {
            name: target.display().to_string(),
            target,
            file: Some(File::from_std(file)),
            temp_path: Some(temp_path),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

#[async_trait]
impl ByteSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, chunk: Bytes) -> ThumbResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ThumbError::cancelled(format!("{} is no longer writable", self.name)))?;
        file.write_all(&chunk).await?;
        Ok(())
    }

    async fn flush(&mut self) -> ThumbResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> ThumbResult<()> {
        let (Some(mut file), Some(temp_path)) = (self.file.take(), self.temp_path.take()) else {
            return Err(ThumbError::cancelled(format!("{} was already finished", self.name)));
        };
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        temp_path
            .persist(&self.target)
            .map_err(|err| ThumbError::Io { source: err.error })?;
        tracing::debug!(path = %self.target.display(), "file output committed");
        Ok(())
    }

    async fn abort(&mut self, reason: &ThumbError) -> ThumbResult<()> {
        self.file.take();
        if let Some(temp_path) = self.temp_path.take() {
            tracing::debug!(path = %self.target.display(), reason = %reason, "discarding file output");
            temp_path.close()?;
        }
        Ok(())
    }
}
