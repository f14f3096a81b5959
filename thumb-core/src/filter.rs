//! Driver for the external resize filter.
//!
//! The filter is an opaque program that reads an image on stdin and writes a
//! JPEG on stdout (ImageMagick `convert` by default). Input feed, output drain
//! and stderr collection run concurrently for the whole lifetime of the
//! process: a filter may stop reading until its output is consumed, so
//! copying input first and output second deadlocks on anything larger than a
//! pipe buffer.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::pipe::classify_read_error;
use crate::{ByteSink, ThumbConfigSnapshot, ThumbError, ThumbResult};

/// Default executable, resolved through `PATH`.
pub const DEFAULT_CONVERT_PATH: &str = "convert";
pub const DEFAULT_MAX_WIDTH: u32 = 200;
pub const DEFAULT_MAX_HEIGHT: u32 = 200;

const FEED_CHUNK_BYTES: usize = 64 * 1024;
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// Upper bounds for the thumbnail; `None` leaves that axis unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeBounds {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl ResizeBounds {
    pub fn new(max_width: Option<u32>, max_height: Option<u32>) -> Self {
        Self { max_width, max_height }
    }

    /// ImageMagick geometry: `200x200`, `200x`, `x150`, or `x`.
    pub fn geometry(&self) -> String {
        let side = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_default();
        format!("{}x{}", side(self.max_width), side(self.max_height))
    }

    /// `filter.max_width` / `filter.max_height`; `0` means unconstrained.
    pub fn from_config(config: &ThumbConfigSnapshot) -> Self {
        let bound = |key: &str, default: u32| match config.get_u32(key).unwrap_or(default) {
            0 => None,
            v => Some(v),
        };
        Self {
            max_width: bound("filter.max_width", DEFAULT_MAX_WIDTH),
            max_height: bound("filter.max_height", DEFAULT_MAX_HEIGHT),
        }
    }
}

/// Runs one filter process per conversion.
#[derive(Debug, Clone)]
pub struct ResizeFilter {
    program: PathBuf,
}

impl Default for ResizeFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERT_PATH)
    }
}

impl ResizeFilter {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Reads `filter.convert_path`.
    pub fn from_config(config: &ThumbConfigSnapshot) -> Self {
        Self::new(
            config
                .get_string("filter.convert_path")
                .unwrap_or_else(|| DEFAULT_CONVERT_PATH.to_string()),
        )
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments for one invocation.
    pub fn args(bounds: ResizeBounds) -> Vec<String> {
        vec![
            "-resize".to_string(),
            bounds.geometry(),
            "-".to_string(),
            "jpg:-".to_string(),
        ]
    }

    /// Convert everything `input` yields, writing the filter output to `output`.
    ///
    /// `output` is neither closed nor aborted here; its owner decides what to
    /// do with it based on the result. The process is killed if this future
    /// is dropped or any leg fails.
    #[instrument(skip_all, fields(program = %self.program.display(), geometry = %bounds.geometry()))]
    pub async fn run<R>(&self, input: R, output: &mut dyn ByteSink, bounds: ResizeBounds) -> ThumbResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut child = Command::new(&self.program)
            .args(Self::args(bounds))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ThumbError::Launch {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
            return Err(ThumbError::Launch {
                program: self.program.display().to_string(),
                source: io::Error::new(io::ErrorKind::Other, "standard streams were not captured"),
            });
        };

        tracing::debug!(pid = child.id(), "filter started");

        let (fed, drained, diagnostics) = tokio::try_join!(
            feed_input(input, stdin),
            drain_output(stdout, output),
            collect_diagnostics(stderr),
        )?;

        let status = child.wait().await?;
        tracing::debug!(%status, fed, drained, "filter exited");

        if status.success() {
            return Ok(());
        }

        let message = if diagnostics.is_empty() {
            match status.code() {
                Some(code) => format!("Error converting image, exit code: {code}"),
                None => format!("Error converting image, {status}"),
            }
        } else {
            diagnostics
        };
        Err(ThumbError::conversion(message, status.code()))
    }
}

/// Copy `input` into the filter, then close its stdin.
///
/// A broken pipe means the filter stopped reading (usually because it is
/// about to fail); the exit status decides the outcome then.
async fn feed_input<R>(mut input: R, mut stdin: ChildStdin) -> ThumbResult<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = vec![0u8; FEED_CHUNK_BYTES];
    let mut total = 0u64;
    loop {
        let n = input.read(&mut buf).await.map_err(classify_read_error)?;
        if n == 0 {
            break;
        }
        match stdin.write_all(&buf[..n]).await {
            Ok(()) => total += n as u64,
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(total, "filter closed its input early");
                return Ok(total);
            }
            Err(err) => return Err(err.into()),
        }
    }

    match stdin.shutdown().await {
        Err(err) if err.kind() != io::ErrorKind::BrokenPipe => return Err(err.into()),
        _ => {}
    }
    drop(stdin);
    Ok(total)
}

async fn drain_output(stdout: ChildStdout, output: &mut dyn ByteSink) -> ThumbResult<u64> {
    let mut chunks = ReaderStream::new(stdout);
    let mut total = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        total += chunk.len() as u64;
        output.write(chunk).await?;
    }
    Ok(total)
}

/// Read stderr to the end, keeping at most `MAX_DIAGNOSTIC_BYTES`.
async fn collect_diagnostics(mut stderr: ChildStderr) -> ThumbResult<String> {
    let mut kept = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stderr.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = MAX_DIAGNOSTIC_BYTES.saturating_sub(kept.len());
        kept.extend_from_slice(&buf[..n.min(room)]);
    }
    Ok(String::from_utf8_lossy(&kept).trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BufferSink;

    #[test]
    fn geometry_leaves_unset_axes_empty() {
        assert_eq!(ResizeBounds::new(Some(200), Some(150)).geometry(), "200x150");
        assert_eq!(ResizeBounds::new(Some(200), None).geometry(), "200x");
        assert_eq!(ResizeBounds::new(None, Some(90)).geometry(), "x90");
        assert_eq!(ResizeBounds::default().geometry(), "x");
    }

    #[test]
    fn args_match_convert_invocation() {
        assert_eq!(
            ResizeFilter::args(ResizeBounds::new(Some(200), Some(200))),
            vec!["-resize", "200x200", "-", "jpg:-"]
        );
    }

    #[test]
    fn bounds_from_config_treat_zero_as_unconstrained() {
        let mut config = crate::ThumbConfig::new();
        config.set("filter.max_width", "0");
        let bounds = ResizeBounds::from_config(&config.snapshot());
        assert_eq!(bounds, ResizeBounds::new(None, Some(DEFAULT_MAX_HEIGHT)));
    }

    #[tokio::test]
    async fn missing_executable_is_a_launch_error() {
        let filter = ResizeFilter::new("/definitely/not/here/convert");
        let mut out = BufferSink::new();
        let err = filter
            .run(&b"image"[..], &mut out, ResizeBounds::default())
            .await
            .unwrap_err();

        match err {
            ThumbError::Launch { program, .. } => assert_eq!(program, "/definitely/not/here/convert"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
