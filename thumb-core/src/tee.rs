//! Fan-out of one byte stream into several sinks.
//!
//! A [`TeeSink`] forwards every write to each of its branches and only reports
//! success once all of them accepted the bytes. The first failing branch
//! aborts the whole group with that failure as the reason.
//!
//! One branch may be [`TeeBranch::PassThrough`]: the tee then also hands out a
//! [`PipeReader`] reproducing everything written to it, bounded to a few
//! chunks so the reader's pace throttles the writer.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{join_all, try_join_all};

use crate::pipe::{pipe, PipeReader};
use crate::{root_cause, ByteSink, ThumbError, ThumbResult};

/// Default number of chunks the pass-through branch may hold.
pub const DEFAULT_PASS_THROUGH_CAPACITY: usize = 4;

/// One member of a tee group.
pub enum TeeBranch {
    Sink(Box<dyn ByteSink>),
    /// Re-emit the written bytes through a reader handed back by the tee.
    PassThrough,
}

impl TeeBranch {
    pub fn sink<S: ByteSink + 'static>(sink: S) -> Self {
        Self::Sink(Box::new(sink))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeeState {
    Open,
    Closed,
    Failed,
}

pub struct TeeSink {
    name: String,
    branches: Vec<Box<dyn ByteSink>>,
    pass_through: Option<usize>,
    state: TeeState,
    /// Why the group failed, echoed by later calls
    failure: Option<ThumbError>,
    bytes_written: u64,
}

impl std::fmt::Debug for TeeSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeeSink")
            .field("name", &self.name)
            .field("branches", &self.branch_names())
            .field("state", &self.state)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

impl TeeSink {
    /// Build a tee over `branches`.
    ///
    /// Returns the reader for the pass-through branch when one was requested.
    /// `pass_through_capacity` is the number of chunks that reader may lag.
    pub fn new<S: Into<String>>(
        name: S,
        branches: Vec<TeeBranch>,
        pass_through_capacity: usize,
    ) -> ThumbResult<(Self, Option<PipeReader>)> {
        let name = name.into();
        if branches.is_empty() {
            return Err(ThumbError::config(format!("tee '{name}' needs at least one branch")));
        }

        let mut sinks: Vec<Box<dyn ByteSink>> = Vec::with_capacity(branches.len());
        let mut pass_through = None;
        let mut reader = None;

        for branch in branches {
            match branch {
                TeeBranch::Sink(sink) => sinks.push(sink),
                TeeBranch::PassThrough => {
                    if pass_through.is_some() {
                        return Err(ThumbError::config(format!(
                            "tee '{name}' has more than one pass-through branch"
                        )));
                    }
                    let (sink, stream) = pipe(format!("{name}/pass-through"), pass_through_capacity);
                    pass_through = Some(sinks.len());
                    sinks.push(Box::new(sink));
                    reader = Some(stream.into_reader());
                }
            }
        }

        Ok((
            Self {
                name,
                branches: sinks,
                pass_through,
                state: TeeState::Open,
                failure: None,
                bytes_written: 0,
            },
            reader,
        ))
    }

    /// Convenience constructor for a tee without pass-through.
    pub fn from_sinks<S: Into<String>>(name: S, sinks: Vec<Box<dyn ByteSink>>) -> ThumbResult<Self> {
        let branches = sinks.into_iter().map(TeeBranch::Sink).collect();
        let (tee, _) = Self::new(name, branches, DEFAULT_PASS_THROUGH_CAPACITY)?;
        Ok(tee)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn branch_names(&self) -> Vec<&str> {
        self.branches.iter().map(|b| b.name()).collect()
    }

    /// Signal end-of-input on the pass-through branch only.
    ///
    /// The other branches stay open so they can still be committed or
    /// aborted by whoever owns the tee.
    pub async fn end_pass_through(&mut self) -> ThumbResult<()> {
        self.ensure_open()?;
        if let Some(index) = self.pass_through {
            match self.branches[index].close().await {
                // The reader stopped early; its owner decides whether that is a failure.
                Err(err) if err.is_cancellation() => {
                    tracing::debug!(tee = %self.name, error = %err, "pass-through reader left before end of input");
                }
                result => result?,
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> ThumbResult<()> {
        match self.state {
            TeeState::Open => Ok(()),
            TeeState::Closed => Err(ThumbError::cancelled(format!("tee '{}' is closed", self.name))),
            TeeState::Failed => Err(match &self.failure {
                Some(cause) => ThumbError::cancelled_by(cause),
                None => ThumbError::cancelled(format!("tee '{}' has failed", self.name)),
            }),
        }
    }

    /// Abort every branch with `reason`, logging any abort failures.
    async fn abort_all(&mut self, reason: &ThumbError) {
        self.state = TeeState::Failed;
        self.failure = Some(ThumbError::cancelled_by(reason));
        let results = join_all(self.branches.iter_mut().map(|b| b.abort(reason))).await;
        for (branch, result) in self.branches.iter().zip(results) {
            if let Err(err) = result {
                tracing::warn!(tee = %self.name, branch = branch.name(), error = %err, "branch abort failed");
            }
        }
    }
}

#[async_trait]
impl ByteSink for TeeSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, chunk: Bytes) -> ThumbResult<()> {
        self.ensure_open()?;
        if chunk.is_empty() {
            return Ok(());
        }

        let len = chunk.len() as u64;
        // First failure drops the other in-flight writes; the group is
        // aborted either way.
        let result = try_join_all(self.branches.iter_mut().map(|b| b.write(chunk.clone()))).await;
        if let Err(err) = result {
            tracing::debug!(tee = %self.name, error = %err, "branch write failed, aborting group");
            self.abort_all(&err).await;
            return Err(err);
        }

        self.bytes_written += len;
        Ok(())
    }

    async fn flush(&mut self) -> ThumbResult<()> {
        self.ensure_open()?;
        let results = join_all(self.branches.iter_mut().map(|b| b.flush())).await;
        if let Some(err) = root_cause(results.into_iter().filter_map(Result::err)) {
            self.abort_all(&err).await;
            return Err(err);
        }
        Ok(())
    }

    async fn close(&mut self) -> ThumbResult<()> {
        self.ensure_open()?;

        let mut errors: Vec<ThumbError> = Vec::new();
        for branch in self.branches.iter_mut() {
            // Once a branch failed to close, the rest are aborted.
            let result = match errors.first() {
                None => branch.close().await,
                Some(first) => branch.abort(first).await,
            };
            if let Err(err) = result {
                tracing::warn!(tee = %self.name, branch = branch.name(), error = %err, "branch close failed");
                errors.push(err);
            }
        }

        if errors.is_empty() {
            self.state = TeeState::Closed;
            tracing::debug!(tee = %self.name, bytes = self.bytes_written, "tee closed");
            Ok(())
        } else {
            let err = errors.remove(0);
            self.state = TeeState::Failed;
            self.failure = Some(ThumbError::cancelled_by(&err));
            Err(err)
        }
    }

    async fn abort(&mut self, reason: &ThumbError) -> ThumbResult<()> {
        if self.state != TeeState::Open {
            return Ok(());
        }
        self.abort_all(reason).await;
        Ok(())
    }
}
