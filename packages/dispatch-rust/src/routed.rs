//! The dispatch result sequence.

use std::fmt;
use std::sync::Arc;

use fastmsg_core::RoutedResult;
use futures_util::StreamExt;

use crate::callable::OutputStream;
use crate::error::DispatchError;
use crate::flatten::{Flatten, ResultFlattener};
use crate::runloop::RunLoop;

struct StreamSource {
    stream: OutputStream,
    runloop: Arc<RunLoop>,
    default_channel: Option<String>,
    flattener: ResultFlattener,
}

/// Ordered results of one dispatch.
///
/// Results are produced as the iterator is pulled. For a streaming callable
/// each pull resumes the stream on the dispatcher's run-loop, blocking the
/// calling thread until the next element (or the end) is available, so an
/// infinite stream is fine as long as the caller stops pulling. Iteration
/// ends after the first error.
pub struct Routed {
    ready: std::vec::IntoIter<RoutedResult>,
    pending: Option<Flatten>,
    stream: Option<StreamSource>,
}

impl Routed {
    /// A dispatch that produced nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_results(Vec::new())
    }

    /// Already materialised results, e.g. from a validation-error handler.
    #[must_use]
    pub fn from_results(results: Vec<RoutedResult>) -> Self {
        Self {
            ready: results.into_iter(),
            pending: None,
            stream: None,
        }
    }

    pub(crate) fn from_output(walk: Flatten) -> Self {
        Self {
            ready: Vec::new().into_iter(),
            pending: Some(walk),
            stream: None,
        }
    }

    pub(crate) fn from_stream(
        stream: OutputStream,
        runloop: Arc<RunLoop>,
        default_channel: Option<String>,
        flattener: ResultFlattener,
    ) -> Self {
        Self {
            ready: Vec::new().into_iter(),
            pending: None,
            stream: Some(StreamSource {
                stream,
                runloop,
                default_channel,
                flattener,
            }),
        }
    }

    /// Whether results come from a streaming callable that is not exhausted.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Pull every result.
    ///
    /// Never returns for an infinite stream.
    ///
    /// # Errors
    ///
    /// The first error met; earlier results are discarded.
    pub fn collect_results(self) -> Result<Vec<RoutedResult>, DispatchError> {
        self.collect()
    }

    fn fail(&mut self, error: DispatchError) -> Option<Result<RoutedResult, DispatchError>> {
        self.pending = None;
        self.stream = None;
        Some(Err(error))
    }
}

impl Iterator for Routed {
    type Item = Result<RoutedResult, DispatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(routed) = self.ready.next() {
            return Some(Ok(routed));
        }
        loop {
            if let Some(walk) = self.pending.as_mut() {
                match walk.next() {
                    Some(Ok(routed)) => return Some(Ok(routed)),
                    Some(Err(error)) => return self.fail(error),
                    None => self.pending = None,
                }
            }

            let source = self.stream.as_mut()?;
            let pulled = source.runloop.block_on(source.stream.next());
            match pulled {
                Err(error) => return self.fail(error.into()),
                Ok(None) => {
                    self.stream = None;
                    return None;
                }
                Ok(Some(Err(error))) => return self.fail(DispatchError::from_handler(error)),
                Ok(Some(Ok(output))) => {
                    let walk = source.flattener.iter(output, source.default_channel.clone());
                    self.pending = Some(walk);
                }
            }
        }
    }
}

impl fmt::Debug for Routed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routed")
            .field("ready", &self.ready.len())
            .field("pending", &self.pending)
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
