//! Container log streaming.
//!
//! The transport delivers raw bytes; line framing happens here, with a 1 MiB
//! per-line cap so one noisy application cannot balloon the reader. Dropping
//! the stream (or the future driving it) cancels the underlying request.

use futures::{AsyncBufRead, AsyncBufReadExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::LogParams;
use kube::{Api, Client};

use crate::errors::{Error, Result};
use crate::k8s::client::K8sClient;

/// Per-line cap. Bytes beyond this on a single line are discarded.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Options for one log stream request.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Container name; required for multi-container pods.
    pub container: Option<String>,
    /// Keep the stream open and deliver new lines as they appear.
    pub follow: bool,
    /// Logs from the previous container instance. Mutually exclusive with
    /// `follow`.
    pub previous: bool,
    /// Prefix each line with the source-emitted RFC3339 timestamp.
    pub timestamps: bool,
    /// Bound on the initial historical tail; 0 means no history.
    pub tail_lines: Option<i64>,
}

pub struct LogStreamer {
    client: Client,
}

impl LogStreamer {
    pub fn new(client: &K8sClient) -> Self {
        Self {
            client: client.client().clone(),
        }
    }

    /// Open a byte stream of container logs. `follow=false` returns the
    /// current snapshot and ends; cancelling the caller's context (dropping
    /// the stream) closes the request.
    pub async fn stream(
        &self,
        namespace: &str,
        pod: &str,
        opts: &LogOptions,
    ) -> Result<impl AsyncBufRead + Unpin> {
        if opts.follow && opts.previous {
            return Err(Error::LogStream(
                "follow and previous are mutually exclusive".to_string(),
            ));
        }
        let params = LogParams {
            container: opts.container.clone(),
            follow: opts.follow,
            previous: opts.previous,
            timestamps: opts.timestamps,
            tail_lines: opts.tail_lines,
            ..LogParams::default()
        };
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.log_stream(pod, &params)
            .await
            .map_err(|e| Error::LogStream(e.to_string()))
    }

    /// As `stream`, framed into lines with the 1 MiB cap applied.
    pub async fn stream_lines(
        &self,
        namespace: &str,
        pod: &str,
        opts: &LogOptions,
    ) -> Result<LogLineReader<impl AsyncBufRead + Unpin>> {
        Ok(LogLineReader::new(self.stream(namespace, pod, opts).await?))
    }
}

/// Newline framing over an async byte stream. Lines longer than
/// [`MAX_LINE_BYTES`] are truncated at the cap; the overflow is consumed and
/// discarded so framing stays aligned.
pub struct LogLineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LogLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Next line without its trailing newline, or None at end of stream.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let mut truncating = false;
        loop {
            let chunk = self
                .inner
                .fill_buf()
                .await
                .map_err(|e| Error::LogStream(e.to_string()))?;
            if chunk.is_empty() {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    if !truncating {
                        let take = pos.min(MAX_LINE_BYTES - self.buf.len());
                        self.buf.extend_from_slice(&chunk[..take]);
                    }
                    self.inner.consume_unpin(pos + 1);
                    return Ok(Some(self.take_line()));
                }
                None => {
                    let len = chunk.len();
                    if !truncating {
                        let take = len.min(MAX_LINE_BYTES - self.buf.len());
                        self.buf.extend_from_slice(&chunk[..take]);
                        if self.buf.len() >= MAX_LINE_BYTES {
                            truncating = true;
                        }
                    }
                    self.inner.consume_unpin(len);
                }
            }
        }
    }

    fn take_line(&mut self) -> String {
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}
