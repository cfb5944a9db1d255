//! Instrumented connection I/O.
//!
//! [`TracedIo`] wraps the established stream and [`TracedBody`] the request
//! body. They share a [`Progress`] record so that "request written" fires on
//! the first flush after the body ended, and "first byte" on the first read
//! after that. Both only look at sizes and flags, data passes through untouched.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::trace::ConnectionObserver;

/// Body type produced by the request composer.
pub type ComposedBody = UnsyncBoxBody<Bytes, io::Error>;

/// Body type handed to the HTTP connection.
pub type RequestBody = TracedBody<ComposedBody>;

/// Write/read progress of the single request sent on a connection.
#[derive(Debug, Default)]
pub struct Progress {
    track_reads: bool,
    body_done: AtomicBool,
    request_written: AtomicBool,
    first_byte: AtomicBool,
}

impl Progress {
    /// Creates a record. When `track_reads` is false the stream never reports
    /// the first byte, the transport does it when the response head arrives.
    pub fn new(track_reads: bool) -> Self {
        Self {
            track_reads,
            ..Self::default()
        }
    }

    /// The request body produced its last frame.
    pub fn mark_body_done(&self) {
        self.body_done.store(true, Ordering::Release);
    }

    /// Whether the request body produced its last frame.
    pub fn body_done(&self) -> bool {
        self.body_done.load(Ordering::Acquire)
    }

    /// Marks the request as written. True only for the first call.
    pub fn mark_request_written(&self) -> bool {
        !self.request_written.swap(true, Ordering::AcqRel)
    }

    /// Whether the request was written.
    pub fn request_written(&self) -> bool {
        self.request_written.load(Ordering::Acquire)
    }

    /// Marks the first response byte as seen. True only for the first call.
    pub fn mark_first_byte(&self) -> bool {
        !self.first_byte.swap(true, Ordering::AcqRel)
    }
}

/// Stream wrapper reporting write completion and the first response byte.
pub struct TracedIo<S, O> {
    inner: S,
    observer: Arc<O>,
    progress: Arc<Progress>,
}

impl<S, O> TracedIo<S, O> {
    /// Wraps `inner`.
    pub fn new(inner: S, observer: Arc<O>, progress: Arc<Progress>) -> Self {
        Self {
            inner,
            observer,
            progress,
        }
    }
}

impl<S, O> AsyncRead for TracedIo<S, O>
where
    S: AsyncRead + Unpin,
    O: ConnectionObserver,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        if this.progress.track_reads
            && buf.filled().len() > before
            && this.progress.request_written()
            && this.progress.mark_first_byte()
        {
            this.observer.first_byte();
        }
        Poll::Ready(Ok(()))
    }
}

impl<S, O> AsyncWrite for TracedIo<S, O>
where
    S: AsyncWrite + Unpin,
    O: ConnectionObserver,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let result = ready!(Pin::new(&mut this.inner).poll_flush(cx));
        if this.progress.body_done() && this.progress.mark_request_written() {
            let error = result.as_ref().err().map(ToString::to_string);
            this.observer.wrote_request(error.as_deref());
        }
        Poll::Ready(result)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Body wrapper flagging the end of the request body.
pub struct TracedBody<B> {
    inner: B,
    progress: Arc<Progress>,
}

impl<B> TracedBody<B> {
    /// Wraps `inner`.
    pub fn new(inner: B, progress: Arc<Progress>) -> Self {
        Self { inner, progress }
    }
}

impl<B> Body for TracedBody<B>
where
    B: Body + Unpin,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        if frame.is_none() || this.inner.is_end_stream() {
            this.progress.mark_body_done();
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    impl ConnectionObserver for Recorder {
        fn wrote_request(&self, _error: Option<&str>) {
            self.0.lock().unwrap().push("wrote_request");
        }

        fn first_byte(&self) {
            self.0.lock().unwrap().push("first_byte");
        }
    }

    #[tokio::test]
    async fn test_flush_before_body_end_reports_nothing() {
        let observer = Arc::new(Recorder::default());
        let progress = Arc::new(Progress::new(true));
        let (client, mut server) = tokio::io::duplex(64);
        let mut io = TracedIo::new(client, observer.clone(), progress.clone());

        io.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        io.flush().await.unwrap();
        assert!(observer.0.lock().unwrap().is_empty());

        progress.mark_body_done();
        io.flush().await.unwrap();
        io.flush().await.unwrap();
        server.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();
        let mut buf = [0u8; 8];
        io.read_exact(&mut buf).await.unwrap();
        io.read_exact(&mut buf).await.unwrap();
        assert_eq!(*observer.0.lock().unwrap(), vec!["wrote_request", "first_byte"]);
    }

    #[tokio::test]
    async fn test_reads_are_ignored_when_not_tracked() {
        let observer = Arc::new(Recorder::default());
        let progress = Arc::new(Progress::new(false));
        progress.mark_request_written();
        let (client, mut server) = tokio::io::duplex(64);
        let mut io = TracedIo::new(client, observer.clone(), progress);
        server.write_all(b"x").await.unwrap();
        let mut buf = [0u8; 1];
        io.read_exact(&mut buf).await.unwrap();
        assert!(observer.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_body_end_is_flagged() {
        let progress = Arc::new(Progress::new(true));
        let body = TracedBody::new(Full::new(Bytes::from_static(b"abc")), progress.clone());
        assert!(!progress.body_done());
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"abc");
        assert!(progress.body_done());
    }
}
