use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::statistics::StatisticsTracker;

/// An [`AsyncRead`] that reports every byte it yields to a tracker.
///
/// Dropping the reader closes the tracker, then the inner stream.
pub struct TimedReader<R> {
    tracker: StatisticsTracker,
    inner: R,
}

impl<R: AsyncRead + Unpin> TimedReader<R> {
    pub fn new(inner: R, tracker: StatisticsTracker) -> Self {
        Self { tracker, inner }
    }

    /// Returns the tracker fed by this reader.
    pub fn tracker(&self) -> &StatisticsTracker {
        &self.tracker
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TimedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let read = buf.filled().len() - before;
        if read > 0 {
            this.tracker.add(read as u64);
        }
        Poll::Ready(Ok(()))
    }
}

impl<R> Drop for TimedReader<R> {
    fn drop(&mut self) {
        // Fields drop after this, so the inner stream closes second.
        self.tracker.close();
    }
}

/// An [`AsyncWrite`] that reports every byte it accepts to a tracker.
///
/// Shutting the writer down closes the tracker, then shuts down the
/// inner stream. Dropping it closes the tracker as well.
pub struct TimedWriter<W> {
    tracker: StatisticsTracker,
    inner: W,
}

impl<W: AsyncWrite + Unpin> TimedWriter<W> {
    pub fn new(inner: W, tracker: StatisticsTracker) -> Self {
        Self { tracker, inner }
    }

    /// Returns the tracker fed by this writer.
    pub fn tracker(&self) -> &StatisticsTracker {
        &self.tracker
    }

    /// Returns the inner stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for TimedWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        if written > 0 {
            this.tracker.add(written as u64);
        }
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.tracker.close();
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

impl<W> Drop for TimedWriter<W> {
    fn drop(&mut self) {
        self.tracker.close();
    }
}
