// rust/ckpt-client/src/transport.rs

//! Byte-stream channels to the checkpoint service.
//!
//! A library instance owns two channels: one strictly for request/response
//! exchanges and one for server-pushed notifications. [`Channel`] wraps a
//! connected Unix stream with bounded-retry send/receive and a readiness
//! poll. Establishing the streams is delegated to a [`ServiceConnector`].

use std::io::{self, Read};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::error::{CkptError, Result};
use crate::handle::lock;
use crate::retry::{retry_blocking, RetryConfig, RetryResult};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

const DISCARD_CHUNK: usize = 512;

/// Result of waiting for a channel to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// At least one byte can be read without blocking.
    Readable,
    /// The wait timed out with nothing queued.
    Idle,
    /// The peer hung up or the descriptor is in error.
    HungUp,
}

/// One connected stream to the service.
#[derive(Debug)]
pub struct Channel {
    stream: UnixStream,
    retry: RetryConfig,
    exchange: Mutex<()>,
    closed: AtomicBool,
}

impl Channel {
    pub fn new(stream: UnixStream, retry: RetryConfig) -> Self {
        Self {
            stream,
            retry,
            exchange: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Serializes one request/response pair on this channel.
    pub(crate) fn lock_exchange(&self) -> MutexGuard<'_, ()> {
        lock(&self.exchange)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends `segments` back to back. Short writes resume where they stopped.
    pub fn send_segments(&self, segments: &[&[u8]]) -> Result<()> {
        if self.is_closed() {
            return Err(CkptError::transport("channel is closed"));
        }

        let fd = self.as_raw_fd();
        for segment in segments {
            let mut sent = 0;
            while sent < segment.len() {
                let pending = &segment[sent..];
                let n = self.io_retry("send", || send_nosignal(fd, pending))?;
                if n == 0 {
                    return Err(CkptError::transport("channel closed while sending"));
                }
                sent += n;
            }
        }
        Ok(())
    }

    /// Fills `buf` completely or fails.
    pub fn recv_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.io_retry("receive", || (&self.stream).read(&mut buf[filled..]))?;
            if n == 0 {
                return Err(CkptError::transport("channel closed by peer"));
            }
            filled += n;
        }
        Ok(())
    }

    /// Reads and drops `len` bytes, keeping the stream framed.
    pub fn discard(&self, mut len: usize) -> Result<()> {
        let mut scratch = [0u8; DISCARD_CHUNK];
        while len > 0 {
            let chunk = len.min(DISCARD_CHUNK);
            self.recv_exact(&mut scratch[..chunk])?;
            len -= chunk;
        }
        Ok(())
    }

    /// Waits until the channel is readable or hung up.
    ///
    /// `None` waits indefinitely; a zero timeout only samples the state.
    pub fn poll_readable(&self, timeout: Option<Duration>) -> Result<Readiness> {
        let timeout_ms = match timeout {
            None => -1,
            Some(timeout) => timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        };

        let mut pfd = libc::pollfd {
            fd: self.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = self.io_retry("poll", || {
            pfd.revents = 0;
            // SAFETY: pfd is a valid pollfd and nfds is 1
            let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if ret < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(ret)
            }
        })?;

        if ready == 0 {
            return Ok(Readiness::Idle);
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Ok(Readiness::HungUp);
        }
        if pfd.revents & libc::POLLIN != 0 {
            Ok(Readiness::Readable)
        } else {
            Ok(Readiness::Idle)
        }
    }

    /// Shuts the stream down in both directions.
    ///
    /// Returns true for the call that actually closed it. The descriptor
    /// itself stays allocated until the last owner drops the channel.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Err(e) = self.stream.shutdown(std::net::Shutdown::Both) {
            tracing::debug!(error = %e, "channel shutdown reported an error");
        }
        true
    }

    fn io_retry<T>(
        &self,
        what: &'static str,
        mut operation: impl FnMut() -> io::Result<T>,
    ) -> Result<T> {
        retry_blocking(&self.retry, || match operation() {
            Ok(value) => RetryResult::Ok(value),
            Err(e) if is_transient(&e) => {
                tracing::warn!(operation = what, error = %e, "transient channel error, retrying");
                RetryResult::Retry(e)
            }
            Err(e) => RetryResult::Fail(e),
        })
        .map_err(|e| CkptError::transport_with_source(format!("channel {what} failed"), e))
    }
}

impl AsRawFd for Channel {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

fn send_nosignal(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    // SAFETY: buf is an initialized slice valid for buf.len() bytes
    let ret = unsafe { libc::send(fd, buf.as_ptr().cast::<libc::c_void>(), buf.len(), SEND_FLAGS) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// The two streams of one library instance.
#[derive(Debug)]
pub struct ChannelPair {
    pub response: UnixStream,
    pub dispatch: UnixStream,
}

/// Establishes the streams to the service named `service_name`.
///
/// Any handshake the service requires beyond connecting belongs to the
/// implementation.
pub trait ServiceConnector: Send + Sync {
    fn connect(&self, service_name: &str) -> io::Result<ChannelPair>;
}

/// Connects both channels to a Unix socket path.
#[derive(Debug, Clone)]
pub struct UnixSocketConnector {
    path: PathBuf,
}

impl UnixSocketConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.socket_path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ServiceConnector for UnixSocketConnector {
    fn connect(&self, service_name: &str) -> io::Result<ChannelPair> {
        tracing::debug!(service = service_name, path = %self.path.display(), "connecting to service");
        let response = UnixStream::connect(&self.path)?;
        let dispatch = UnixStream::connect(&self.path)?;
        Ok(ChannelPair { response, dispatch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixListener;

    fn channel_pair() -> (Channel, UnixStream) {
        let (local, peer) = UnixStream::pair().unwrap();
        (Channel::new(local, RetryConfig::default()), peer)
    }

    #[test]
    fn test_send_segments_are_contiguous() {
        let (channel, mut peer) = channel_pair();
        channel
            .send_segments(&[b"head", b"", b"-id", b"-data"])
            .unwrap();

        let mut buf = [0u8; 12];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"head-id-data");
    }

    #[test]
    fn test_recv_exact_across_writes() {
        let (channel, mut peer) = channel_pair();
        let writer = std::thread::spawn(move || {
            peer.write_all(b"abc").unwrap();
            std::thread::sleep(Duration::from_millis(5));
            peer.write_all(b"def").unwrap();
            peer
        });

        let mut buf = [0u8; 6];
        channel.recv_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abcdef");
        writer.join().unwrap();
    }

    #[test]
    fn test_recv_after_peer_close() {
        let (channel, peer) = channel_pair();
        drop(peer);

        let mut buf = [0u8; 4];
        let err = channel.recv_exact(&mut buf).unwrap_err();
        assert!(matches!(err, CkptError::Transport { .. }));
    }

    #[test]
    fn test_discard_keeps_framing() {
        let (channel, mut peer) = channel_pair();
        let mut payload = vec![7u8; 1300];
        payload.extend_from_slice(b"next");
        peer.write_all(&payload).unwrap();

        channel.discard(1300).unwrap();
        let mut buf = [0u8; 4];
        channel.recv_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"next");
    }

    #[test]
    fn test_poll_readiness() {
        let (channel, mut peer) = channel_pair();
        assert_eq!(
            channel.poll_readable(Some(Duration::ZERO)).unwrap(),
            Readiness::Idle
        );

        peer.write_all(b"x").unwrap();
        assert_eq!(
            channel.poll_readable(Some(Duration::from_millis(100))).unwrap(),
            Readiness::Readable
        );

        drop(peer);
        assert_eq!(channel.poll_readable(None).unwrap(), Readiness::HungUp);
    }

    #[test]
    fn test_close_once() {
        let (channel, mut peer) = channel_pair();
        assert!(channel.close());
        assert!(!channel.close());
        assert!(channel.is_closed());

        // Peer observes end of stream
        let mut buf = [0u8; 1];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);

        let err = channel.send_segments(&[b"late"]).unwrap_err();
        assert!(matches!(err, CkptError::Transport { .. }));
    }

    #[test]
    fn test_send_to_closed_peer_is_transport_error() {
        let (channel, peer) = channel_pair();
        drop(peer);

        let err = channel.send_segments(&[&[0u8; 64]]).unwrap_err();
        assert!(matches!(err, CkptError::Transport { .. }));
    }

    #[test]
    fn test_unix_socket_connector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.socket");
        let listener = UnixListener::bind(&path).unwrap();

        let connector = UnixSocketConnector::new(&path);
        assert_eq!(connector.path(), path.as_path());
        let pair = connector.connect("ckpt").unwrap();

        let (mut first, _) = listener.accept().unwrap();
        let (mut second, _) = listener.accept().unwrap();

        (&pair.response).write_all(b"r").unwrap();
        (&pair.dispatch).write_all(b"d").unwrap();
        let mut buf = [0u8; 1];
        first.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"r");
        second.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"d");
    }

    #[test]
    fn test_connector_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let connector = UnixSocketConnector::new(dir.path().join("absent.socket"));
        assert!(connector.connect("ckpt").is_err());
    }
}
