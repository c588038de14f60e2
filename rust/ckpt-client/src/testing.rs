// rust/ckpt-client/src/testing.rs

//! In-process fake checkpoint service used by the unit tests.
//!
//! Every `connect` hands out a fresh pair of socket pairs. A server thread
//! reads request frames from the response channel, records them, and asks a
//! handler closure for the reply. The server end of each dispatch channel is
//! kept so tests can push notifications.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::config::ClientConfig;
use crate::error::Status;
use crate::handle::lock;
use crate::protocol::{
    encode_response, Ack, MessageKind, OpenCompletedNotification, RequestHeader,
    SectionDescriptorReply, SectionReadReply, WireBody, REQUEST_HEADER_SIZE,
};
use crate::transport::{ChannelPair, ServiceConnector};
use crate::types::CheckpointDescriptor;

/// One request frame as the server saw it.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub kind: MessageKind,
    pub size: u32,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn decode<B: WireBody>(&self) -> B {
        B::decode(&self.body).unwrap()
    }

    /// Bytes after the fixed body of `B`.
    pub fn trailing<B: WireBody>(&self) -> &[u8] {
        &self.body[B::SIZE..]
    }
}

type Handler = Box<dyn FnMut(&RecordedRequest) -> Option<BytesMut> + Send>;

pub(crate) struct FakeService {
    handler: Arc<Mutex<Handler>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    dispatch_peers: Mutex<Vec<UnixStream>>,
    eofs: Arc<AtomicUsize>,
    refuse: AtomicBool,
}

impl FakeService {
    /// A service answering every request with `handler`.
    pub fn new(
        handler: impl FnMut(&RecordedRequest) -> Option<BytesMut> + Send + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Arc::new(Mutex::new(Box::new(handler))),
            requests: Arc::new(Mutex::new(Vec::new())),
            dispatch_peers: Mutex::new(Vec::new()),
            eofs: Arc::new(AtomicUsize::new(0)),
            refuse: AtomicBool::new(false),
        })
    }

    /// A service that accepts everything.
    pub fn accepting() -> Arc<Self> {
        Self::new(default_reply)
    }

    /// Makes further `connect` calls fail.
    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn kinds(&self) -> Vec<MessageKind> {
        lock(&self.requests).iter().map(|r| r.kind).collect()
    }

    /// Waits until at least `count` requests were recorded.
    pub fn wait_for_requests(&self, count: usize) -> Vec<RecordedRequest> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let requests = self.requests();
            if requests.len() >= count {
                return requests;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {count} requests");
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Waits until `count` response channels were closed by the client.
    pub fn wait_for_eofs(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.eofs.load(Ordering::SeqCst) < count {
            assert!(Instant::now() < deadline, "timed out waiting for {count} EOFs");
            thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn eofs(&self) -> usize {
        self.eofs.load(Ordering::SeqCst)
    }

    /// Writes `frame` to the dispatch channel of the most recent connection.
    pub fn notify(&self, frame: &[u8]) {
        let peers = lock(&self.dispatch_peers);
        let mut peer = peers.last().expect("no connection to notify");
        peer.write_all(frame).unwrap();
    }

    /// Closes the server end of every dispatch channel.
    pub fn hang_up_dispatch(&self) {
        lock(&self.dispatch_peers).clear();
    }

    fn serve(&self, mut stream: UnixStream) {
        let handler = Arc::clone(&self.handler);
        let requests = Arc::clone(&self.requests);
        let eofs = Arc::clone(&self.eofs);

        thread::spawn(move || loop {
            let mut raw = [0u8; REQUEST_HEADER_SIZE];
            if stream.read_exact(&mut raw).is_err() {
                eofs.fetch_add(1, Ordering::SeqCst);
                return;
            }
            let header = RequestHeader::from_bytes(&raw);
            let mut body = vec![0u8; header.size as usize - REQUEST_HEADER_SIZE];
            if stream.read_exact(&mut body).is_err() {
                eofs.fetch_add(1, Ordering::SeqCst);
                return;
            }

            let request = RecordedRequest {
                kind: MessageKind::from_u32(header.kind).expect("unknown request kind"),
                size: header.size,
                body,
            };
            let reply = {
                let mut handler = lock(&handler);
                (*handler)(&request)
            };
            lock(&requests).push(request);

            if let Some(frame) = reply {
                if stream.write_all(&frame).is_err() {
                    return;
                }
            }
        });
    }
}

impl ServiceConnector for FakeService {
    fn connect(&self, _service_name: &str) -> io::Result<ChannelPair> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "service refused connection",
            ));
        }

        let (response, response_peer) = UnixStream::pair()?;
        let (dispatch, dispatch_peer) = UnixStream::pair()?;
        self.serve(response_peer);
        lock(&self.dispatch_peers).push(dispatch_peer);
        Ok(ChannelPair { response, dispatch })
    }
}

/// Reply with `status` and an empty body.
pub(crate) fn status_reply(kind: MessageKind, status: Status) -> BytesMut {
    encode_response(kind.to_u32(), status, &Ack, &[])
}

/// The reply a well-behaved service gives to `request`.
pub(crate) fn default_reply(request: &RecordedRequest) -> Option<BytesMut> {
    let kind = request.kind.to_u32();
    Some(match request.kind {
        MessageKind::OpenAsync => return None,
        MessageKind::StatusGet => {
            encode_response(kind, Status::Ok, &CheckpointDescriptor::default(), &[])
        }
        MessageKind::SectionRead => {
            encode_response(kind, Status::Ok, &SectionReadReply::default(), &[])
        }
        MessageKind::IterationNext => encode_response(
            kind,
            Status::NoSections,
            &SectionDescriptorReply::default(),
            &[],
        ),
        other => status_reply(other, Status::Ok),
    })
}

/// Frame of an open-completed notification.
pub(crate) fn open_completed(invocation: u64, checkpoint_handle: u64, status: Status) -> BytesMut {
    encode_response(
        MessageKind::OpenAsync.to_u32(),
        status,
        &OpenCompletedNotification {
            invocation,
            checkpoint_handle,
        },
        &[],
    )
}

/// Defaults with retries disabled so broken channels fail fast.
pub(crate) fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.transport.max_retries = 0;
    config
}
