// rust/ckpt-client/src/gateway.rs

//! Synchronous request/response exchanges on a response channel.
//!
//! An [`Exchange`] holds the channel's exchange lock from the first byte of
//! the request until the last byte of the reply, so frames of unrelated
//! callers sharing the channel never interleave. Callers additionally hold
//! their instance mutex around the exchange.

use std::sync::MutexGuard;

use crate::error::{CkptError, Result, Status};
use crate::protocol::{
    encode_request, Request, ResponseHeader, WireBody, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
use crate::transport::Channel;

/// A decoded reply: header status, fixed body and unread trailing bytes.
#[derive(Debug)]
pub(crate) struct Reply<B> {
    pub status: Status,
    pub body: B,
    pub trailing: usize,
}

pub(crate) struct Exchange<'a> {
    channel: &'a Channel,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> Exchange<'a> {
    pub fn begin(channel: &'a Channel) -> Self {
        Self {
            _guard: channel.lock_exchange(),
            channel,
        }
    }

    /// Sends the header and fixed body of `request` followed by `segments`.
    pub fn send<R: Request>(&self, request: &R, segments: &[&[u8]]) -> Result<()> {
        let trailing: usize = segments.iter().map(|segment| segment.len()).sum();
        let frame = encode_request(request, trailing)?;

        let mut all = Vec::with_capacity(segments.len() + 1);
        all.push(&frame[..]);
        all.extend_from_slice(segments);

        tracing::debug!(
            kind = ?R::KIND,
            size = REQUEST_HEADER_SIZE + R::SIZE + trailing,
            "sending request"
        );
        self.channel.send_segments(&all)
    }

    /// Receives the reply to `R`, leaving any trailing segment unread.
    pub fn receive<R: Request>(&self) -> Result<Reply<R::Reply>> {
        let mut raw = [0u8; RESPONSE_HEADER_SIZE];
        self.channel.recv_exact(&mut raw)?;
        let header = ResponseHeader::from_bytes(&raw);
        let body_len = header.body_len()?;

        if header.kind != R::KIND.to_u32() {
            self.channel.discard(body_len)?;
            return Err(CkptError::protocol(format!(
                "expected reply to {:?}, got message kind {}",
                R::KIND,
                header.kind
            )));
        }
        if body_len < R::Reply::SIZE {
            self.channel.discard(body_len)?;
            return Err(CkptError::protocol(format!(
                "reply to {:?} carries {body_len} body bytes, expected at least {}",
                R::KIND,
                R::Reply::SIZE
            )));
        }

        let mut fixed = vec![0u8; R::Reply::SIZE];
        self.channel.recv_exact(&mut fixed)?;
        let trailing = body_len - R::Reply::SIZE;
        let body = match R::Reply::decode(&fixed) {
            Ok(body) => body,
            Err(e) => {
                self.channel.discard(trailing)?;
                return Err(e);
            }
        };

        tracing::debug!(kind = ?R::KIND, status = %header.status, trailing, "received reply");
        Ok(Reply {
            status: header.status,
            body,
            trailing,
        })
    }

    pub fn read_trailing(&self, buf: &mut [u8]) -> Result<()> {
        self.channel.recv_exact(buf)
    }

    pub fn discard(&self, len: usize) -> Result<()> {
        self.channel.discard(len)
    }
}

/// One complete exchange. Trailing reply bytes are consumed and dropped.
pub(crate) fn call<R: Request>(
    channel: &Channel,
    request: &R,
    segments: &[&[u8]],
) -> Result<Reply<R::Reply>> {
    let exchange = Exchange::begin(channel);
    exchange.send(request, segments)?;
    let reply = exchange.receive::<R>()?;
    exchange.discard(reply.trailing)?;
    Ok(Reply {
        trailing: 0,
        ..reply
    })
}

/// Exchange whose only interesting result is the reply status.
pub(crate) fn call_status<R: Request>(
    channel: &Channel,
    request: &R,
    segments: &[&[u8]],
    operation: &'static str,
) -> Result<()> {
    call(channel, request, segments)?.status.into_result(operation)
}

/// Sends a request that is answered on the dispatch channel, if at all.
pub(crate) fn send_only<R: Request>(channel: &Channel, request: &R) -> Result<()> {
    Exchange::begin(channel).send(request, &[])
}
