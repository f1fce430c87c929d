//! The composed, read-once multipart body.
//!
//! [`MultipartStream`] presents three segments as one sequential [`Read`] source:
//!
//! 1. the frozen header buffer (small parts and the payload part framing)
//! 2. the deferred payload source, if one was registered
//! 3. the closing trailer `\r\n--<boundary>--\r\n`
//!
//! The stream is a small state machine. It only moves to the next segment once
//! the current one is exhausted, and reads against the payload segment are
//! forwarded straight to the payload source without any intermediate copy.
//! The payload source is dropped as soon as it reports end of data, which
//! releases file handles before the trailer is produced.

use bytes::{Buf, Bytes};
use http::HeaderValue;
use std::fmt;
use std::io;
use std::io::Read;
use tracing::{error, trace, warn};

/// How the composed stream treats a payload whose size differs from the declared length.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum LengthCheck {
    /// Emit whatever the source yields and only log a mismatch
    #[default]
    Unchecked,
    /// Fail the read as soon as the source yields more bytes than declared or ends early
    Strict,
}

/// A not yet read payload source together with the length the caller declared for it.
pub(crate) struct DeferredPayload<'a> {
    source: Box<dyn Read + Send + 'a>,
    declared: u64,
    read: u64,
}

impl<'a> DeferredPayload<'a> {
    pub(crate) fn new<R>(source: R, declared: u64) -> Self
    where
        R: Read + Send + 'a,
    {
        Self { source: Box::new(source), declared, read: 0 }
    }

    #[inline]
    pub(crate) fn declared(&self) -> u64 {
        self.declared
    }

    fn read(&mut self, buf: &mut [u8], check: LengthCheck) -> io::Result<usize> {
        let n = self.source.read(buf)?;
        self.read += n as u64;

        if n == 0 && self.read != self.declared {
            if check == LengthCheck::Strict {
                error!(declared = self.declared, read = self.read, "payload ended before its declared length");
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("payload ended after {} of {} declared bytes", self.read, self.declared),
                ));
            }
            warn!(declared = self.declared, read = self.read, "payload length differs from declared length");
        } else if check == LengthCheck::Strict && self.read > self.declared {
            error!(declared = self.declared, read = self.read, "payload exceeds its declared length");
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("payload yields more than {} declared bytes", self.declared),
            ));
        }

        Ok(n)
    }
}

impl fmt::Debug for DeferredPayload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredPayload").field("declared", &self.declared).field("read", &self.read).finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum State<'a> {
    Header { header: Bytes, payload: Option<DeferredPayload<'a>>, trailer: Bytes },
    Payload { payload: DeferredPayload<'a>, trailer: Bytes },
    Trailer(Bytes),
    Done,
}

/// The composed multipart body, readable exactly once.
///
/// `'a` is the lifetime of the payload source, `'static` for owned sources such
/// as a [`File`](std::fs::File) opened by the composer.
///
/// Obtained from [`MultipartStreamer::into_stream`](crate::MultipartStreamer::into_stream)
/// or [`MultipartStreamer::prepare_request`](crate::MultipartStreamer::prepare_request).
#[derive(Debug)]
pub struct MultipartStream<'a> {
    state: State<'a>,
    content_type: HeaderValue,
    content_length: u64,
    check: LengthCheck,
}

impl<'a> MultipartStream<'a> {
    pub(crate) fn new(
        header: Bytes,
        payload: Option<DeferredPayload<'a>>,
        trailer: Bytes,
        content_type: HeaderValue,
        check: LengthCheck,
    ) -> Self {
        let content_length = total_length(header.len(), payload.as_ref().map_or(0, DeferredPayload::declared), trailer.len());
        Self { state: State::Header { header, payload, trailer }, content_type, content_length, check }
    }

    /// The `multipart/form-data; boundary=<token>` header value of this body
    pub fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    /// Total declared size of the body in bytes
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Returns true once every segment has been drained
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Done)
    }

    fn advance(&mut self) {
        self.state = match std::mem::replace(&mut self.state, State::Done) {
            State::Header { payload: Some(payload), trailer, .. } => {
                trace!(declared = payload.declared(), "header segment drained, reading payload");
                State::Payload { payload, trailer }
            }
            State::Header { payload: None, trailer, .. } => {
                trace!("header segment drained, no payload registered");
                State::Trailer(trailer)
            }
            State::Payload { payload, trailer } => {
                trace!(read = payload.read, "payload drained, releasing source");
                drop(payload);
                State::Trailer(trailer)
            }
            State::Trailer(_) | State::Done => State::Done,
        };
    }
}

impl Read for MultipartStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match &mut self.state {
                State::Header { header, .. } if header.has_remaining() => return Ok(copy_segment(header, buf)),
                State::Payload { payload, .. } => {
                    let n = payload.read(buf, self.check)?;
                    if n > 0 {
                        return Ok(n);
                    }
                    self.advance();
                }
                State::Trailer(trailer) if trailer.has_remaining() => return Ok(copy_segment(trailer, buf)),
                State::Done => return Ok(0),
                State::Header { .. } | State::Trailer(_) => self.advance(),
            }
        }
    }
}

/// `header + payload + trailer`, never touching the payload itself
#[inline]
pub(crate) fn total_length(header: usize, payload: u64, trailer: usize) -> u64 {
    header as u64 + payload + trailer as u64
}

fn copy_segment(segment: &mut Bytes, buf: &mut [u8]) -> usize {
    let n = segment.remaining().min(buf.len());
    segment.copy_to_slice(&mut buf[..n]);
    n
}
