//! Streaming multipart/form-data request bodies
//!
//! This crate assembles a `multipart/form-data` body that carries small metadata
//! fields together with one arbitrarily large payload, typically a file, without
//! ever loading that payload into memory. Peak memory is bounded by the size of
//! the part headers and boundaries.
//!
//! # Example
//!
//! ```no_run
//! use http::{Method, Request};
//! use micro_multipart::MultipartStreamer;
//! use std::io::Read;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut streamer = MultipartStreamer::new();
//! streamer.add_field("title", "nightly backup")?;
//! streamer.add_file("file", "/var/backups/nightly.tar")?;
//!
//! let request = Request::builder().method(Method::POST).uri("http://127.0.0.1:8080/upload").body(())?;
//! let mut request = streamer.prepare_request(request);
//!
//! // hand the request to a transport, which drains the body
//! let mut sink = std::io::sink();
//! std::io::copy(request.body_mut(), &mut sink)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`MultipartStreamer`]: the composer. Fields and parts are framed into an
//!   owned buffer, the large payload is only recorded together with its declared
//!   length
//! - [`MultipartStream`]: the sealed body. A [`std::io::Read`] source that yields
//!   the buffered framing, then the payload, then the closing boundary
//! - [`Boundary`]: the validated boundary token, produced by a [`BoundaryGenerator`]
//!   ([`RandomBoundary`] by default) or supplied explicitly
//!
//! The total body length is known before anything is read:
//! `buffered framing + declared payload length + trailer`.
//!
//! # Limitations
//!
//! - A single deferred payload per body. Registering another one replaces the
//!   previous source
//! - Declared payload lengths are trusted unless [`LengthCheck::Strict`] is set
//! - Composing only, this is not a multipart parser

mod boundary;
mod error;
mod escape;
mod part;
mod stream;
mod streamer;

mod utils;
pub(crate) use utils::ensure;

pub use boundary::{Boundary, BoundaryGenerator, MAX_BOUNDARY_LEN, RandomBoundary};
pub use error::MultipartError;
pub use escape::escape_quotes;
pub use stream::{LengthCheck, MultipartStream};
pub use streamer::{MultipartStreamer, StreamerBuilder};
