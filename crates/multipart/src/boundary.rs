//! Boundary tokens and the capability used to generate them.
//!
//! A [`Boundary`] is fixed once per composer. Everything derived from it (the
//! `Content-Type` header value, the part delimiters and the closing trailer) is
//! computed from the validated token and never changes afterwards.
//!
//! Token generation is an explicit dependency: callers hand a [`BoundaryGenerator`]
//! to the builder, and the default [`RandomBoundary`] can be driven by any
//! [`RngCore`] so tests get deterministic tokens.

use crate::ensure;
use crate::error::MultipartError;

use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderValue;
use rand::RngCore;
use rand::rngs::ThreadRng;

/// Longest boundary token allowed by RFC 2046
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Number of random bytes behind a generated token, rendered as twice as many hex chars.
///
/// Hex digits are valid boundary characters and need no quoting, so a generated
/// token is always accepted by [`Boundary::new`] as long as it fits the length limit.
const RANDOM_BOUNDARY_BYTES: usize = 30;

const _: () = assert!(RANDOM_BOUNDARY_BYTES * 2 <= MAX_BOUNDARY_LEN);

const CONTENT_TYPE_PREFIX: &str = "multipart/form-data; boundary=";

/// A validated multipart boundary token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    token: String,
    content_type: HeaderValue,
}

impl Boundary {
    /// Validates `token` and derives the `multipart/form-data` content type from it.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::InvalidBoundary`] if:
    /// - the token is empty or longer than [`MAX_BOUNDARY_LEN`]
    /// - the token contains a character outside the RFC 2046 `bchars` set
    /// - the token ends with a space
    pub fn new(token: impl Into<String>) -> Result<Self, MultipartError> {
        let token = token.into();
        ensure!(
            !token.is_empty() && token.len() <= MAX_BOUNDARY_LEN,
            MultipartError::invalid_boundary(format!("length {} is out of range 1..={MAX_BOUNDARY_LEN}", token.len()))
        );

        let last = token.len() - 1;
        for (index, b) in token.bytes().enumerate() {
            ensure!(
                is_boundary_char(b) || (b == b' ' && index != last),
                MultipartError::invalid_boundary(format!("invalid character {:?} at {index}", char::from(b)))
            );
        }

        // RFC 2045 tspecials and space are legal in a boundary but not in a parameter token
        let content_type = if token.contains(['(', ')', ',', '/', ':', '=', '?', ' ']) {
            HeaderValue::from_str(&format!("{CONTENT_TYPE_PREFIX}\"{token}\""))
        } else {
            HeaderValue::from_str(&format!("{CONTENT_TYPE_PREFIX}{token}"))
        }
        .map_err(MultipartError::invalid_boundary)?;

        Ok(Self { token, content_type })
    }

    /// Asks `generator` for a token and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::InvalidBoundary`] if the generated token is invalid
    pub fn generate<G: BoundaryGenerator + ?Sized>(generator: &mut G) -> Result<Self, MultipartError> {
        Self::new(generator.generate())
    }

    /// A fresh token from the thread-local [`RandomBoundary`].
    ///
    /// # Panics
    ///
    /// Never: the hex token of `RANDOM_BOUNDARY_BYTES` is checked against
    /// [`MAX_BOUNDARY_LEN`] at compile time
    pub fn random() -> Self {
        Self::generate(&mut RandomBoundary::new()).expect("hex token within MAX_BOUNDARY_LEN")
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// The `multipart/form-data; boundary=<token>` header value, the token quoted
    /// when it contains a space or a tspecial
    pub fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    /// The closing delimiter `\r\n--<token>--\r\n`
    pub fn trailer(&self) -> Bytes {
        let mut trailer = BytesMut::with_capacity(self.token.len() + 8);
        trailer.put_slice(b"\r\n--");
        trailer.put_slice(self.token.as_bytes());
        trailer.put_slice(b"--\r\n");
        trailer.freeze()
    }
}

impl std::fmt::Display for Boundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token)
    }
}

#[inline]
fn is_boundary_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?')
}

/// A source of boundary tokens.
///
/// Implemented for any `FnMut() -> String`, so a fixed or scripted token can be
/// passed as a closure.
pub trait BoundaryGenerator {
    fn generate(&mut self) -> String;
}

impl<F> BoundaryGenerator for F
where
    F: FnMut() -> String,
{
    fn generate(&mut self) -> String {
        self()
    }
}

/// Default generator: 30 random bytes encoded as 60 lowercase hex characters.
#[derive(Debug, Clone)]
pub struct RandomBoundary<R = ThreadRng> {
    rng: R,
}

impl RandomBoundary {
    /// Creates a generator backed by the thread-local rng
    pub fn new() -> Self {
        Self { rng: rand::thread_rng() }
    }
}

impl Default for RandomBoundary {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore> RandomBoundary<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: RngCore> BoundaryGenerator for RandomBoundary<R> {
    fn generate(&mut self) -> String {
        let mut bytes = [0u8; RANDOM_BOUNDARY_BYTES];
        self.rng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
