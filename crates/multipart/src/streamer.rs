use crate::boundary::{Boundary, BoundaryGenerator, RandomBoundary};
use crate::error::MultipartError;
use crate::part::PartWriter;
use crate::stream::{DeferredPayload, LengthCheck, MultipartStream, total_length};

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Request};
use mime::Mime;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Builds a multipart/form-data body whose single large payload is read lazily.
///
/// Small fields and parts are framed into an in-memory buffer as they are added.
/// The large payload is only recorded: its source is not touched until the
/// [`MultipartStream`] returned by [`into_stream`](Self::into_stream) is drained.
/// This keeps memory bounded by the framing, not by the payload.
///
/// # Example
///
/// ```
/// use micro_multipart::MultipartStreamer;
/// use std::io::Read;
///
/// let mut streamer = MultipartStreamer::with_boundary("X").unwrap();
/// streamer.add_field("parameters", r#"{"x":1}"#).unwrap();
/// streamer.add_deferred_payload("file", "file", 5, &b"hello"[..], &http::HeaderMap::new()).unwrap();
///
/// let length = streamer.content_length();
/// let mut body = Vec::new();
/// streamer.into_stream().read_to_end(&mut body).unwrap();
/// assert_eq!(body.len() as u64, length);
/// ```
///
/// Only one deferred payload slot exists. Registering a second payload replaces
/// the source of the first, while both part headers stay in the body.
///
/// The declared payload length is trusted. A source yielding a different number
/// of bytes produces a body that disagrees with its `Content-Length`, unless
/// [`LengthCheck::Strict`] is configured through the [`StreamerBuilder`].
#[derive(Debug)]
pub struct MultipartStreamer<'a> {
    writer: PartWriter,
    trailer: Bytes,
    payload: Option<DeferredPayload<'a>>,
    length_check: LengthCheck,
}

impl<'a> MultipartStreamer<'a> {
    /// Creates a streamer with a random boundary, see [`RandomBoundary`]
    pub fn new() -> Self {
        Self::from_boundary(Boundary::random())
    }

    /// Creates a streamer using `token` as boundary.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::InvalidBoundary`] if `token` is not a valid boundary
    pub fn with_boundary(token: impl Into<String>) -> Result<Self, MultipartError> {
        Self::builder().boundary(token).build()
    }

    pub fn from_boundary(boundary: Boundary) -> Self {
        let trailer = boundary.trailer();
        Self { writer: PartWriter::new(boundary), trailer, payload: None, length_check: LengthCheck::default() }
    }

    pub fn builder() -> StreamerBuilder {
        StreamerBuilder::new()
    }

    pub fn boundary(&self) -> &Boundary {
        self.writer.boundary()
    }

    /// The `multipart/form-data; boundary=<token>` header value
    pub fn content_type(&self) -> &HeaderValue {
        self.writer.boundary().content_type()
    }

    /// Adds a small form field. `value` is written as is, without escaping.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::Io`] if the buffer write fails
    pub fn add_field(&mut self, name: &str, value: impl AsRef<[u8]>) -> Result<(), MultipartError> {
        let value = value.as_ref();
        self.writer.write_field(name, value)?;
        debug!(name, size = value.len(), "added form field");
        Ok(())
    }

    /// Adds every `(name, value)` pair as a form field, in iteration order.
    ///
    /// Pass an ordered collection (a `Vec` or `BTreeMap`) when the wire order matters.
    ///
    /// # Errors
    ///
    /// Stops at the first field that fails, see [`add_field`](Self::add_field)
    pub fn add_fields<I, K, V>(&mut self, fields: I) -> Result<(), MultipartError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        for (name, value) in fields {
            self.add_field(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Adds a small part, copying all of `reader` into the buffer right away.
    ///
    /// `headers` are written after the generated `Content-Disposition`, which they
    /// may replace. Never use this for the large payload, see
    /// [`add_deferred_payload`](Self::add_deferred_payload).
    ///
    /// Returns the number of body bytes copied.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::Io`] if reading from `reader` fails, in which case
    /// the part is not added
    pub fn add_part<R: Read>(&mut self, name: &str, mut reader: R, headers: &HeaderMap) -> Result<u64, MultipartError> {
        let size = self.writer.write_part(name, &mut reader, headers)?;
        debug!(name, size, "added multipart part");
        Ok(size)
    }

    /// Registers the large payload without reading from `source`.
    ///
    /// Only the part framing is buffered. `length` must be the exact number of
    /// bytes `source` will yield.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::Io`] if the buffer write fails
    pub fn add_deferred_payload<R>(
        &mut self,
        name: &str,
        filename: &str,
        length: u64,
        source: R,
        headers: &HeaderMap,
    ) -> Result<(), MultipartError>
    where
        R: Read + Send + 'a,
    {
        self.writer.write_file_header(name, filename, headers)?;

        if let Some(previous) = self.payload.replace(DeferredPayload::new(source, length)) {
            warn!(name, previous = previous.declared(), "replacing previously registered payload");
        }
        debug!(name, filename, length, "registered deferred payload");
        Ok(())
    }

    /// Registers the large payload as `application/octet-stream`.
    ///
    /// # Errors
    ///
    /// See [`add_deferred_payload`](Self::add_deferred_payload)
    pub fn add_reader<R>(&mut self, name: &str, filename: &str, length: u64, source: R) -> Result<(), MultipartError>
    where
        R: Read + Send + 'a,
    {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, octet_stream());
        self.add_deferred_payload(name, filename, length, source, &headers)
    }

    /// Registers the large payload as `application/octet-stream` and announces its
    /// size with a part level `Content-Length` header.
    ///
    /// # Errors
    ///
    /// See [`add_deferred_payload`](Self::add_deferred_payload)
    pub fn add_reader_with_size<R>(&mut self, name: &str, filename: &str, length: u64, source: R) -> Result<(), MultipartError>
    where
        R: Read + Send + 'a,
    {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, octet_stream());
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        self.add_deferred_payload(name, filename, length, source, &headers)
    }

    /// Opens the file at `path` and registers it as the deferred payload, named
    /// after the last component of `path`.
    ///
    /// The file handle is owned by the composed stream and closed once the
    /// payload is drained or the stream is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::Io`] if the file cannot be opened or its size
    /// cannot be read
    pub fn add_file(&mut self, name: &str, path: impl AsRef<Path>) -> Result<(), MultipartError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let length = file.metadata()?.len();

        let filename = path.file_name().unwrap_or(path.as_os_str()).to_string_lossy();
        self.add_reader(name, &filename, length, file)
    }

    /// Total length of the body: buffered framing, declared payload length and trailer.
    ///
    /// Never touches the payload source.
    pub fn content_length(&self) -> u64 {
        total_length(self.writer.buffered(), self.payload.as_ref().map_or(0, DeferredPayload::declared), self.trailer.len())
    }

    /// Seals the body and returns the composed read-once stream
    pub fn into_stream(self) -> MultipartStream<'a> {
        let content_type = self.content_type().clone();
        let stream = MultipartStream::new(self.writer.freeze(), self.payload, self.trailer, content_type, self.length_check);
        debug!(content_length = stream.content_length(), "sealed multipart body");
        stream
    }

    /// Attaches the composed stream to `request` and sets its `Content-Type` and
    /// `Content-Length` headers. The previous body of `request` is dropped.
    pub fn prepare_request<B>(self, request: Request<B>) -> Request<MultipartStream<'a>> {
        let stream = self.into_stream();
        let (mut parts, _body) = request.into_parts();
        parts.headers.insert(CONTENT_TYPE, stream.content_type().clone());
        parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(stream.content_length()));
        Request::from_parts(parts, stream)
    }
}

impl Default for MultipartStreamer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

static OCTET_STREAM: Mime = mime::APPLICATION_OCTET_STREAM;

#[inline]
fn octet_stream() -> HeaderValue {
    HeaderValue::from_static(OCTET_STREAM.as_ref())
}

/// Construction time configuration of a [`MultipartStreamer`].
///
/// An explicit [`boundary`](Self::boundary) takes precedence over a
/// [`boundary_generator`](Self::boundary_generator). Without either, a
/// [`RandomBoundary`] is used.
pub struct StreamerBuilder {
    boundary: Option<String>,
    generator: Option<Box<dyn BoundaryGenerator>>,
    length_check: LengthCheck,
}

impl StreamerBuilder {
    fn new() -> Self {
        Self { boundary: None, generator: None, length_check: LengthCheck::default() }
    }

    pub fn boundary(mut self, token: impl Into<String>) -> Self {
        self.boundary = Some(token.into());
        self
    }

    pub fn boundary_generator<G>(mut self, generator: G) -> Self
    where
        G: BoundaryGenerator + 'static,
    {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn length_check(mut self, length_check: LengthCheck) -> Self {
        self.length_check = length_check;
        self
    }

    /// # Errors
    ///
    /// Returns [`MultipartError::InvalidBoundary`] if the configured or generated
    /// boundary is invalid
    pub fn build<'a>(self) -> Result<MultipartStreamer<'a>, MultipartError> {
        let boundary = match (self.boundary, self.generator) {
            (Some(token), _) => Boundary::new(token)?,
            (None, Some(mut generator)) => Boundary::generate(generator.as_mut())?,
            (None, None) => Boundary::generate(&mut RandomBoundary::new())?,
        };

        let mut streamer = MultipartStreamer::from_boundary(boundary);
        streamer.length_check = self.length_check;
        Ok(streamer)
    }
}

impl fmt::Debug for StreamerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamerBuilder")
            .field("boundary", &self.boundary)
            .field("generator", &self.generator.is_some())
            .field("length_check", &self.length_check)
            .finish()
    }
}
