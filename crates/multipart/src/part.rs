//! Header/boundary buffer for multipart framing
//!
//! [`PartWriter`] owns the in-memory buffer that holds every small part plus the
//! opening framing of the deferred payload part. It only ever appends, and it is
//! turned into an immutable [`Bytes`] segment when the body is sealed for reading.
//!
//! # Wire format
//!
//! Each part is written as:
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="<name>"[; filename="<filename>"]\r\n
//! <Header>: <value>\r\n
//! \r\n
//! <body>
//! ```
//!
//! Every part after the first is preceded by `\r\n`, which terminates the body of
//! the previous one. The closing trailer supplies the final `\r\n`.

use crate::boundary::Boundary;
use crate::escape::escape_quotes;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::CONTENT_DISPOSITION;
use http::{HeaderMap, HeaderName};
use std::io;
use std::io::{Read, Write};
use tracing::trace;

/// Initial buffer size, enough for a handful of small fields
const INIT_BUFFER_SIZE: usize = 512;

/// Append-only writer for multipart part headers and small part bodies.
#[derive(Debug)]
pub struct PartWriter {
    boundary: Boundary,
    buf: BytesMut,
    has_parts: bool,
}

impl PartWriter {
    pub fn new(boundary: Boundary) -> Self {
        Self { boundary, buf: BytesMut::with_capacity(INIT_BUFFER_SIZE), has_parts: false }
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Number of bytes buffered so far
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Writes a complete form field: framing followed by the raw `value`.
    ///
    /// # Errors
    ///
    /// Only fails if the underlying buffer write fails
    pub fn write_field(&mut self, name: &str, value: &[u8]) -> io::Result<()> {
        self.create_part(name, None, &HeaderMap::new())?;
        self.buf.put_slice(value);
        Ok(())
    }

    /// Writes a complete part, copying all of `reader` into the buffer.
    ///
    /// On failure the buffer is restored to its state before the call, so a
    /// half-written part never ends up in the body.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `reader`
    pub fn write_part<R: Read + ?Sized>(&mut self, name: &str, reader: &mut R, headers: &HeaderMap) -> io::Result<u64> {
        let mark = (self.buf.len(), self.has_parts);

        let result = self.create_part(name, None, headers).and_then(|()| io::copy(reader, &mut (&mut self.buf).writer()));
        if result.is_err() {
            self.buf.truncate(mark.0);
            self.has_parts = mark.1;
        }
        result
    }

    /// Writes only the framing of a file part. The caller is responsible for
    /// producing the body bytes after this buffer.
    ///
    /// # Errors
    ///
    /// Only fails if the underlying buffer write fails
    pub fn write_file_header(&mut self, name: &str, filename: &str, headers: &HeaderMap) -> io::Result<()> {
        self.create_part(name, Some(filename), headers)
    }

    /// Freezes the buffer into the header segment of the body
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    fn create_part(&mut self, name: &str, filename: Option<&str>, headers: &HeaderMap) -> io::Result<()> {
        if self.has_parts {
            self.buf.put_slice(b"\r\n");
        }
        self.buf.put_slice(b"--");
        self.buf.put_slice(self.boundary.as_str().as_bytes());
        self.buf.put_slice(b"\r\n");
        self.has_parts = true;

        // an explicit Content-Disposition replaces the generated one
        if headers.contains_key(CONTENT_DISPOSITION) {
            self.write_header_values(&CONTENT_DISPOSITION, headers);
        } else {
            let mut writer = (&mut self.buf).writer();
            write!(writer, "Content-Disposition: form-data; name=\"{}\"", escape_quotes(name))?;
            if let Some(filename) = filename {
                write!(writer, "; filename=\"{}\"", escape_quotes(filename))?;
            }
            writer.write_all(b"\r\n")?;
        }

        let mut names: Vec<&HeaderName> = headers.keys().filter(|name| **name != CONTENT_DISPOSITION).collect();
        names.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
        for header_name in names {
            self.write_header_values(header_name, headers);
        }
        self.buf.put_slice(b"\r\n");

        trace!(name, filename, buffered = self.buf.len(), "created multipart part");
        Ok(())
    }

    fn write_header_values(&mut self, header_name: &HeaderName, headers: &HeaderMap) {
        for header_value in headers.get_all(header_name) {
            put_canonical_name(&mut self.buf, header_name);
            self.buf.put_slice(b": ");
            self.buf.put_slice(header_value.as_bytes());
            self.buf.put_slice(b"\r\n");
        }
    }
}

/// Writes `name` in canonical MIME form, `content-type` becomes `Content-Type`.
fn put_canonical_name(dst: &mut BytesMut, name: &HeaderName) {
    let mut upper = true;
    for &b in name.as_str().as_bytes() {
        dst.put_u8(if upper { b.to_ascii_uppercase() } else { b });
        upper = b == b'-';
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
    use indoc::indoc;

    fn writer() -> PartWriter {
        PartWriter::new(Boundary::new("X").unwrap())
    }

    fn crlf(s: &str) -> String {
        s.replace('\n', "\r\n")
    }

    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("source broken"));
            }
            let n = self.remaining.min(buf.len());
            buf[..n].fill(b'z');
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn canonical_names() {
        let mut dst = BytesMut::new();
        put_canonical_name(&mut dst, &CONTENT_TYPE);
        dst.put_slice(b" ");
        put_canonical_name(&mut dst, &HeaderName::from_static("x-request-id"));
        assert_eq!(&dst[..], b"Content-Type X-Request-Id");
    }

    #[test]
    fn fields_are_separated_by_crlf() {
        let mut writer = writer();
        writer.write_field("a", b"1").unwrap();
        writer.write_field("b", b"2").unwrap();

        let expected = crlf(indoc! {r#"
            --X
            Content-Disposition: form-data; name="a"

            1
            --X
            Content-Disposition: form-data; name="b"

            2"#});
        assert_eq!(writer.buffered(), expected.len());
        assert_eq!(&writer.freeze()[..], expected.as_bytes());
    }

    #[test]
    fn part_headers_are_sorted_after_disposition() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xxx+json"));
        headers.insert("x-trace", HeaderValue::from_static("1"));
        headers.append("x-trace", HeaderValue::from_static("2"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(7u64));

        let mut writer = writer();
        let copied = writer.write_part("parameters", &mut &b"{\"x\":1}"[..], &headers).unwrap();
        assert_eq!(copied, 7);

        let expected = crlf(indoc! {r#"
            --X
            Content-Disposition: form-data; name="parameters"
            Content-Length: 7
            Content-Type: application/xxx+json
            X-Trace: 1
            X-Trace: 2

            {"x":1}"#});
        assert_eq!(&writer.freeze()[..], expected.as_bytes());
    }

    #[test]
    fn explicit_disposition_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static("form-data; name=\"custom\""));

        let mut writer = writer();
        writer.write_file_header("ignored", "ignored.bin", &headers).unwrap();
        assert_eq!(&writer.freeze()[..], b"--X\r\nContent-Disposition: form-data; name=\"custom\"\r\n\r\n");
    }

    #[test]
    fn file_header_escapes_name_and_filename() {
        let mut writer = writer();
        writer.write_file_header(r#"fi"eld"#, r"C:\tmp\a.txt", &HeaderMap::new()).unwrap();
        let expected = crlf(indoc! {r#"
            --X
            Content-Disposition: form-data; name="fi\"eld"; filename="C:\\tmp\\a.txt"

            "#});
        assert_eq!(&writer.freeze()[..], expected.as_bytes());
    }

    #[test]
    fn failed_part_is_rolled_back() {
        let mut writer = writer();
        writer.write_field("a", b"1").unwrap();
        let before = writer.buffered();

        let result = writer.write_part("broken", &mut FailingReader { remaining: 3 * 1024 }, &HeaderMap::new());
        assert!(result.is_err());
        assert_eq!(writer.buffered(), before);

        writer.write_field("b", b"2").unwrap();
        assert!(writer.freeze().ends_with(b"1\r\n--X\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\n2"));
    }

    #[test]
    fn failed_first_part_keeps_opening_delimiter() {
        let mut writer = writer();
        assert!(writer.write_part("broken", &mut FailingReader { remaining: 0 }, &HeaderMap::new()).is_err());
        assert_eq!(writer.buffered(), 0);

        writer.write_field("a", b"1").unwrap();
        assert!(writer.freeze().starts_with(b"--X\r\n"));
    }
}
