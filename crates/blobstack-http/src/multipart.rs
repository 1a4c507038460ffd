//! Multipart form parser for browser uploads.
//!
//! `POST /objects/` carries the blob in a `multipart/form-data` field named
//! `file`. This is a synchronous parser over the already-collected body
//! bytes: it extracts the `file` part's filename and content and ignores any
//! other fields.

use bytes::Bytes;

/// The form field that carries the uploaded blob.
const FILE_FIELD: &str = "file";

/// Errors produced while parsing an upload form.
#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    /// The Content-Type is missing or is not `multipart/form-data`.
    #[error("expected Content-Type multipart/form-data, got '{0}'")]
    NotMultipart(String),

    /// The Content-Type carries no usable boundary parameter.
    #[error("missing or empty boundary in Content-Type")]
    MissingBoundary,

    /// The body has no `file` field.
    #[error("missing 'file' field in multipart form data")]
    MissingFile,

    /// The `file` field has no filename to store the blob under.
    #[error("'file' field carries no filename")]
    MissingFilename,
}

/// The parsed upload: the client-supplied filename and the blob bytes.
#[derive(Debug)]
pub struct UploadForm {
    /// Filename from the `file` part's Content-Disposition.
    pub file_name: String,
    /// The uploaded bytes.
    pub file_data: Bytes,
}

/// Extract the boundary from a `multipart/form-data; boundary=...` header.
pub fn extract_boundary(content_type: &str) -> Result<String, MultipartError> {
    if !content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        return Err(MultipartError::NotMultipart(content_type.to_owned()));
    }

    for part in content_type.split(';') {
        if let Some(val) = part.trim().strip_prefix("boundary=") {
            let boundary = val.trim_matches('"');
            if !boundary.is_empty() {
                return Ok(boundary.to_owned());
            }
        }
    }

    Err(MultipartError::MissingBoundary)
}

/// Parse a multipart body, returning the `file` field's name and bytes.
///
/// # Errors
///
/// Returns [`MultipartError::MissingFile`] when no `file` part exists and
/// [`MultipartError::MissingFilename`] when the part lacks a filename.
pub fn parse_upload(body: &[u8], boundary: &str) -> Result<UploadForm, MultipartError> {
    let delimiter = format!("--{boundary}");
    let end_delimiter = format!("--{boundary}--");

    for part in split_parts(body, delimiter.as_bytes(), end_delimiter.as_bytes()) {
        let Some((headers, content)) = split_headers_body(part) else {
            continue;
        };
        let disposition = parse_content_disposition(headers);
        if disposition.name.as_deref() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = disposition
            .filename
            .filter(|f| !f.is_empty())
            .ok_or(MultipartError::MissingFilename)?;
        return Ok(UploadForm {
            file_name,
            file_data: Bytes::copy_from_slice(content),
        });
    }

    Err(MultipartError::MissingFile)
}

/// Split the body into individual parts by boundary delimiter.
fn split_parts<'a>(
    body: &'a [u8],
    delimiter: &[u8],
    end_delimiter: &[u8],
) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();

    // Skip the preamble before the first delimiter.
    let Some(pos) = find_bytes(body, delimiter) else {
        return parts;
    };
    let mut remaining = skip_crlf(&body[pos + delimiter.len()..]);

    loop {
        if remaining.starts_with(end_delimiter)
            || remaining
                .strip_prefix(b"\r\n")
                .is_some_and(|r| r.starts_with(end_delimiter))
        {
            break;
        }

        if let Some(pos) = find_bytes(remaining, delimiter) {
            parts.push(strip_trailing_crlf(&remaining[..pos]));
            remaining = skip_crlf(&remaining[pos + delimiter.len()..]);
        } else {
            // No closing delimiter; treat the rest as the final part.
            let part = strip_trailing_crlf(remaining);
            if !part.is_empty() {
                parts.push(part);
            }
            break;
        }
    }

    parts
}

/// Split one part into headers and body at the first blank line.
fn split_headers_body(part: &[u8]) -> Option<(&[u8], &[u8])> {
    let separator = b"\r\n\r\n";
    find_bytes(part, separator).map(|pos| (&part[..pos], &part[pos + separator.len()..]))
}

struct ContentDisposition {
    name: Option<String>,
    filename: Option<String>,
}

fn parse_content_disposition(headers: &[u8]) -> ContentDisposition {
    let headers_str = String::from_utf8_lossy(headers);
    let mut name = None;
    let mut filename = None;

    for line in headers_str.split("\r\n") {
        if !line
            .to_ascii_lowercase()
            .starts_with("content-disposition:")
        {
            continue;
        }
        if let Some(n) = extract_quoted_param(line, "name") {
            name = Some(n);
        }
        if let Some(f) = extract_quoted_param(line, "filename") {
            filename = Some(f);
        }
    }

    ContentDisposition { name, filename }
}

/// Extract a `param="value"` (or bare `param=value`) from a header line.
fn extract_quoted_param(header_line: &str, param_name: &str) -> Option<String> {
    let quoted_pattern = format!("{param_name}=\"");
    let unquoted_pattern = format!("{param_name}=");
    let lower_line = header_line.to_ascii_lowercase();

    if let Some(pos) = lower_line.find(&quoted_pattern) {
        let rest = &header_line[pos + quoted_pattern.len()..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_owned());
        }
    }

    if let Some(pos) = lower_line.find(&unquoted_pattern) {
        let rest = &header_line[pos + unquoted_pattern.len()..];
        let end = rest.find(';').unwrap_or(rest.len());
        let val = rest[..end].trim().to_owned();
        if !val.is_empty() {
            return Some(val);
        }
    }

    None
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn skip_crlf(data: &[u8]) -> &[u8] {
    data.strip_prefix(b"\r\n").unwrap_or(data)
}

fn strip_trailing_crlf(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\r\n").unwrap_or(data)
}
