use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::MultipartError;
use crate::field::Field;

/// Ceiling on buffered multipart bytes before the request is failed.
pub const DEFAULT_MAX_COLLECTED_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    LookingForBoundary,
    ProcessingHeaders,
    ProcessingContent,
}

/// Incremental `multipart/form-data` parser.
///
/// Feed body chunks through [`Parser::accept_data`] as they arrive; fields
/// become available through [`Parser::field`] as soon as their closing
/// boundary has been seen.
#[derive(Debug)]
pub struct Parser {
    boundary: Vec<u8>,
    state: State,
    buffer: Vec<u8>,
    fields: HashMap<String, Field>,
    current: Option<String>,
    previous_value: Option<String>,
    temp_dir: PathBuf,
    max_collected: usize,
    failed: bool,
}

impl Parser {
    /// Creates a parser for a body described by the given `Content-Type`
    /// header value, spooling file parts under `temp_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::MissingBoundary`] when the header carries
    /// no `boundary=` token.
    pub fn new(
        content_type: &str,
        temp_dir: impl Into<PathBuf>,
    ) -> Result<Self, MultipartError> {
        let token = content_type
            .split("boundary=")
            .nth(1)
            .map(|rest| rest.trim().trim_matches('"').trim_end_matches(';'))
            .filter(|token| !token.is_empty())
            .ok_or_else(|| MultipartError::MissingBoundary(content_type.to_string()))?;

        let mut boundary = Vec::with_capacity(token.len() + 2);
        boundary.extend_from_slice(b"--");
        boundary.extend_from_slice(token.as_bytes());

        Ok(Self {
            boundary,
            state: State::LookingForBoundary,
            buffer: Vec::new(),
            fields: HashMap::new(),
            current: None,
            previous_value: None,
            temp_dir: temp_dir.into(),
            max_collected: DEFAULT_MAX_COLLECTED_BYTES,
            failed: false,
        })
    }

    /// Overrides the buffered-bytes ceiling.
    pub fn set_max_collected_bytes(&mut self, max: usize) {
        self.max_collected = max;
    }

    /// Feeds one chunk of body bytes to the state machine.
    ///
    /// # Errors
    ///
    /// Fails when the buffer ceiling is exceeded, a part's headers are
    /// malformed, or a spool file cannot be written. After a failure the
    /// parser discards all state, removing any spooled files.
    pub fn accept_data(&mut self, data: &[u8]) -> Result<(), MultipartError> {
        if self.failed {
            return Ok(());
        }
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > self.max_collected {
            self.fail();
            return Err(MultipartError::TooLarge {
                limit: self.max_collected,
            });
        }
        if let Err(err) = self.process() {
            self.fail();
            return Err(err);
        }
        Ok(())
    }

    /// Looks up a completed field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Names of all completed fields, including any `name[]` history
    /// entries.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// All completed fields.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    fn fail(&mut self) {
        // Dropping file fields removes their spool files.
        self.failed = true;
        self.current = None;
        self.previous_value = None;
        self.fields.clear();
        self.buffer.clear();
    }

    fn process(&mut self) -> Result<(), MultipartError> {
        loop {
            let advanced = match self.state {
                State::LookingForBoundary => self.skip_to_boundary(),
                State::ProcessingHeaders => self.parse_part_headers()?,
                State::ProcessingContent => self.drain_part_content()?,
            };
            if !advanced {
                return Ok(());
            }
        }
    }

    /// Drops bytes until the boundary marker has been consumed.
    fn skip_to_boundary(&mut self) -> bool {
        match find(&self.buffer, &self.boundary) {
            Some(pos) => {
                self.buffer.drain(..pos + self.boundary.len());
                self.state = State::ProcessingHeaders;
                true
            }
            None => {
                // Keep a tail that could hold a split boundary prefix.
                let keep = self.boundary.len().saturating_sub(1);
                if self.buffer.len() > keep {
                    self.buffer.drain(..self.buffer.len() - keep);
                }
                false
            }
        }
    }

    /// Waits for the CRLF CRLF terminator, then parses the part headers.
    fn parse_part_headers(&mut self) -> Result<bool, MultipartError> {
        let Some(end) = find(&self.buffer, b"\r\n\r\n") else {
            return Ok(false);
        };
        let headers = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
        self.buffer.drain(..end + 4);
        self.open_field(&headers)?;
        self.state = State::ProcessingContent;
        Ok(true)
    }

    fn open_field(&mut self, headers: &str) -> Result<(), MultipartError> {
        if !headers.contains("Content-Disposition: form-data") {
            return Err(MultipartError::MalformedHeaders(headers.to_string()));
        }
        let name = quoted_attribute(headers, "name=\"")
            .ok_or_else(|| MultipartError::MalformedHeaders(headers.to_string()))?;

        // Remember the prior text value so a repeated field name can extend
        // the `name[]` history once this part completes.
        self.previous_value = self
            .fields
            .get(&name)
            .and_then(|field| field.text())
            .map(str::to_string);

        let field = match quoted_attribute(headers, "filename=\"") {
            Some(filename) => {
                let mut field = Field::file_field(name.clone(), filename, &self.temp_dir)?;
                if let Some(content_type) = part_content_type(headers) {
                    field.set_content_type(content_type);
                }
                field
            }
            None => Field::text_field(name.clone()),
        };
        self.fields.insert(name.clone(), field);
        self.current = Some(name);
        Ok(())
    }

    /// Streams part content into the current field, holding back enough
    /// bytes to recognise the CRLF that precedes the next boundary.
    fn drain_part_content(&mut self) -> Result<bool, MultipartError> {
        let boundary_pos = find(&self.buffer, &self.boundary);
        let send_len = match boundary_pos {
            Some(pos) => pos.saturating_sub(2),
            None => self
                .buffer
                .len()
                .saturating_sub(self.boundary.len() + 2),
        };

        if send_len > 0 {
            if let Some(name) = self.current.clone() {
                if let Some(field) = self.fields.get_mut(&name) {
                    let chunk: Vec<u8> = self.buffer.drain(..send_len).collect();
                    field.accept_data(&chunk)?;
                }
            } else {
                self.buffer.drain(..send_len);
            }
        }

        if boundary_pos.is_some() {
            self.close_field();
            self.state = State::LookingForBoundary;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn close_field(&mut self) {
        let Some(name) = self.current.take() else {
            return;
        };
        if let Some(field) = self.fields.get_mut(&name) {
            field.close();
        }
        let Some(previous) = self.previous_value.take() else {
            return;
        };
        let Some(latest) = self.fields.get(&name).and_then(|f| f.text()) else {
            return;
        };
        let latest = latest.to_string();
        let history_name = format!("{name}[]");
        match self.fields.get_mut(&history_name) {
            Some(history) => {
                if let Err(err) = history.accept_data(format!("|{latest}").as_bytes()) {
                    tracing::debug!("could not extend field history: {}", err);
                }
            }
            None => {
                self.fields.insert(
                    history_name.clone(),
                    Field::text_with_content(history_name, format!("{previous}|{latest}")),
                );
            }
        }
    }
}

/// First position of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Extracts a quoted attribute value following `marker`.
fn quoted_attribute(headers: &str, marker: &str) -> Option<String> {
    let start = headers.find(marker)? + marker.len();
    let end = headers[start..].find('"')? + start;
    Some(headers[start..end].to_string())
}

/// Extracts the part-level `Content-Type:` value, terminated by whitespace
/// or end of the header block.
fn part_content_type(headers: &str) -> Option<String> {
    let start = headers.find("Content-Type: ")? + "Content-Type: ".len();
    let rest = &headers[start..];
    let end = rest
        .find(|c: char| c == ' ' || c == '\r' || c == '\n')
        .unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "----HestiaTestBoundary";

    fn new_parser(dir: &std::path::Path) -> Parser {
        let content_type = format!("multipart/form-data; boundary={BOUNDARY}");
        Parser::new(&content_type, dir).unwrap()
    }

    fn text_part(name: &str, value: &str) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
    }

    fn closing() -> String {
        format!("--{BOUNDARY}--\r\n")
    }

    #[test]
    fn test_missing_boundary_rejected() {
        let err = Parser::new("multipart/form-data", std::env::temp_dir()).unwrap_err();
        assert!(matches!(err, MultipartError::MissingBoundary(_)));
    }

    #[test]
    fn test_single_text_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = new_parser(dir.path());
        let body = format!("{}{}", text_part("note", "hello world"), closing());
        parser.accept_data(body.as_bytes()).unwrap();
        assert_eq!(parser.field("note").unwrap().text(), Some("hello world"));
    }

    #[test]
    fn test_byte_at_a_time_feeding() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = new_parser(dir.path());
        let body = format!(
            "{}{}{}",
            text_part("a", "first"),
            text_part("b", "second"),
            closing()
        );
        for byte in body.as_bytes() {
            parser.accept_data(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(parser.field("a").unwrap().text(), Some("first"));
        assert_eq!(parser.field("b").unwrap().text(), Some("second"));
    }

    #[test]
    fn test_duplicate_fields_build_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = new_parser(dir.path());
        let body = format!(
            "{}{}{}{}",
            text_part("k", "v1"),
            text_part("k", "v2"),
            text_part("k", "v3"),
            closing()
        );
        parser.accept_data(body.as_bytes()).unwrap();
        assert_eq!(parser.field("k").unwrap().text(), Some("v3"));
        assert_eq!(parser.field("k[]").unwrap().text(), Some("v1|v2|v3"));
    }

    #[test]
    fn test_file_part_spools_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = new_parser(dir.path());
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"up\"; filename=\"data.bin\"\r\nContent-Type: application/octet-stream\r\n\r\nBINARY\u{0}PAYLOAD\r\n{}",
            closing()
        );
        parser.accept_data(body.as_bytes()).unwrap();

        let field = parser.field("up").unwrap();
        let file = field.file().unwrap();
        assert_eq!(file.filename(), "data.bin");
        assert_eq!(file.content_type(), Some("application/octet-stream"));
        let stored = std::fs::read(file.spool_path()).unwrap();
        assert_eq!(stored, b"BINARY\0PAYLOAD");
    }

    #[test]
    fn test_over_limit_fails_and_removes_spool() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = new_parser(dir.path());
        parser.set_max_collected_bytes(256);

        let head = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"up\"; filename=\"big\"\r\n\r\n"
        );
        parser.accept_data(head.as_bytes()).unwrap();
        let err = parser.accept_data(&[0u8; 4096]).unwrap_err();
        assert!(matches!(err, MultipartError::TooLarge { limit: 256 }));

        assert_eq!(parser.fields().count(), 0);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "spool files must be deleted");
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = new_parser(dir.path());
        let body = format!("--{BOUNDARY}\r\nContent-Disposition: attachment\r\n\r\nx\r\n");
        let err = parser.accept_data(body.as_bytes()).unwrap_err();
        assert!(matches!(err, MultipartError::MalformedHeaders(_)));
    }
}
