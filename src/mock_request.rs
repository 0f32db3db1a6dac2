use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Display};
use std::io::{BufRead, Write};

use anyhow::Context;
use http::header::{HeaderName, HOST};
use http::{HeaderValue, Method};
use url::Url;

use crate::{ClientRequestLike, RequestLike};

/// Generic error returned when the input to `from_reader` does not look like
/// a HTTP request.
#[derive(Debug)]
pub struct ParseError;

impl Error for ParseError {}
impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Malformed HTTP request")
    }
}

/// A mock request type
#[derive(Debug, Clone, PartialEq)]
pub struct MockRequest {
    method: Method,
    path: String,
    headers: HashMap<HeaderName, HeaderValue>,
    body: Option<Vec<u8>>,
}

impl MockRequest {
    /// Returns the path and query used by this mock request
    pub fn path_and_query(&self) -> &str {
        &self.path
    }
    /// Returns the headers used by this mock request
    pub fn headers(&self) -> impl IntoIterator<Item = (&HeaderName, &HeaderValue)> {
        &self.headers
    }
    /// Returns the body used by this mock request
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Constructs a new mock request. The `Host` header is taken from the URL,
    /// including the port if it is not the default for the scheme.
    ///
    /// Panics if `url` is not an absolute URL.
    pub fn new(method: Method, url: &str) -> Self {
        let url: Url = url.parse().unwrap();

        let path = if let Some(query) = url.query() {
            format!("{}?{}", url.path(), query)
        } else {
            url.path().into()
        };
        let mut res = Self {
            method,
            path,
            headers: Default::default(),
            body: None,
        };
        if let Some(host) = url.host_str() {
            let host = match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.into(),
            };
            res = res.with_header("Host", &host)
        }
        res
    }
    /// Convenience method for setting a header
    ///
    /// Panics if the name or value is not valid in a HTTP header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_bytes(value.as_bytes()).unwrap(),
        );
        self
    }
    /// Method for setting a request body
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        let l = body.len();
        self.body = Some(body);
        self.with_header("Content-Length", &l.to_string())
    }

    /// Parse a HTTP request into this mock request object
    pub fn from_reader<R: BufRead>(reader: &mut R) -> Result<Self, Box<dyn Error>> {
        let mut line = String::new();

        // Read request line
        reader.read_line(&mut line)?;
        let mut parts = line.split_ascii_whitespace();

        // Extract method
        let method: Method = parts.next().ok_or(ParseError)?.parse()?;

        // Extract path
        let path: String = parts.next().ok_or(ParseError)?.into();

        // Extract headers
        #[allow(clippy::mutable_key_type)]
        let mut headers = HashMap::new();
        let has_body = loop {
            line.truncate(0);
            if reader.read_line(&mut line)? == 0 {
                break false;
            }
            if line.trim().is_empty() {
                break true;
            }

            let mut parts = line.splitn(2, ':');

            let name_str = parts.next().ok_or(ParseError)?.trim();
            let header_name: HeaderName = name_str
                .parse()
                .with_context(|| format!("{:?}", name_str))?;
            let value_str = parts.next().ok_or(ParseError)?.trim();
            let header_value: HeaderValue = value_str
                .parse()
                .with_context(|| format!("{:?}", value_str))?;
            headers.insert(header_name, header_value);
        };

        let body = if has_body {
            let mut body = Vec::new();
            reader.read_to_end(&mut body)?;
            Some(body).filter(|b| !b.is_empty())
        } else {
            None
        };

        Ok(Self {
            method,
            path,
            headers,
            body,
        })
    }

    /// Write out this HTTP request in standard format
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Box<dyn Error>> {
        writeln!(writer, "{} {} HTTP/1.1", self.method.as_str(), self.path)?;
        let mut headers: Vec<_> = self.headers.iter().collect();
        headers.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        for (header_name, header_value) in headers {
            writeln!(
                writer,
                "{}: {}",
                header_name.as_str(),
                header_value.to_str()?
            )?;
        }

        if let Some(body) = &self.body {
            writeln!(writer)?;
            writer.write_all(body)?;
        }

        Ok(())
    }
}

impl RequestLike for MockRequest {
    fn method(&self) -> &str {
        self.method.as_str()
    }
    fn host(&self) -> Option<String> {
        self.headers
            .get(&HOST)
            .and_then(|v| v.to_str().ok())
            .map(Into::into)
    }
    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.path.split('?').next().unwrap_or_default())
    }
    fn query(&self) -> Option<Cow<'_, str>> {
        self.path.splitn(2, '?').nth(1).map(Cow::Borrowed)
    }
    fn header(&self, header: &HeaderName) -> Option<HeaderValue> {
        self.headers.get(header).cloned()
    }
}

impl ClientRequestLike for MockRequest {
    fn set_header(&mut self, header: HeaderName, value: HeaderValue) {
        self.headers.insert(header, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};

    use crate::{
        CanonicalizeExt, Credential, SimpleSecretProvider, TimeWindow, ValidationError, Validator,
    };

    /// ```text
    /// GET /test/path?obj=1 HTTP/1.1
    /// Host: example.com
    /// Accept: application/json
    /// Authorization: HHMAC time=20091110230000, key=42, hash=8618c5...
    /// ```
    const SIGNED_REQUEST: &str = "\
GET /test/path?obj=1 HTTP/1.1
Host: example.com
Accept: application/json
Authorization: HHMAC time=20091110230000, key=42, hash=8618c5198d8ef93206a7b1724feaa83743c858153cac2a1edc987321a7fb5c7f
";

    fn test_validator() -> Validator {
        Validator::new(
            TimeWindow::default(),
            SimpleSecretProvider::new(vec![("42", Credential::new(b"MYSECRET"))]),
        )
    }

    #[test]
    fn parses_request_components() {
        let req = MockRequest::from_reader(&mut SIGNED_REQUEST.as_bytes()).unwrap();
        assert_eq!(RequestLike::method(&req), "GET");
        assert_eq!(req.host().as_deref(), Some("example.com"));
        assert_eq!(req.path(), "/test/path");
        assert_eq!(req.query().as_deref(), Some("obj=1"));
        assert!(req.body().is_none());
        assert_eq!(
            req.fingerprint(),
            MockRequest::new(Method::GET, "https://example.com/test/path?obj=1").fingerprint()
        );
    }

    #[test]
    fn validates_parsed_request() {
        let req = MockRequest::from_reader(&mut SIGNED_REQUEST.as_bytes()).unwrap();
        let now = Utc
            .with_ymd_and_hms(2009, 11, 10, 23, 0, 10)
            .single()
            .expect("valid date");
        test_validator().validate_request_at(&req, &[], now).unwrap();
    }

    #[test]
    fn write_then_read() {
        let date = Utc
            .with_ymd_and_hms(2009, 11, 10, 23, 0, 0)
            .single()
            .expect("valid date");
        let validator = test_validator();

        let mut req = MockRequest::new(Method::POST, "http://example.com/items?b=2&a=1")
            .with_header("Content-Type", "application/json")
            .with_body(br#"{"hello": "world"}"#.to_vec());
        validator.hash_request(&mut req, date, "42", "42").unwrap();

        let mut buffer = Vec::new();
        req.write(&mut buffer).unwrap();
        let parsed = MockRequest::from_reader(&mut buffer.as_slice()).unwrap();

        assert_eq!(parsed, req);
        validator.validate_request_at(&parsed, &[], date).unwrap();
    }

    #[test]
    fn body_is_not_signed() {
        let date = Utc
            .with_ymd_and_hms(2009, 11, 10, 23, 0, 0)
            .single()
            .expect("valid date");
        let validator = test_validator();

        let mut req = MockRequest::new(Method::PUT, "http://example.com/items/1")
            .with_body(b"original".to_vec());
        validator.hash_request(&mut req, date, "42", "42").unwrap();

        let replaced = req.clone().with_body(b"replaced".to_vec());
        validator.validate_request_at(&replaced, &[], date).unwrap();

        let moved = MockRequest::new(Method::PUT, "http://example.com/items/2").with_header(
            "Authorization",
            req.header(&http::header::AUTHORIZATION)
                .unwrap()
                .to_str()
                .unwrap(),
        );
        assert!(matches!(
            validator.validate_request_at(&moved, &[], date),
            Err(ValidationError::HashMismatch)
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(MockRequest::from_reader(&mut "".as_bytes()).is_err());
        assert!(MockRequest::from_reader(&mut "GET\n".as_bytes()).is_err());
        assert!(MockRequest::from_reader(&mut "GET / HTTP/1.1\nno colon\n".as_bytes()).is_err());
    }
}
