use std::borrow::Cow;

use http::header::{HeaderName, HeaderValue};

use super::*;

/// Returns the correct `Host` header value for a given URL, in the form `<host>:<port>`.
fn host_from_url(url: &url::Url) -> Option<String> {
    url.host_str().map(|host| match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.into(),
    })
}

impl RequestLike for reqwest::Request {
    fn method(&self) -> &str {
        reqwest::Request::method(self).as_str()
    }
    fn host(&self) -> Option<String> {
        host_from_url(self.url())
    }
    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.url().path())
    }
    fn query(&self) -> Option<Cow<'_, str>> {
        self.url().query().map(Cow::Borrowed)
    }
    fn header(&self, header: &HeaderName) -> Option<HeaderValue> {
        self.headers().get(header).cloned()
    }
}

impl ClientRequestLike for reqwest::Request {
    fn set_header(&mut self, header: HeaderName, value: HeaderValue) {
        self.headers_mut().insert(header, value);
    }
}

impl RequestLike for reqwest::blocking::Request {
    fn method(&self) -> &str {
        reqwest::blocking::Request::method(self).as_str()
    }
    fn host(&self) -> Option<String> {
        host_from_url(self.url())
    }
    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.url().path())
    }
    fn query(&self) -> Option<Cow<'_, str>> {
        self.url().query().map(Cow::Borrowed)
    }
    fn header(&self, header: &HeaderName) -> Option<HeaderValue> {
        self.headers().get(header).cloned()
    }
}

impl ClientRequestLike for reqwest::blocking::Request {
    fn set_header(&mut self, header: HeaderName, value: HeaderValue) {
        self.headers_mut().insert(header, value);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{offset::TimeZone, Utc};
    use http::header::{AUTHORIZATION, CONTENT_TYPE};

    use super::*;

    fn test_date() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0)
            .single()
            .expect("valid date")
    }

    #[test]
    fn it_works() {
        let config = SigningConfig::new("42", b"MYSECRET");

        let client = reqwest::Client::new();

        let mut req = client
            .get("https://example.com/test/path?obj=1")
            .header(CONTENT_TYPE, "application/json")
            .build()
            .unwrap();
        req.sign_at(&config, test_date()).unwrap();

        assert_eq!(req.headers().get(AUTHORIZATION).unwrap(), "HHMAC time=20091110230000, key=42, hash=8618c5198d8ef93206a7b1724feaa83743c858153cac2a1edc987321a7fb5c7f");
    }

    #[test]
    fn it_works_blocking() {
        let config = SigningConfig::new("42", b"MYSECRET");

        let client = reqwest::blocking::Client::new();

        let mut req = client
            .get("https://example.com/test/path?obj=1")
            .build()
            .unwrap();
        req.sign_at(&config, test_date()).unwrap();

        assert_eq!(req.headers().get(AUTHORIZATION).unwrap(), "HHMAC time=20091110230000, key=42, hash=8618c5198d8ef93206a7b1724feaa83743c858153cac2a1edc987321a7fb5c7f");
    }

    #[test]
    fn fingerprint_includes_port() {
        let client = reqwest::Client::new();
        let req = client
            .post("http://localhost:8080/foo/bar?b=2&a=1")
            .build()
            .unwrap();
        assert_eq!(
            req.fingerprint().as_str(),
            "a_1_b_2_bar_foo_localhost:8080_post"
        );
    }

    #[test]
    fn signed_request_validates() {
        let validator = Validator::new(
            TimeWindow::default(),
            SimpleSecretProvider::new(vec![("42", Credential::new(b"MYSECRET"))]),
        );
        let client = reqwest::Client::new();
        let req = client
            .delete("https://example.com/items/7")
            .build()
            .unwrap()
            .signed(&SigningConfig::new("42", b"MYSECRET"))
            .unwrap();
        validator.validate_request(&req, &[]).unwrap();
    }
}
