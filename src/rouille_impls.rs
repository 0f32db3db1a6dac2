use std::borrow::Cow;

use http::header::{HeaderName, HeaderValue, HOST};

use super::*;

impl RequestLike for rouille::Request {
    fn method(&self) -> &str {
        rouille::Request::method(self)
    }
    fn host(&self) -> Option<String> {
        rouille::Request::header(self, HOST.as_str()).map(Into::into)
    }
    fn path(&self) -> Cow<'_, str> {
        let raw_url = self.raw_url();
        Cow::Borrowed(raw_url.split('?').next().unwrap_or_default())
    }
    fn query(&self) -> Option<Cow<'_, str>> {
        Some(self.raw_query_string())
            .filter(|query| !query.is_empty())
            .map(Cow::Borrowed)
    }
    fn header(&self, header: &HeaderName) -> Option<HeaderValue> {
        rouille::Request::header(self, header.as_str()).and_then(|v| HeaderValue::from_str(v).ok())
    }
}
