use std::borrow::Cow;
use std::collections::btree_map::{BTreeMap, Entry};
use std::fmt;

use http::{header::HeaderName, HeaderValue};
use itertools::Itertools;
use percent_encoding::percent_decode_str;

/// Base trait for all request types.
///
/// Only the method, host, path and query take part in the fingerprint;
/// header access exists so that the `Authorization` header can be read.
pub trait RequestLike {
    /// The HTTP method, in any case.
    fn method(&self) -> &str;
    /// The host the request is addressed to, including the port if one was
    /// given explicitly (eg. `localhost:8080`).
    fn host(&self) -> Option<String>;
    /// The percent-encoded path, without the query string.
    fn path(&self) -> Cow<'_, str>;
    /// The raw query string, without the leading `?`.
    fn query(&self) -> Option<Cow<'_, str>>;
    /// Returns an existing header on the request. This method *must* reflect changes made
    /// by the `ClientRequestLike::set_header` method.
    fn header(&self, header: &HeaderName) -> Option<HeaderValue>;
}

impl<T: RequestLike + ?Sized> RequestLike for &T {
    fn method(&self) -> &str {
        (**self).method()
    }
    fn host(&self) -> Option<String> {
        (**self).host()
    }
    fn path(&self) -> Cow<'_, str> {
        (**self).path()
    }
    fn query(&self) -> Option<Cow<'_, str>> {
        (**self).query()
    }
    fn header(&self, header: &HeaderName) -> Option<HeaderValue> {
        (**self).header(header)
    }
}

/// Opaque struct storing a computed request fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint from the individual request components.
    ///
    /// Every component is split into tokens: the lower-cased method, the
    /// host, each percent-decoded path segment, and `key_value` for each
    /// query parameter. When a query key repeats, only its first value is
    /// used. Empty tokens are dropped and the rest sorted before joining
    /// with `_`, so the order of query parameters does not matter.
    pub fn from_parts(method: &str, host: &str, path: &str, query: Option<&str>) -> Self {
        let mut params = BTreeMap::new();
        for (key, value) in query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()))
            .into_iter()
            .flatten()
        {
            if let Entry::Vacant(entry) = params.entry(key) {
                entry.insert(value);
            }
        }

        let path = percent_decode_str(path).decode_utf8_lossy();

        let fingerprint = [method.to_ascii_lowercase(), host.to_owned()]
            .iter()
            .cloned()
            .chain(path.split('/').map(ToOwned::to_owned))
            .chain(params.iter().map(|(k, v)| format!("{}_{}", k, v)))
            .filter(|token| !token.is_empty())
            .sorted()
            .join("_");

        Fingerprint(fingerprint)
    }
    /// Obtain a view of this fingerprint as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(other: Fingerprint) -> Self {
        other.0
    }
}

/// Extension method for computing the fingerprint of a request.
pub trait CanonicalizeExt {
    /// Compute the fingerprint of this request
    fn fingerprint(&self) -> Fingerprint;
}

impl<T: RequestLike + ?Sized> CanonicalizeExt for T {
    fn fingerprint(&self) -> Fingerprint {
        let host = self.host().unwrap_or_default();
        let path = self.path();
        let query = self.query();
        let fingerprint = Fingerprint::from_parts(self.method(), &host, &path, query.as_deref());
        log::trace!("Request fingerprint: {}", fingerprint);
        fingerprint
    }
}
