use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};
use http::header::{HeaderName, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use thiserror::Error;

use crate::canonicalize::RequestLike;
use crate::TIME_FORMAT;

/// The header carrying the HHMAC credentials.
pub const AUTHORIZATION_HEADER: HeaderName = AUTHORIZATION;
/// The authentication scheme token. Matched case-sensitively.
pub const AUTHORIZATION_SCHEME: &str = "HHMAC";
/// Name of the parameter holding the hex-encoded digest.
pub const HASH_PARAMETER: &str = "hash";
/// Name of the parameter holding the signing timestamp.
pub const TIMESTAMP_PARAMETER: &str = "time";
/// Name of the parameter holding the public key identifier.
pub const PUBLIC_KEY_PARAMETER: &str = "key";

/// The ways in which reading the `Authorization` header can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HeaderError {
    /// The request carries no `Authorization` header at all.
    #[error("Missing Authorization header")]
    MissingAuthorizationHeader,
    /// The header does not start with the `HHMAC` scheme token.
    #[error("Non HHMAC authorization")]
    NonHmacScheme,
    /// A required parameter is missing, or the timestamp cannot be parsed.
    #[error("Authorization header invalid")]
    AuthorizationParameterInvalid,
    /// A single named parameter was requested but is not present.
    #[error("Authorization parameter not found: {0}")]
    AuthorizationParameterNotFound(String),
}

/// Renders a timestamp in the wire format (`YYYYMMDDHHMMSS`, UTC). The same
/// rendering is used as signing input, so sub-second precision is dropped.
pub fn format_timestamp(date: &DateTime<Utc>) -> String {
    date.format(TIME_FORMAT).to_string()
}

/// Parses a wire-format timestamp. Anything other than exactly fourteen
/// ASCII digits describing a valid UTC calendar time is rejected.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if value.len() != 14 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(value, TIME_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// The parsed payload of an HHMAC `Authorization` header.
///
/// Parsing via `FromStr` only checks that the header is structurally sound;
/// use `is_valid` to reject headers whose hash or public key is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationParameters {
    hash: String,
    date: DateTime<Utc>,
    public_key: String,
}

impl AuthorizationParameters {
    /// Builds the parameters for a freshly computed digest. The digest is
    /// hex-encoded and the date truncated to whole seconds.
    pub fn new(date: DateTime<Utc>, public_key: &str, digest: &[u8]) -> Self {
        Self::from_parts(hex::encode(digest), date, public_key)
    }
    /// Builds the parameters from an already-rendered hash.
    pub fn from_parts<H: Into<String>, K: Into<String>>(
        hash: H,
        date: DateTime<Utc>,
        public_key: K,
    ) -> Self {
        Self {
            hash: hash.into(),
            date: date.trunc_subsecs(0),
            public_key: public_key.into(),
        }
    }
    /// The digest, as rendered on the wire.
    pub fn hash(&self) -> &str {
        &self.hash
    }
    /// The point in time the request was signed at.
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }
    /// The identifier used to look up the signing secret.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }
    /// Returns true if both the hash and the public key are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.hash.is_empty() && !self.public_key.is_empty()
    }
    /// Renders these parameters as an `Authorization` header value.
    pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::try_from(self.to_string())
    }
}

impl fmt::Display for AuthorizationParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}={}, {}={}, {}={}",
            AUTHORIZATION_SCHEME,
            TIMESTAMP_PARAMETER,
            format_timestamp(&self.date),
            PUBLIC_KEY_PARAMETER,
            self.public_key,
            HASH_PARAMETER,
            self.hash
        )
    }
}

impl FromStr for AuthorizationParameters {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let params = parameter_map(s)?;

        let (hash, time, public_key) = match (
            params.get(HASH_PARAMETER),
            params.get(TIMESTAMP_PARAMETER),
            params.get(PUBLIC_KEY_PARAMETER),
        ) {
            (Some(hash), Some(time), Some(public_key)) => (*hash, *time, *public_key),
            _ => return Err(HeaderError::AuthorizationParameterInvalid),
        };

        let date = parse_timestamp(time).ok_or(HeaderError::AuthorizationParameterInvalid)?;

        Ok(Self {
            hash: hash.into(),
            date,
            public_key: public_key.into(),
        })
    }
}

/// Splits the parameter list of an HHMAC header into a map. The last
/// occurrence of a repeated parameter wins.
fn parameter_map(header: &str) -> Result<HashMap<&str, &str>, HeaderError> {
    let header = header.trim();
    let args = header
        .strip_prefix(AUTHORIZATION_SCHEME)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or(HeaderError::NonHmacScheme)?;

    Ok(args
        .split(',')
        .filter_map(|part| {
            let mut kv = part.splitn(2, '=');
            let k = kv.next()?.trim();
            let v = kv.next()?.trim().trim_matches('"');
            Some((k, v))
        })
        .collect())
}

/// Looks up a single parameter of an HHMAC header by name, without
/// requiring the rest of the header to be well formed.
pub fn find_parameter<'a>(header: &'a str, name: &str) -> Result<&'a str, HeaderError> {
    parameter_map(header)?
        .get(name)
        .copied()
        .ok_or_else(|| HeaderError::AuthorizationParameterNotFound(name.into()))
}

/// Reads and parses the `Authorization` header of a request.
pub fn read_parameters<R: RequestLike + ?Sized>(
    req: &R,
) -> Result<AuthorizationParameters, HeaderError> {
    let value = req
        .header(&AUTHORIZATION_HEADER)
        .ok_or(HeaderError::MissingAuthorizationHeader)?;
    if value.is_empty() {
        return Err(HeaderError::MissingAuthorizationHeader);
    }
    value
        .to_str()
        .map_err(|_| HeaderError::AuthorizationParameterInvalid)?
        .parse()
}
