use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use http::header::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::algorithm::HmacAlgorithm;
use crate::canonicalize::{CanonicalizeExt, Fingerprint, RequestLike};
use crate::header::{format_timestamp, AuthorizationParameters, AUTHORIZATION_HEADER};
use crate::DefaultHmacAlgorithm;

/// This trait is to be implemented for types representing an outgoing
/// HTTP request. The HHMAC signing extension methods are available on
/// any type implementing this trait.
pub trait ClientRequestLike: RequestLike {
    /// Add or replace a header on the request.
    fn set_header(&mut self, header: HeaderName, value: HeaderValue);
}

/// The types of error which may occur whilst signing a request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SigningError {
    /// The public key cannot be carried by the `Authorization` header: it is
    /// empty, or contains anything other than visible ASCII, or contains
    /// `,`, `=` or `"`.
    #[error("Public key {0:?} cannot be used in an HHMAC header")]
    InvalidPublicKey(String),
    /// The signing time has no fourteen digit timestamp (years 0 to 9999).
    #[error("Signing time {0} cannot be used in an HHMAC header")]
    DateOutOfRange(DateTime<Utc>),
}

/// Computes the raw digest for a fingerprinted request.
///
/// The signed payload is `fingerprint_timestamp_publickey`, with the timestamp
/// in the wire format used by the `Authorization` header.
pub fn compute_digest(
    fingerprint: &Fingerprint,
    date: &DateTime<Utc>,
    public_key: &str,
    secret: &[u8],
    algorithm: &dyn HmacAlgorithm,
) -> Vec<u8> {
    let payload = [fingerprint.as_str(), format_timestamp(date).as_str(), public_key].join("_");
    algorithm.hmac(secret, payload.as_bytes())
}

pub(crate) fn is_valid_public_key(public_key: &str) -> bool {
    !public_key.is_empty()
        && public_key
            .chars()
            .all(|c| c.is_ascii_graphic() && !matches!(c, ',' | '=' | '"'))
}

fn is_valid_date(date: &DateTime<Utc>) -> bool {
    (0..=9999).contains(&date.year())
}

/// The configuration used for signing HTTP requests.
#[derive(Clone)]
pub struct SigningConfig {
    algorithm: Arc<dyn HmacAlgorithm>,
    public_key: String,
    secret: Vec<u8>,
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("algorithm", &self.algorithm)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl SigningConfig {
    /// Creates a new signing configuration using the default algorithm.
    pub fn new(public_key: &str, secret: &[u8]) -> Self {
        SigningConfig {
            algorithm: Arc::new(DefaultHmacAlgorithm::default()),
            public_key: public_key.into(),
            secret: secret.into(),
        }
    }

    /// Returns the public key placed in the `Authorization` header.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }
    /// Returns the algorithm used to compute digests.
    pub fn algorithm(&self) -> &dyn HmacAlgorithm {
        &*self.algorithm
    }
    /// Sets the algorithm used to compute digests (in-place).
    pub fn set_algorithm<A: HmacAlgorithm>(&mut self, algorithm: A) -> &mut Self {
        self.algorithm = Arc::new(algorithm);
        self
    }
    /// Sets the algorithm used to compute digests.
    pub fn with_algorithm<A: HmacAlgorithm>(mut self, algorithm: A) -> Self {
        self.set_algorithm(algorithm);
        self
    }
    /// Sets a shared algorithm instance, such as one returned by
    /// `algorithm_from_name` (in-place).
    pub fn set_shared_algorithm(&mut self, algorithm: Arc<dyn HmacAlgorithm>) -> &mut Self {
        self.algorithm = algorithm;
        self
    }
    /// Sets a shared algorithm instance, such as one returned by
    /// `algorithm_from_name`.
    pub fn with_shared_algorithm(mut self, algorithm: Arc<dyn HmacAlgorithm>) -> Self {
        self.set_shared_algorithm(algorithm);
        self
    }

    /// Computes the `Authorization` parameters for a request signed at `date`.
    pub fn authorization<R: RequestLike + ?Sized>(
        &self,
        req: &R,
        date: DateTime<Utc>,
    ) -> Result<AuthorizationParameters, SigningError> {
        if !is_valid_public_key(&self.public_key) {
            return Err(SigningError::InvalidPublicKey(self.public_key.clone()));
        }
        if !is_valid_date(&date) {
            return Err(SigningError::DateOutOfRange(date));
        }
        let digest = compute_digest(
            &req.fingerprint(),
            &date,
            &self.public_key,
            &self.secret,
            &*self.algorithm,
        );
        Ok(AuthorizationParameters::new(date, &self.public_key, &digest))
    }
}

/// Import this trait to get access to the `sign` methods on all types implementing
/// `ClientRequestLike`.
pub trait SigningExt: Sized {
    /// Consumes the request and returns it signed at the current time.
    fn signed(mut self, config: &SigningConfig) -> Result<Self, SigningError> {
        self.sign(config)?;
        Ok(self)
    }

    /// Signs the request in-place at the current time.
    fn sign(&mut self, config: &SigningConfig) -> Result<(), SigningError> {
        self.sign_at(config, Utc::now())
    }

    /// Signs the request in-place as of the given point in time.
    fn sign_at(&mut self, config: &SigningConfig, date: DateTime<Utc>)
        -> Result<(), SigningError>;
}

impl<R: ClientRequestLike> SigningExt for R {
    fn sign_at(
        &mut self,
        config: &SigningConfig,
        date: DateTime<Utc>,
    ) -> Result<(), SigningError> {
        let params = config.authorization(&*self, date)?;

        // The public key has been checked, and the timestamp and hash are
        // ASCII digits and hex.
        let value = params
            .to_header_value()
            .map_err(|_| SigningError::InvalidPublicKey(config.public_key.clone()))?;

        log::debug!("Signed request for public key {:?}", config.public_key);
        self.set_header(AUTHORIZATION_HEADER, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use http::Method;

    use super::*;
    use crate::mock_request::MockRequest;
    use crate::{HmacSha256, HmacSha512};

    fn test_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0)
            .single()
            .expect("valid date")
    }

    fn test_request() -> MockRequest {
        MockRequest::new(Method::GET, "https://example.com/test/path?obj=1")
    }

    #[test]
    fn known_answer() {
        let digest = compute_digest(
            &test_request().fingerprint(),
            &test_date(),
            "42",
            b"MYSECRET",
            &HmacSha256,
        );
        assert_eq!(
            hex::encode(digest),
            "8618c5198d8ef93206a7b1724feaa83743c858153cac2a1edc987321a7fb5c7f"
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let config = SigningConfig::new("42", b"MYSECRET");
        let mut a = test_request();
        let mut b = test_request();
        a.sign_at(&config, test_date()).unwrap();
        b.sign_at(&config, test_date()).unwrap();
        assert_eq!(
            a.header(&AUTHORIZATION_HEADER),
            b.header(&AUTHORIZATION_HEADER)
        );
    }

    #[test]
    fn sets_authorization_header() {
        let config = SigningConfig::new("42", b"MYSECRET");
        let req = test_request();
        let mut signed = req.clone();
        signed.sign_at(&config, test_date()).unwrap();

        assert_eq!(
            signed.header(&AUTHORIZATION_HEADER).unwrap(),
            "HHMAC time=20091110230000, key=42, hash=8618c5198d8ef93206a7b1724feaa83743c858153cac2a1edc987321a7fb5c7f"
        );
        assert!(req.header(&AUTHORIZATION_HEADER).is_none());
    }

    #[test]
    fn algorithm_is_selectable() {
        let config = SigningConfig::new("42", b"MYSECRET").with_algorithm(HmacSha512);
        let params = config.authorization(&test_request(), test_date()).unwrap();
        assert_eq!(params.hash().len(), 128);

        let default = SigningConfig::new("42", b"MYSECRET")
            .authorization(&test_request(), test_date())
            .unwrap();
        assert_ne!(params.hash(), default.hash());
    }

    #[test]
    fn subsecond_dates_sign_like_whole_seconds() {
        let config = SigningConfig::new("42", b"MYSECRET");
        let later = test_date() + chrono::Duration::milliseconds(999);
        assert_eq!(
            config.authorization(&test_request(), later).unwrap(),
            config.authorization(&test_request(), test_date()).unwrap()
        );
    }

    #[test]
    fn rejects_unusable_public_keys() {
        for key in &["", "a,b", "a=b", "a b", "\"a\"", "clé", "a\tb"] {
            let config = SigningConfig::new(key, b"MYSECRET");
            let mut req = test_request();
            assert!(matches!(
                req.sign_at(&config, test_date()),
                Err(SigningError::InvalidPublicKey(_))
            ));
            assert!(req.header(&AUTHORIZATION_HEADER).is_none());
        }
    }

    #[test]
    fn debug_output_hides_secret() {
        let config = SigningConfig::new("42", b"MYSECRET");
        assert!(!format!("{:?}", config).contains("MYSECRET"));
    }

    #[test]
    fn rejects_dates_without_a_timestamp() {
        let config = SigningConfig::new("42", b"MYSECRET");
        for date in &[
            Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).single().expect("valid date"),
            Utc.with_ymd_and_hms(-1, 12, 31, 23, 59, 59).single().expect("valid date"),
        ] {
            let mut req = test_request();
            assert!(matches!(
                req.sign_at(&config, *date),
                Err(SigningError::DateOutOfRange(_))
            ));
            assert!(req.header(&AUTHORIZATION_HEADER).is_none());
        }

        let last = Utc
            .with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
            .single()
            .expect("valid date");
        let params = config.authorization(&test_request(), last).unwrap();
        assert_eq!(params.to_string().parse::<AuthorizationParameters>(), Ok(params));
    }
}
