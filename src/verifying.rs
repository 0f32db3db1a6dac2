use std::collections::{BTreeSet, HashMap};
use std::error::Error as StdError;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use http::StatusCode;
use thiserror::Error;

use crate::algorithm::{constant_time_eq, HmacAlgorithm};
use crate::canonicalize::{CanonicalizeExt, RequestLike};
use crate::header::{read_parameters, HeaderError};
use crate::signing::{compute_digest, ClientRequestLike, SigningConfig, SigningError, SigningExt};
use crate::DefaultHmacAlgorithm;

/// The error type returned by `SecretProvider` implementations. It is passed
/// through to the caller unchanged.
pub type ProviderError = Box<dyn StdError + Send + Sync + 'static>;

/// The validation process will use this trait to find the secret and the
/// authorized scopes belonging to a public key.
///
/// You do not need to implement this yourself: the `SimpleSecretProvider` type provides
/// an in-memory store that should be suitable for many situations.
pub trait SecretProvider: Debug + Send + Sync + 'static {
    /// Returns the secret used to sign requests for `identifier`.
    fn secret(&self, identifier: &str) -> Result<Vec<u8>, ProviderError>;
    /// Returns the scopes `identifier` is authorized for.
    fn scopes(&self, identifier: &str) -> Result<BTreeSet<String>, ProviderError>;
}

/// Returned by `SimpleSecretProvider` when no credential is stored for an
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No credential found for {identifier:?}")]
pub struct SecretNotFound {
    /// The identifier that was looked up.
    pub identifier: String,
}

/// A secret together with the scopes its holder is authorized for.
#[derive(Clone, Default)]
pub struct Credential {
    secret: Vec<u8>,
    scopes: BTreeSet<String>,
}

impl Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credential {
    /// Creates a credential without any scopes.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.into(),
            scopes: BTreeSet::new(),
        }
    }
    /// Adds scopes to the credential.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }
    /// Returns the scopes of this credential.
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }
}

/// Implementation of a simple in-memory credential store.
#[derive(Debug, Default, Clone)]
pub struct SimpleSecretProvider {
    credentials: HashMap<String, Credential>,
}

impl SimpleSecretProvider {
    /// Initializes the store from a list of identifiers and credentials.
    pub fn new<I, S>(credential_iter: I) -> Self
    where
        I: IntoIterator<Item = (S, Credential)>,
        S: Into<String>,
    {
        Self {
            credentials: credential_iter
                .into_iter()
                .map(|(id, credential)| (id.into(), credential))
                .collect(),
        }
    }

    /// Adds or replaces the credential for an identifier.
    pub fn add(&mut self, identifier: &str, credential: Credential) {
        self.credentials.insert(identifier.into(), credential);
    }
    /// Clears all credentials from the store.
    pub fn clear(&mut self) {
        self.credentials.clear();
    }
    /// Removes the credential stored for an identifier.
    pub fn remove(&mut self, identifier: &str) {
        self.credentials.remove(identifier);
    }

    fn credential(&self, identifier: &str) -> Result<&Credential, ProviderError> {
        self.credentials.get(identifier).ok_or_else(|| {
            SecretNotFound {
                identifier: identifier.into(),
            }
            .into()
        })
    }
}

impl SecretProvider for SimpleSecretProvider {
    fn secret(&self, identifier: &str) -> Result<Vec<u8>, ProviderError> {
        Ok(self.credential(identifier)?.secret.clone())
    }
    fn scopes(&self, identifier: &str) -> Result<BTreeSet<String>, ProviderError> {
        Ok(self.credential(identifier)?.scopes.clone())
    }
}

impl<P: SecretProvider + ?Sized> SecretProvider for Arc<P> {
    fn secret(&self, identifier: &str) -> Result<Vec<u8>, ProviderError> {
        (**self).secret(identifier)
    }
    fn scopes(&self, identifier: &str) -> Result<BTreeSet<String>, ProviderError> {
        (**self).scopes(identifier)
    }
}

/// The range of signing times, relative to the current time, for which a
/// request is accepted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimeWindow {
    /// The same tolerance applies to the past and the future.
    Symmetric(Duration),
    /// Separate bounds for requests signed in the past and requests signed
    /// ahead of the current time.
    Asymmetric {
        /// How long ago a request may have been signed.
        max_age: Duration,
        /// How far ahead of the current time a request may have been signed.
        max_skew: Duration,
    },
}

impl TimeWindow {
    /// Returns true if a request signed at `date` is acceptable at `now`.
    /// Both bounds are inclusive. Timestamps only carry whole seconds, so both
    /// times are truncated to the second before comparing.
    pub fn contains(&self, date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let (max_age, max_skew) = match *self {
            TimeWindow::Symmetric(tolerance) => (tolerance, tolerance),
            TimeWindow::Asymmetric { max_age, max_skew } => (max_age, max_skew),
        };
        let delta = now
            .trunc_subsecs(0)
            .signed_duration_since(date.trunc_subsecs(0));
        match delta.to_std() {
            // Signed in the past
            Ok(age) => age <= max_age,
            // Signed in the future
            Err(_) => (-delta).to_std().map_or(false, |skew| skew <= max_skew),
        }
    }
}

impl Default for TimeWindow {
    /// Thirty seconds either way.
    fn default() -> Self {
        TimeWindow::Symmetric(Duration::from_secs(30))
    }
}

/// This error indicates that a request failed validation. Each variant
/// corresponds to one step of the validation process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// The request has no `Authorization` header.
    #[error("Missing Authorization header")]
    MissingHeader,
    /// The `Authorization` header uses a scheme other than `HHMAC`.
    #[error("Non HHMAC authorization")]
    WrongScheme,
    /// The `Authorization` header parameters are missing, empty or malformed.
    #[error("Authorization header invalid")]
    MalformedParameters,
    /// The secret for the public key could not be retrieved.
    #[error("Secret lookup failed: {0}")]
    SecretLookupFailed(#[source] ProviderError),
    /// The hash does not match the request.
    #[error("Invalid hash")]
    HashMismatch,
    /// The request was signed outside of the accepted time window.
    #[error("Token expired")]
    Expired,
    /// The public key lacks one or more of the required scopes.
    #[error("Missing scopes: {0:?}")]
    ScopeDenied(Vec<String>),
    /// The authorized scopes for the public key could not be retrieved.
    #[error("Scope lookup failed: {0}")]
    ScopeLookupFailed(#[source] ProviderError),
    /// The request could not be signed.
    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl From<HeaderError> for ValidationError {
    fn from(other: HeaderError) -> Self {
        match other {
            HeaderError::MissingAuthorizationHeader => ValidationError::MissingHeader,
            HeaderError::NonHmacScheme => ValidationError::WrongScheme,
            _ => ValidationError::MalformedParameters,
        }
    }
}

impl ValidationError {
    /// The HTTP status a server should respond with. Failures of the secret
    /// store itself map to `500 Internal Server Error`, so that they can be
    /// told apart from requests with bad credentials.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ValidationError::ScopeDenied(_) => StatusCode::FORBIDDEN,
            ValidationError::SecretLookupFailed(e) if e.is::<SecretNotFound>() => {
                StatusCode::UNAUTHORIZED
            }
            ValidationError::SecretLookupFailed(_)
            | ValidationError::ScopeLookupFailed(_)
            | ValidationError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Validates incoming requests, and signs outgoing requests on behalf of
/// the identifiers known to its `SecretProvider`.
///
/// A validator is immutable once built and can be shared between threads.
#[derive(Debug, Clone)]
pub struct Validator {
    secret_provider: Arc<dyn SecretProvider>,
    algorithm: Arc<dyn HmacAlgorithm>,
    time_window: TimeWindow,
}

impl Validator {
    /// Creates a new validator using the given time window and secret provider.
    pub fn new<SP: SecretProvider>(time_window: TimeWindow, secret_provider: SP) -> Self {
        Validator {
            secret_provider: Arc::new(secret_provider),
            algorithm: Arc::new(DefaultHmacAlgorithm::default()),
            time_window,
        }
    }

    /// Returns the secret provider.
    pub fn secret_provider(&self) -> &dyn SecretProvider {
        &*self.secret_provider
    }
    /// Returns the algorithm used to compute digests.
    pub fn algorithm(&self) -> &dyn HmacAlgorithm {
        &*self.algorithm
    }
    /// Sets the algorithm used to compute digests (in-place).
    ///
    /// This is `hmac-sha256` by default.
    pub fn set_algorithm<A: HmacAlgorithm>(&mut self, algorithm: A) -> &mut Self {
        self.algorithm = Arc::new(algorithm);
        self
    }
    /// Sets the algorithm used to compute digests.
    ///
    /// This is `hmac-sha256` by default.
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
    /// Returns the accepted time window.
    pub fn time_window(&self) -> TimeWindow {
        self.time_window
    }
    /// Controls the accepted time window (in-place).
    pub fn set_time_window(&mut self, time_window: TimeWindow) -> &mut Self {
        self.time_window = time_window;
        self
    }
    /// Controls the accepted time window.
    pub fn with_time_window(mut self, time_window: TimeWindow) -> Self {
        self.set_time_window(time_window);
        self
    }

    /// Validates a request against the current time. When `required_scopes`
    /// is non-empty, the public key must be authorized for all of them.
    pub fn validate_request<R: RequestLike + ?Sized>(
        &self,
        req: &R,
        required_scopes: &[&str],
    ) -> Result<(), ValidationError> {
        self.validate_request_at(req, required_scopes, Utc::now())
    }

    /// Validates a request as if the current time were `now`.
    pub fn validate_request_at<R: RequestLike + ?Sized>(
        &self,
        req: &R,
        required_scopes: &[&str],
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let result = self.check(req, required_scopes, now);
        if let Err(e) = &result {
            log::debug!("Rejected request: {}", e);
        }
        result
    }

    fn check<R: RequestLike + ?Sized>(
        &self,
        req: &R,
        required_scopes: &[&str],
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let params = read_parameters(req)?;
        if !params.is_valid() {
            return Err(ValidationError::MalformedParameters);
        }
        let public_key = params.public_key();

        let secret = self
            .secret_provider
            .secret(public_key)
            .map_err(ValidationError::SecretLookupFailed)?;

        let expected = compute_digest(
            &req.fingerprint(),
            &params.date(),
            public_key,
            &secret,
            &*self.algorithm,
        );
        let provided = hex::decode(params.hash()).map_err(|_| ValidationError::HashMismatch)?;
        if !constant_time_eq(&expected, &provided) {
            return Err(ValidationError::HashMismatch);
        }

        if !self.time_window.contains(params.date(), now) {
            return Err(ValidationError::Expired);
        }

        if !required_scopes.is_empty() {
            let authorized = self
                .secret_provider
                .scopes(public_key)
                .map_err(ValidationError::ScopeLookupFailed)?;
            let missing: Vec<String> = required_scopes
                .iter()
                .filter(|scope| !authorized.contains(**scope))
                .map(|scope| (*scope).to_owned())
                .collect();
            if !missing.is_empty() {
                return Err(ValidationError::ScopeDenied(missing));
            }
        }

        log::debug!("Accepted request for public key {:?}", public_key);
        Ok(())
    }

    /// Signs `req` at `date` using the secret stored for `identifier`, and
    /// sets its `Authorization` header. The header carries `public_key`.
    pub fn hash_request<R: ClientRequestLike>(
        &self,
        req: &mut R,
        date: DateTime<Utc>,
        public_key: &str,
        identifier: &str,
    ) -> Result<(), ValidationError> {
        let secret = self
            .secret_provider
            .secret(identifier)
            .map_err(ValidationError::SecretLookupFailed)?;
        let config =
            SigningConfig::new(public_key, &secret).with_shared_algorithm(self.algorithm.clone());
        req.sign_at(&config, date)?;
        Ok(())
    }
}
