#![deny(missing_docs)]
//! Implementation of the HHMAC request authentication scheme.
//!
//! A client computes a keyed hash over a fingerprint of the request (method, host,
//! path and query parameters), a timestamp and its public key, and sends it in the
//! `Authorization` header:
//!
//! ```text
//! Authorization: HHMAC time=20091110230000, key=42, hash=8618c5198d8e...
//! ```
//!
//! The server looks up the secret belonging to the public key, recomputes the hash,
//! and accepts the request if the hashes match, the timestamp lies within the
//! configured time window and, optionally, the public key holds every scope the
//! request requires.
//!
//! Headers and body are not covered by the hash. There is no nonce tracking:
//! a captured request can be replayed until its timestamp leaves the time window.
//!
//! ## Features
//!
//! This crate is intended to be used with multiple different HTTP clients and/or servers.
//! As such, client/server-specific implementations are gated by correspondingly named
//! features.
//!
//! ### Supported crates:
//!
//! | Crate / Feature name                              | Client/Server | Notes                                                         |
//! | ------------------------------------------------- | ------------- | ------------------------------------------------------------- |
//! | [reqwest](https://crates.io/crates/reqwest)       | Client        | Supports blocking and non-blocking requests.                  |
//! | [rouille](https://crates.io/crates/rouille)       | Server        |                                                               |
//!
//! ### Supported algorithms:
//!
//! - `hmac-sha256` (default)
//! - `hmac-sha512`
//!
//! The algorithm is not transmitted: client and server must be configured alike.
//!
//! ## Example usage
//!
//! ```rust
//! use hhmac::mock_request::MockRequest;
//! use hhmac::*;
//!
//! let provider = SimpleSecretProvider::new(vec![(
//!     "42",
//!     Credential::new(b"MYSECRET").with_scopes(vec!["read"]),
//! )]);
//! let validator = Validator::new(TimeWindow::default(), provider);
//!
//! // Client side
//! let req = MockRequest::new(http::Method::GET, "https://example.com/test/path?obj=1")
//!     .signed(&SigningConfig::new("42", b"MYSECRET"))
//!     .unwrap();
//!
//! // Server side
//! validator.validate_request(&req, &["read"]).unwrap();
//! ```

const TIME_FORMAT: &str = "%Y%m%d%H%M%S";
type DefaultHmacAlgorithm = algorithm::HmacSha256;

mod algorithm;
pub use algorithm::*;

mod header;
pub use header::*;

mod canonicalize;
pub use canonicalize::*;

mod signing;
pub use signing::*;

mod verifying;
pub use verifying::*;

/// Module containing a mock request type which implements both
/// `RequestLike` and `ClientRequestLike` for testing.
pub mod mock_request;

#[cfg(feature = "reqwest")]
mod reqwest_impls;

#[cfg(feature = "rouille")]
mod rouille_impls;
