use std::fmt::Debug;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

/// Implementations of this trait select the keyed hash used to compute
/// request digests. Signer and verifier must agree on the algorithm: it is
/// not transmitted as part of the `Authorization` header.
pub trait HmacAlgorithm: Debug + Send + Sync + 'static {
    /// A short, stable name for the algorithm (eg. `hmac-sha256`).
    fn name(&self) -> &str;
    /// Returns the raw keyed digest of `bytes_to_sign` under `key`.
    fn hmac(&self, key: &[u8], bytes_to_sign: &[u8]) -> Vec<u8>;
}

macro_rules! hmac_algorithm {
    ($alg_name:ident($hash:ty) = $name:literal) => {
        #[doc = "The '"]
        #[doc = $name]
        #[doc = "' keyed hash."]
        #[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
        pub struct $alg_name;

        impl HmacAlgorithm for $alg_name {
            fn name(&self) -> &str {
                $name
            }
            fn hmac(&self, key: &[u8], bytes_to_sign: &[u8]) -> Vec<u8> {
                let mut mac =
                    <Hmac<$hash>>::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(bytes_to_sign);
                mac.finalize().into_bytes().to_vec()
            }
        }
    };
}

hmac_algorithm!(HmacSha256(Sha256) = "hmac-sha256");
hmac_algorithm!(HmacSha512(Sha512) = "hmac-sha512");

/// Looks up one of the built-in algorithms by name. Names are matched
/// case-insensitively.
pub fn algorithm_from_name(name: &str) -> Option<Arc<dyn HmacAlgorithm>> {
    let name = name.to_ascii_lowercase();
    match name.as_str() {
        "hmac-sha256" => Some(Arc::new(HmacSha256)),
        "hmac-sha512" => Some(Arc::new(HmacSha512)),
        _ => None,
    }
}

/// Compares two byte strings without short-circuiting on the first
/// difference. Inputs of different lengths are never equal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
