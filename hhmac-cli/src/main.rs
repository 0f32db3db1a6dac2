use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use hhmac::mock_request::MockRequest;
use hhmac::{
    algorithm_from_name, parse_timestamp, CanonicalizeExt, Credential, HmacAlgorithm,
    SigningConfig, SigningExt, SimpleSecretProvider, TimeWindow, ValidationError, Validator,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
enum Mode {
    /// Print the fingerprint of the request
    Fingerprint,
    /// Add an HHMAC Authorization header and print the signed request
    Sign,
    /// Validate the Authorization header of the request
    Verify,
}

#[derive(Debug, StructOpt)]
#[structopt(about = "Signs and validates HTTP requests read from stdin using HHMAC.")]
struct Opt {
    #[structopt(subcommand)]
    mode: Mode,

    /// The public key to sign with, or to accept when verifying.
    #[structopt(short, long, global = true)]
    key: Option<String>,

    /// The secret belonging to the public key.
    #[structopt(short, long, global = true)]
    secret: Option<String>,

    /// One of: hmac-sha256, hmac-sha512.
    #[structopt(short, long, global = true, default_value = "hmac-sha256")]
    algorithm: String,

    /// YYYYMMDDHHMMSS (UTC): the signing time when signing, the current
    /// time when verifying. Defaults to now.
    #[structopt(short, long, global = true)]
    time: Option<String>,

    /// How many seconds in the past a request may have been signed.
    #[structopt(long, global = true, default_value = "30")]
    max_age: u64,

    /// How many seconds in the future a request may have been signed.
    /// Defaults to the value of --max-age.
    #[structopt(long, global = true)]
    max_skew: Option<u64>,

    /// A scope the public key holds when verifying. May be repeated.
    #[structopt(long = "grant", global = true, number_of_values = 1)]
    grants: Vec<String>,

    /// A scope the request requires when verifying. May be repeated.
    #[structopt(long = "scope", global = true, number_of_values = 1)]
    scopes: Vec<String>,
}

impl Opt {
    fn algorithm(&self) -> anyhow::Result<Arc<dyn HmacAlgorithm>> {
        algorithm_from_name(&self.algorithm)
            .ok_or_else(|| anyhow!("Unknown algorithm: {}", self.algorithm))
    }
    fn time(&self) -> anyhow::Result<DateTime<Utc>> {
        match &self.time {
            Some(time) => {
                parse_timestamp(time).with_context(|| format!("Invalid time: {:?}", time))
            }
            None => Ok(Utc::now()),
        }
    }
    fn credentials(&self) -> anyhow::Result<(&str, &[u8])> {
        let key = self.key.as_deref().context("No public key provided")?;
        let secret = self.secret.as_deref().context("No secret provided")?;
        Ok((key, secret.as_bytes()))
    }
    fn time_window(&self) -> TimeWindow {
        let max_age = Duration::from_secs(self.max_age);
        match self.max_skew {
            Some(max_skew) => TimeWindow::Asymmetric {
                max_age,
                max_skew: Duration::from_secs(max_skew),
            },
            None => TimeWindow::Symmetric(max_age),
        }
    }
    fn signing_config(&self) -> anyhow::Result<SigningConfig> {
        let (key, secret) = self.credentials()?;
        Ok(SigningConfig::new(key, secret).with_shared_algorithm(self.algorithm()?))
    }
    fn validator(&self) -> anyhow::Result<Validator> {
        let (key, secret) = self.credentials()?;
        let credential = Credential::new(secret).with_scopes(self.grants.iter().cloned());
        let provider = SimpleSecretProvider::new(vec![(key, credential)]);
        Ok(Validator::new(self.time_window(), provider).with_shared_algorithm(self.algorithm()?))
    }
    fn verify(&self, req: &MockRequest) -> anyhow::Result<Result<(), ValidationError>> {
        let validator = self.validator()?;
        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        Ok(validator.validate_request_at(req, &scopes, self.time()?))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let opt = Opt::from_args();

    let mut req = MockRequest::from_reader(&mut io::stdin().lock())?;

    log::info!("{:?}", req);

    match opt.mode {
        Mode::Fingerprint => {
            writeln!(io::stdout().lock(), "{}", req.fingerprint())?;
        }
        Mode::Sign => {
            req.sign_at(&opt.signing_config()?, opt.time()?)?;
            req.write(&mut io::stdout().lock())?;
        }
        Mode::Verify => {
            if let Err(e) = opt.verify(&req)? {
                return Err(anyhow!("{} ({})", e, e.status_code()).into());
            }
        }
    }

    Ok(())
}
