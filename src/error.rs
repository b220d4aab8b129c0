use thiserror::Error;

/// The one fatal error of a run: login was attempted and rejected. Not
/// retried, since the credentials are wrong or the account is locked, and
/// hammering the login endpoint helps nobody. Everything recoverable (a bad
/// page, a bad record, a missing field) degrades to `None` at the smallest
/// unit instead.
///
/// Carries everything the operator needs to debug the rejection; the form
/// keys are names only, never the secret values.
#[derive(Error, Debug)]
#[error("authentication failed: status {status}, url {url}, form keys [{form_keys}]")]
pub struct AuthError {
    pub status: u16,
    pub url: String,
    pub form_keys: String,
}
