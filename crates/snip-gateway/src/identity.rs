//! Anonymous per-browser identity.
//!
//! Every request carries an owner token in the `uniq` cookie, formatted as
//! `<token>-<hex hmac-sha256(token)>`. A missing or forged cookie is replaced
//! by a fresh random token before the request reaches a handler.

use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::Sha256;
use tracing::{debug, warn};

pub const COOKIE_NAME: &str = "uniq";
const TOKEN_LEN: usize = 8;
const SECRET_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// The identity of the caller, available to handlers as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Signs and verifies owner tokens.
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl CookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())?,
        })
    }

    /// A signer with a throwaway secret. Cookies it issues do not survive a
    /// restart.
    pub fn ephemeral() -> Result<Self, InvalidLength> {
        let secret: [u8; SECRET_LEN] = rand::rng().random();
        Self::new(secret)
    }

    /// Returns `<token>-<hex signature>`.
    pub fn sign(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        format!("{token}-{}", hex::encode(mac.finalize().into_bytes()))
    }

    /// Extracts the token from a signed value, if the signature matches.
    pub fn verify<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (token, signature) = value.split_once('-')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(token)
    }
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

fn new_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Middleware attaching an [`Owner`] to every request.
pub async fn identify(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let signer = state.signer();

    let known = jar.get(COOKIE_NAME).and_then(|cookie| {
        let token = signer.verify(cookie.value());
        if token.is_none() {
            warn!("uniq cookie failed verification, issuing a new one");
        }
        token.map(str::to_owned)
    });

    if let Some(token) = known {
        request.extensions_mut().insert(Owner(token));
        return next.run(request).await;
    }

    let token = new_token();
    debug!(owner = %token, "issuing uniq cookie");
    let cookie = Cookie::build((COOKIE_NAME, signer.sign(&token)))
        .domain(state.cookie_domain().to_owned())
        .path("/")
        .max_age(time::Duration::days(365))
        .http_only(true)
        .build();

    request.extensions_mut().insert(Owner(token));
    let response = next.run(request).await;
    (CookieJar::new().add(cookie), response).into_response()
}
