//! Credential validation for the HTTP API.
//!
//! Two policies exist and exactly one is active per gateway: a static
//! username/password pair, or bearer tokens issued by an OpenID Connect
//! provider. Both expose the same `validate` operation.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::AuthConfig;

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while opening or consulting an authentication backend.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("OIDC discovery failed for issuer {issuer}")]
    Discovery {
        issuer: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("OIDC provider request failed")]
    Provider(#[from] reqwest::Error),

    #[error("OIDC provider answered {status}")]
    ProviderStatus { status: StatusCode },
}

/// The active authentication policy.
#[derive(Debug, Clone)]
pub enum Authenticator {
    Static(StaticCredentials),
    Oidc(OidcAuthenticator),
}

impl Authenticator {
    /// Builds the policy selected by `config` and prepares it for use.
    ///
    /// # Errors
    /// - `AuthError::Discovery` - OIDC provider metadata could not be fetched
    pub async fn open(config: &AuthConfig) -> Result<Self, AuthError> {
        match config {
            AuthConfig::Static { username, password } => Ok(Self::Static(
                StaticCredentials::new(username.clone(), password.clone()),
            )),
            AuthConfig::Oidc { issuer, client_id } => Ok(Self::Oidc(
                OidcAuthenticator::discover(issuer.clone(), client_id.clone()).await?,
            )),
        }
    }

    /// Checks a credential pair. For OIDC the secret is the access token and
    /// the username is ignored.
    ///
    /// # Errors
    /// - `AuthError::Provider` / `ProviderStatus` - Provider could not be consulted
    pub async fn validate(&self, username: &str, secret: &str) -> Result<bool, AuthError> {
        match self {
            Self::Static(credentials) => Ok(credentials.validate(username, secret)),
            Self::Oidc(oidc) => oidc.validate(secret).await,
        }
    }
}

/// A fixed username/password pair.
#[derive(Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl StaticCredentials {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    /// Compares both values without short-circuiting on the first mismatch.
    pub fn validate(&self, username: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(self.username.as_bytes(), username.as_bytes());
        let pass_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        user_ok & pass_ok
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Clone, Deserialize)]
struct ProviderMetadata {
    issuer: String,
    jwks_uri: String,
    userinfo_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    iss: String,
}

/// Validates bearer tokens against an OpenID Connect provider.
///
/// Tokens must be JWTs signed by one of the provider's published keys, whose
/// `iss` matches the provider, whose `aud` contains the configured client id
/// and which have not expired. When the provider advertises a userinfo
/// endpoint the token is also confirmed there.
#[derive(Debug, Clone)]
pub struct OidcAuthenticator {
    client_id: String,
    provider: ProviderMetadata,
    keys: Arc<RwLock<JwkSet>>,
    http: reqwest::Client,
}

impl OidcAuthenticator {
    /// Fetches the provider's discovery document and signing keys.
    ///
    /// # Errors
    /// - `AuthError::Discovery` - Request failed, returned a non-success
    ///   status, or the document lacks a `jwks_uri`
    pub async fn discover(issuer: String, client_id: String) -> Result<Self, AuthError> {
        let discovery_error = |source: reqwest::Error| AuthError::Discovery {
            issuer: issuer.clone(),
            source,
        };

        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(discovery_error)?;

        let url = format!("{}{DISCOVERY_PATH}", issuer.trim_end_matches('/'));
        debug!(issuer = %issuer, "Fetching OIDC discovery document");

        let provider = async {
            http.get(&url)
                .send()
                .await?
                .error_for_status()?
                .json::<ProviderMetadata>()
                .await
        }
        .await
        .map_err(discovery_error)?;

        let keys = fetch_keys(&http, &provider.jwks_uri)
            .await
            .map_err(discovery_error)?;
        debug!(issuer = %issuer, keys = keys.keys.len(), "Fetched OIDC signing keys");

        Ok(Self {
            client_id,
            provider,
            keys: Arc::new(RwLock::new(keys)),
            http,
        })
    }

    /// Validates an access token.
    ///
    /// # Errors
    /// - `AuthError::Provider` / `ProviderStatus` - Key or userinfo endpoint unreachable or failing
    pub async fn validate(&self, token: &str) -> Result<bool, AuthError> {
        let Ok(header) = decode_header(token) else {
            trace!("Rejecting token that is not a decodable JWT");
            return Ok(false);
        };

        let key = match self.signing_key(header.kid.as_deref()) {
            Some(key) => key,
            None => {
                // Unknown key id, the provider may have rotated its keys
                let keys = fetch_keys(&self.http, &self.provider.jwks_uri).await?;
                *self.keys.write() = keys;
                match self.signing_key(header.kid.as_deref()) {
                    Some(key) => key,
                    None => {
                        trace!(kid = ?header.kid, "Rejecting token signed with an unknown key");
                        return Ok(false);
                    }
                }
            }
        };

        let issuer = self.provider.issuer.trim_end_matches('/');
        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[issuer.to_string(), format!("{issuer}/")]);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        match decode::<Claims>(token, &key, &validation) {
            Ok(data) => trace!(iss = %data.claims.iss, "Token signature and claims valid"),
            Err(e) => {
                trace!(error = %e, "Rejecting token");
                return Ok(false);
            }
        }

        let Some(endpoint) = &self.provider.userinfo_endpoint else {
            return Ok(true);
        };

        let response = self.http.get(endpoint).bearer_auth(token).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status => Err(AuthError::ProviderStatus { status }),
        }
    }

    /// Key for `kid`, or the only published key when the token names none.
    fn signing_key(&self, kid: Option<&str>) -> Option<DecodingKey> {
        let keys = self.keys.read();
        let jwk = match kid {
            Some(kid) => keys.find(kid)?,
            None if keys.keys.len() == 1 => &keys.keys[0],
            None => return None,
        };
        DecodingKey::from_jwk(jwk).ok()
    }
}

async fn fetch_keys(http: &reqwest::Client, jwks_uri: &str) -> Result<JwkSet, reqwest::Error> {
    http.get(jwks_uri)
        .send()
        .await?
        .error_for_status()?
        .json::<JwkSet>()
        .await
}
