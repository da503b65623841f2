//! OCI distribution-spec registry client: manifest and blob GETs with
//! bearer-token challenge-response authentication.

use std::cell::RefCell;
use std::collections::HashMap;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub const MANIFEST_ACCEPT: &str =
    "application/vnd.oci.image.manifest.v1+json, application/vnd.docker.distribution.manifest.v2+json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("request to {0} failed: {1}")]
    Request(String, #[source] reqwest::Error),
    #[error("registry returned {0} for {1}")]
    UnexpectedStatus(StatusCode, String),
    #[error("missing or unparsable WWW-Authenticate challenge: {0}")]
    InvalidChallenge(String),
    #[error("could not obtain a bearer token from {0}: {1}")]
    TokenRequest(String, StatusCode),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "access_token")]
    token: String,
}

struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

fn parse_bearer_challenge(value: &HeaderValue) -> Result<BearerChallenge, RegistryError> {
    let raw = value
        .to_str()
        .map_err(|_| RegistryError::InvalidChallenge("non-ASCII header".to_string()))?;
    let rest = raw
        .strip_prefix("Bearer ")
        .ok_or_else(|| RegistryError::InvalidChallenge(raw.to_string()))?;

    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for field in rest.split(',') {
        let field = field.trim();
        if let Some((key, val)) = field.split_once('=') {
            let val = val.trim_matches('"');
            match key {
                "realm" => realm = Some(val.to_string()),
                "service" => service = Some(val.to_string()),
                "scope" => scope = Some(val.to_string()),
                _ => {}
            }
        }
    }

    Ok(BearerChallenge {
        realm: realm.ok_or_else(|| RegistryError::InvalidChallenge(raw.to_string()))?,
        service,
        scope,
    })
}

/// A thin OCI registry client. Tokens obtained via the bearer challenge are
/// cached in-memory per registry host for the lifetime of one invocation, so
/// a manifest fetch followed by several blob fetches re-authenticates once.
pub struct Registry {
    client: Client,
    token_cache: RefCell<HashMap<String, String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .gzip(true)
                .build()
                .expect("failed to build HTTP client"),
            token_cache: RefCell::new(HashMap::new()),
        }
    }

    fn token_for(&self, challenge: &BearerChallenge) -> Result<String, RegistryError> {
        if let Some(cached) = self.token_cache.borrow().get(&challenge.realm) {
            return Ok(cached.clone());
        }

        let mut request = self.client.get(&challenge.realm);
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(service) = &challenge.service {
            query.push(("service", service));
        }
        if let Some(scope) = &challenge.scope {
            query.push(("scope", scope));
        }
        let response = request
            .query(&query)
            .send()
            .map_err(|e| RegistryError::Request(challenge.realm.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::TokenRequest(challenge.realm.clone(), status));
        }

        let parsed: TokenResponse = response
            .json()
            .map_err(|e| RegistryError::Request(challenge.realm.clone(), e))?;

        self.token_cache
            .borrow_mut()
            .insert(challenge.realm.clone(), parsed.token.clone());
        Ok(parsed.token)
    }

    /// Performs an authenticated GET, transparently handling the
    /// bearer-token challenge-response exchange on a 401.
    pub fn get(&self, url: &str, headers: Option<HeaderMap>) -> Result<Response, RegistryError> {
        let send = |token: Option<&str>| -> Result<Response, RegistryError> {
            let mut request = self.client.get(url);
            if let Some(h) = headers.clone() {
                request = request.headers(h);
            }
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            request
                .send()
                .map_err(|e| RegistryError::Request(url.to_string(), e))
        };

        let response = send(None)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge_header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .ok_or_else(|| RegistryError::InvalidChallenge("no WWW-Authenticate header".to_string()))?
            .clone();
        let challenge = parse_bearer_challenge(&challenge_header)?;
        let token = self.token_for(&challenge)?;

        let response = send(Some(&token))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(RegistryError::UnexpectedStatus(
                response.status(),
                url.to_string(),
            ))
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_realm_service_and_scope_from_bearer_challenge() {
        let value = HeaderValue::from_static(
            "Bearer realm=\"https://auth.docker.io/token\",service=\"registry.docker.io\",scope=\"repository:library/alpine:pull\"",
        );
        let challenge = parse_bearer_challenge(&value).unwrap();
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service.as_deref(), Some("registry.docker.io"));
        assert_eq!(
            challenge.scope.as_deref(),
            Some("repository:library/alpine:pull")
        );
    }

    #[test]
    fn rejects_a_non_bearer_challenge() {
        let value = HeaderValue::from_static("Basic realm=\"test\"");
        assert!(parse_bearer_challenge(&value).is_err());
    }
}
