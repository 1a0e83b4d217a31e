/// Connection authentication
use axum::http::{header, HeaderMap};

/// Decides whether a presented bearer token may open a terminal
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: Option<&str>) -> bool;
}

/// Accepts every connection. Only for a gateway nobody else can reach.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl TokenVerifier for AllowAll {
    fn verify(&self, _token: Option<&str>) -> bool {
        true
    }
}

/// Compares against one configured secret
#[derive(Clone)]
pub struct StaticToken {
    secret: String,
}

impl StaticToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken").finish_non_exhaustive()
    }
}

impl TokenVerifier for StaticToken {
    fn verify(&self, token: Option<&str>) -> bool {
        match token.map(str::trim) {
            Some(token) if !token.is_empty() => constant_time_eq(token.as_bytes(), self.secret.as_bytes()),
            _ => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `Authorization: Bearer <token>`
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}
