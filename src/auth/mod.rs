use std::collections::HashSet;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// Role assumed when a token carries no `role` claim
pub const DEFAULT_ROLE: &str = "user";

/// Claim names accepted as the subject, in priority order.
/// The auth service signs `userId`; older tokens carry `id`.
const SUBJECT_CLAIMS: &[&str] = &["sub", "userId", "id"];

/// Verified caller identity, scoped to a single request
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub subject_id: String,
    pub email: Option<String>,
    pub role: String,
    pub raw_claims: Map<String, Value>,
}

impl Identity {
    /// Extract identity from verified claims. The subject is mandatory.
    pub fn from_claims(claims: Map<String, Value>) -> Result<Self, GatewayError> {
        let subject_id = SUBJECT_CLAIMS
            .iter()
            .find_map(|name| claim_as_string(claims.get(*name)))
            .ok_or_else(|| GatewayError::InvalidCredential("token has no subject claim".to_string()))?;

        let email = claim_as_string(claims.get("email"));
        let role = claim_as_string(claims.get("role")).unwrap_or_else(|| DEFAULT_ROLE.to_string());

        Ok(Self {
            subject_id,
            email,
            role,
            raw_claims: claims,
        })
    }
}

// Ids may be serialized as strings or numbers
fn claim_as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Validates bearer credentials against the shared signing secret.
///
/// Built once at startup; verification is a pure function of the header
/// value and the key material, so one instance serves every request.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a raw `Authorization` header value and return the caller identity
    pub fn verify(&self, raw_header: Option<&str>) -> Result<Identity, GatewayError> {
        let token = extract_bearer_token(raw_header)?;

        let token_data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)
            .map_err(|e| GatewayError::InvalidCredential(e.to_string()))?;

        Identity::from_claims(token_data.claims)
    }
}

/// Extract the token from a `Bearer <token>` header value
fn extract_bearer_token(raw_header: Option<&str>) -> Result<&str, GatewayError> {
    let header = raw_header
        .ok_or_else(|| GatewayError::MissingCredential("Missing Authorization header".to_string()))?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        GatewayError::MissingCredential("Authorization header must use Bearer token format".to_string())
    })?;

    let token = token.trim();
    if token.is_empty() {
        return Err(GatewayError::MissingCredential("Empty bearer token".to_string()));
    }

    Ok(token)
}
