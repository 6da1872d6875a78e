use axum::http::{header::CONNECTION, HeaderMap, HeaderName, HeaderValue};

use crate::auth::Identity;

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_EMAIL: HeaderName = HeaderName::from_static("x-user-email");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");

/// Headers reserved for gateway-asserted identity
const IDENTITY_HEADER_PREFIX: &str = "x-user-";

/// Connection-scoped headers that must not be forwarded in either direction
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "host"
            | "content-length"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Drop hop-by-hop headers, including any the `Connection` header nominates.
/// Used on both outbound requests and passthrough responses.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let nominated: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    let mut doomed: Vec<HeaderName> = headers.keys().filter(|name| is_hop_by_hop(name)).cloned().collect();
    doomed.extend(nominated);
    for name in doomed {
        headers.remove(&name);
    }
}

/// Remove every client-supplied `X-User-*` header so identity can't be spoofed
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    // HeaderName is always lowercase, so the prefix test is case-insensitive
    let spoofed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with(IDENTITY_HEADER_PREFIX))
        .cloned()
        .collect();

    for name in spoofed {
        tracing::warn!("Discarding client-supplied identity header '{}'", name);
        headers.remove(&name);
    }
}

/// Build the outbound header set for a downstream call.
///
/// Client `X-User-*` headers are always removed. When an identity is present
/// the verified values are asserted in their place. `Authorization` and
/// `Content-Type` pass through untouched.
pub fn attach(identity: Option<&Identity>, mut headers: HeaderMap) -> HeaderMap {
    strip_hop_by_hop(&mut headers);
    strip_identity_headers(&mut headers);

    let Some(identity) = identity else {
        return headers;
    };

    insert_identity_header(&mut headers, X_USER_ID, &identity.subject_id);
    if let Some(email) = &identity.email {
        insert_identity_header(&mut headers, X_USER_EMAIL, email);
    }
    insert_identity_header(&mut headers, X_USER_ROLE, &identity.role);

    tracing::debug!(
        user_id = %identity.subject_id,
        role = %identity.role,
        "Forwarding user identity"
    );

    headers
}

fn insert_identity_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => {
            // Claim contains bytes that are illegal in a header; omit rather than forward garbage
            tracing::warn!("Identity claim for '{}' is not a valid header value, omitting", name);
        }
    }
}
