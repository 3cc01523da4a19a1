//! Request auth (§3 Identity, §6 `permission-denied`/`login-required`).
//! The peer's uid comes from `SO_PEERCRED` via axum's Unix-socket connect
//! info; a `basic` identity is checked against an `Authorization: Basic`
//! header. An empty identity map means no identity file was configured, in
//! which case the socket's own file permissions are the access boundary
//! and every caller is trusted as `admin` (§1 scopes provisioning/signing
//! of identities out of this implementation).

use axum::extract::connect_info::ConnectInfo;
use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use warden_config::Credential;
use warden_types::AccessLevel;

use warden_config::IdentityMap;

use crate::error::ApiError;
use crate::state::AppState;

/// The resolved access level for the current request, inserted into
/// request extensions by [`authenticate`] and read back by route handlers
/// via the `Extension` extractor.
#[derive(Debug, Clone, Copy)]
pub struct CallerAccess(pub AccessLevel);

fn resolve(identity: &IdentityMap, uid: Option<u32>, basic: Option<(&str, &str)>) -> Option<AccessLevel> {
    if identity.is_empty() {
        return Some(AccessLevel::Admin);
    }

    if let Some(uid) = uid {
        if let Some(entry) = identity.values().find(|entry| matches!(entry.credential, Credential::Local { uid: u } if u == uid)) {
            return Some(entry.access);
        }
    }

    if let Some((name, password)) = basic {
        let hash = warden_config::hash_password(password);
        if let Some(entry) = identity.get(name) {
            if matches!(&entry.credential, Credential::Basic { password_hash } if *password_hash == hash) {
                return Some(entry.access);
            }
        }
    }

    None
}

fn parse_basic_auth(req: &Request) -> Option<(String, String)> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (name, password) = text.split_once(':')?;
    Some((name.to_string(), password.to_string()))
}

/// Tower middleware (via `axum::middleware::from_fn_with_state`) that
/// resolves the caller's access level and fails the request outright with
/// `login-required` when no identity matches.
pub async fn authenticate(axum::extract::State(state): axum::extract::State<std::sync::Arc<AppState>>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let uid = req
        .extensions()
        .get::<ConnectInfo<axum::extract::connect_info::UdsConnectInfo>>()
        .map(|ConnectInfo(info)| info.peer_cred.uid());

    let basic = parse_basic_auth(&req);
    let basic_ref = basic.as_ref().map(|(name, password)| (name.as_str(), password.as_str()));

    let access = resolve(&state.identity, uid, basic_ref).ok_or(ApiError::LoginRequired)?;
    req.extensions_mut().insert(CallerAccess(access));
    Ok(next.run(req).await)
}

/// Routes call this first to enforce their minimum access level (§3
/// `AccessLevel` is ordered `metrics < read < admin`).
pub fn require(caller: CallerAccess, minimum: AccessLevel) -> Result<(), ApiError> {
    if caller.0 >= minimum {
        Ok(())
    } else {
        Err(ApiError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use warden_config::IdentityEntry;

    use super::*;

    #[test]
    fn empty_identity_map_trusts_every_caller_as_admin() {
        let identity = IdentityMap::new();
        assert_eq!(resolve(&identity, Some(1000), None), Some(AccessLevel::Admin));
    }

    #[test]
    fn unmatched_uid_with_a_configured_identity_map_is_unauthenticated() {
        let mut identity = IdentityMap::new();
        identity.insert(
            "alice".to_string(),
            IdentityEntry {
                access: AccessLevel::Admin,
                credential: Credential::Local { uid: 1000 },
            },
        );
        assert_eq!(resolve(&identity, Some(2000), None), None);
        assert_eq!(resolve(&identity, Some(1000), None), Some(AccessLevel::Admin));
    }

    #[test]
    fn basic_credential_checks_the_password_hash() {
        let mut identity = IdentityMap::new();
        identity.insert(
            "bob".to_string(),
            IdentityEntry {
                access: AccessLevel::Read,
                credential: Credential::Basic {
                    password_hash: warden_config::hash_password("hunter2"),
                },
            },
        );
        assert_eq!(resolve(&identity, None, Some(("bob", "wrong"))), None);
        assert_eq!(resolve(&identity, None, Some(("bob", "hunter2"))), Some(AccessLevel::Read));
    }
}
