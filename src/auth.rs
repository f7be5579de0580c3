use crate::error::{AppError, AppResult};
use crate::schemas::{Group, MemberId};
use actix_web::{http::header::HeaderValue, HttpRequest};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::ParseIntError;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizationLevel {
    /// Caller presented the shared API secret; acts as an administrator.
    Service,
    Member(MemberId),
}

impl AuthorizationLevel {
    pub fn member_id(&self) -> Option<&str> {
        match self {
            AuthorizationLevel::Service => None,
            AuthorizationLevel::Member(id) => Some(id.as_str()),
        }
    }

    /// Member id to record as the author of a change. The service acts under its own name.
    pub fn actor(&self) -> MemberId {
        self.member_id().unwrap_or("service").to_string()
    }

    pub fn is_service(&self) -> bool {
        matches!(self, AuthorizationLevel::Service)
    }

    pub fn require_member(&self) -> AppResult<&str> {
        self.member_id()
            .ok_or_else(|| AppError::validation("this operation needs a member identity"))
    }

    pub fn require_service(&self) -> AppResult<()> {
        if self.is_service() {
            Ok(())
        } else {
            Err(AppError::forbidden("administrator access required"))
        }
    }

    pub fn require_leader(&self, group: &Group) -> AppResult<()> {
        match self {
            AuthorizationLevel::Service => Ok(()),
            AuthorizationLevel::Member(id) if group.is_leader(id) => Ok(()),
            AuthorizationLevel::Member(_) => Err(AppError::forbidden(format!(
                "only the leader of {} can do this",
                group.name
            ))),
        }
    }

    pub fn require_group_member(&self, group: &Group) -> AppResult<()> {
        match self {
            AuthorizationLevel::Service => Ok(()),
            AuthorizationLevel::Member(id) if group.has_member(id) => Ok(()),
            AuthorizationLevel::Member(_) => Err(AppError::forbidden(format!(
                "not a member of {}",
                group.name
            ))),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
struct MemberAuthData {
    member_id: MemberId,
    issued_at: String,
    hash: String,
}

pub fn check_authorization_level(request: &HttpRequest, secret: &str) -> Option<AuthorizationLevel> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    if authorization == secret {
        return Some(AuthorizationLevel::Service);
    }
    let auth_data: MemberAuthData = match serde_json::from_str(authorization) {
        Ok(json) => json,
        Err(err) => {
            debug!("Rejected malformed authorization header: {err}");
            return None;
        }
    };
    let hash = auth_data
        .hash
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|n| u8::from_str_radix(&String::from_iter(n), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()?;
    let mac = member_mac(&auth_data.member_id, &auth_data.issued_at, secret);
    if mac.verify_slice(&hash).is_ok() {
        Some(AuthorizationLevel::Member(auth_data.member_id))
    } else {
        debug!(member = %auth_data.member_id, "Rejected authorization with a bad hash");
        None
    }
}

pub fn authorize(request: &HttpRequest, secret: &str) -> AppResult<AuthorizationLevel> {
    check_authorization_level(request, secret).ok_or(AppError::Unauthorized)
}

/// Builds a member header value the same way the login front end does.
#[cfg(test)]
pub fn sign_member_token(member_id: &str, issued_at: &str, secret: &str) -> String {
    let hash = member_mac(member_id, issued_at, secret)
        .finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    let data = MemberAuthData {
        member_id: member_id.to_string(),
        issued_at: issued_at.to_string(),
        hash,
    };
    // A struct of plain strings always serializes.
    serde_json::to_string(&data).unwrap_or_default()
}

fn member_mac(member_id: &str, issued_at: &str, secret: &str) -> HmacSha256 {
    let hash_content = [("issued_at", issued_at), ("member_id", member_id)]
        .into_iter()
        .map(|(key, val)| format!("{}={}", key, val))
        .collect::<Vec<_>>()
        .join("\n");
    let mut sha256_hasher = Sha256::new();
    sha256_hasher.update(secret.as_bytes());
    let secret_hash = sha256_hasher.finalize();

    let mut hmac_hasher =
        HmacSha256::new_from_slice(&secret_hash).expect("HMAC accepts keys of any size");
    hmac_hasher.update(hash_content.as_bytes());
    hmac_hasher
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    const SECRET: &str = "s3cret";

    fn group() -> Group {
        Group {
            id: "g1".to_string(),
            name: "Flat 3B".to_string(),
            leader: "ana".to_string(),
            members: vec!["ana".to_string(), "ben".to_string()],
            audit_log: vec![],
        }
    }

    #[test]
    fn service_secret_grants_service_level() {
        let request = TestRequest::default()
            .insert_header(("Authorization", SECRET))
            .to_http_request();
        assert_eq!(
            check_authorization_level(&request, SECRET),
            Some(AuthorizationLevel::Service)
        );
    }

    #[test]
    fn signed_token_identifies_member() {
        let token = sign_member_token("ben", "1714000000", SECRET);
        let request = TestRequest::default()
            .insert_header(("Authorization", token))
            .to_http_request();
        assert_eq!(
            check_authorization_level(&request, SECRET),
            Some(AuthorizationLevel::Member("ben".to_string()))
        );
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = sign_member_token("ben", "1714000000", SECRET).replace("\"ben\"", "\"ana\"");
        let request = TestRequest::default()
            .insert_header(("Authorization", token))
            .to_http_request();
        assert_eq!(check_authorization_level(&request, SECRET), None);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = sign_member_token("ben", "1714000000", "other");
        let request = TestRequest::default()
            .insert_header(("Authorization", token))
            .to_http_request();
        assert_eq!(check_authorization_level(&request, SECRET), None);
    }

    #[test]
    fn missing_or_garbage_header_is_unauthorized() {
        let request = TestRequest::default().to_http_request();
        assert!(matches!(authorize(&request, SECRET), Err(AppError::Unauthorized)));

        let request = TestRequest::default()
            .insert_header(("Authorization", "not json"))
            .to_http_request();
        assert!(matches!(authorize(&request, SECRET), Err(AppError::Unauthorized)));
    }

    #[test]
    fn leader_and_member_checks() {
        let group = group();
        let ana = AuthorizationLevel::Member("ana".to_string());
        let ben = AuthorizationLevel::Member("ben".to_string());
        let cy = AuthorizationLevel::Member("cy".to_string());

        assert!(ana.require_leader(&group).is_ok());
        assert!(matches!(ben.require_leader(&group), Err(AppError::Forbidden(_))));
        assert!(AuthorizationLevel::Service.require_leader(&group).is_ok());

        assert!(ben.require_group_member(&group).is_ok());
        assert!(cy.require_group_member(&group).is_err());
        assert!(ben.require_service().is_err());
    }
}
