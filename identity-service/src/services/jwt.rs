//! Signed-token issuance and validation.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{EffectivePermissions, PrincipalKind, Role};

/// JWT service for token generation and validation.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

/// Claims for access tokens (short-lived). Carries everything downstream
/// authorization needs so permission checks never re-read the store within
/// a token's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Principal id
    pub sub: Uuid,
    /// Principal kind
    pub kind: PrincipalKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_level: Option<i32>,
    /// Effective permission set at issuance time
    pub permissions: EffectivePermissions,
    /// Login origin, recorded for Business/Root principals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Login source address, recorded for Business/Root principals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Token id, for denylisting
    pub jti: String,
}

/// Claims for refresh tokens (long-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: Uuid,
    pub kind: PrincipalKind,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// Token pair returned to the client.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Inputs for one token-pair issuance.
#[derive(Debug, Clone)]
pub struct ClaimSet {
    pub principal_id: Uuid,
    pub kind: PrincipalKind,
    pub role: Option<Role>,
    pub permissions: EffectivePermissions,
    pub origin: Option<String>,
    pub ip: Option<String>,
}

/// An issued pair plus the ids needed for rotation bookkeeping.
#[derive(Debug)]
pub struct IssuedPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_jti: String,
    pub expires_in: i64,
}

impl IssuedPair {
    pub fn into_response(self) -> TokenResponse {
        TokenResponse {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.expires_in,
        }
    }
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT secret must be at least 32 bytes, got {}",
                config.secret.len()
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        })
    }

    /// Issue an access/refresh pair for a claim set.
    pub fn issue_pair(&self, claims: ClaimSet) -> Result<IssuedPair, anyhow::Error> {
        let now = Utc::now();
        let access_exp = now + Duration::minutes(self.access_token_expiry_minutes);
        let refresh_exp = now + Duration::days(self.refresh_token_expiry_days);
        let refresh_jti = Uuid::new_v4().to_string();

        let access_claims = AccessTokenClaims {
            sub: claims.principal_id,
            kind: claims.kind,
            role: claims.role.as_ref().map(|r| r.name.clone()),
            role_level: claims.role.as_ref().map(|r| r.level),
            permissions: claims.permissions,
            origin: claims.origin,
            ip: claims.ip,
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let refresh_claims = RefreshTokenClaims {
            sub: claims.principal_id,
            kind: claims.kind,
            exp: refresh_exp.timestamp(),
            iat: now.timestamp(),
            jti: refresh_jti.clone(),
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access_claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;
        let refresh_token = encode(&header, &refresh_claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))?;

        Ok(IssuedPair {
            access_token,
            refresh_token,
            refresh_jti,
            expires_in: self.access_token_expiry_seconds(),
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(token_data.claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<RefreshTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid refresh token: {}", e))?;

        Ok(token_data.claims)
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_expiry_days(&self) -> i64 {
        self.refresh_token_expiry_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use std::collections::BTreeSet;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "a-test-secret-that-is-long-enough-0123456789".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        }
    }

    fn claim_set(kind: PrincipalKind) -> ClaimSet {
        ClaimSet {
            principal_id: Uuid::new_v4(),
            kind,
            role: Some(Role::distributor()),
            permissions: EffectivePermissions::Granted(BTreeSet::from([
                "wallet.view".to_string()
            ])),
            origin: Some("https://portal.example.com".to_string()),
            ip: Some("203.0.113.7".to_string()),
        }
    }

    #[test]
    fn test_pair_issuance_and_validation() {
        let jwt = JwtService::new(&test_config()).unwrap();
        let claims = claim_set(PrincipalKind::Business);
        let principal_id = claims.principal_id;

        let pair = jwt.issue_pair(claims).unwrap();
        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());

        let access = jwt.validate_access_token(&pair.access_token).unwrap();
        assert_eq!(access.sub, principal_id);
        assert_eq!(access.kind, PrincipalKind::Business);
        assert_eq!(access.role.as_deref(), Some("DISTRIBUTOR"));
        assert!(access.permissions.allows("wallet.view"));
        assert_eq!(access.origin.as_deref(), Some("https://portal.example.com"));

        let refresh = jwt.validate_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, principal_id);
        assert_eq!(refresh.jti, pair.refresh_jti);
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_root_all_permissions_sentinel_survives_round_trip() {
        let jwt = JwtService::new(&test_config()).unwrap();
        let pair = jwt
            .issue_pair(ClaimSet {
                principal_id: Uuid::new_v4(),
                kind: PrincipalKind::Root,
                role: None,
                permissions: EffectivePermissions::All,
                origin: None,
                ip: None,
            })
            .unwrap();

        let access = jwt.validate_access_token(&pair.access_token).unwrap();
        assert_eq!(access.permissions, EffectivePermissions::All);
        assert!(access.permissions.allows("anything.at.all"));
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let jwt = JwtService::new(&test_config()).unwrap();
        let pair = jwt.issue_pair(claim_set(PrincipalKind::Employee)).unwrap();
        let mut tampered = pair.access_token.clone();
        tampered.push('x');
        assert!(jwt.validate_access_token(&tampered).is_err());
        // A refresh token is not a valid access token payload
        assert!(jwt.validate_access_token(&pair.refresh_token).is_err());
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let config = JwtConfig {
            secret: "too-short".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        };
        assert!(JwtService::new(&config).is_err());
    }
}
