//! Authentication flows: login, logout, refresh rotation, password reset
//! and email verification. Every attempt, successful or not, produces an
//! audit record; the caller only ever sees the coarse error taxonomy.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use crate::models::{actions, reasons, AuditRecord, Principal, SanitizedPrincipal};

use super::audit::AuditRecorder;
use super::error::ServiceError;
use super::jwt::{ClaimSet, IssuedPair, JwtService};
use super::kv::SharedKv;
use super::notify::Notifier;
use super::permissions::effective_permissions;
use super::secrets::SecretCodec;
use super::store::{IdentityStore, SwapOutcome};
use super::whitelist::WhitelistValidator;

const RESET_TOKEN_TTL_MINUTES: i64 = 30;

const AUDIT_ENTITY: &str = "session";
const AUDIT_ENTITY_CREDENTIAL: &str = "credential";

/// Windowed limit on failed login attempts per identifier.
#[derive(Debug, Clone, Copy)]
pub struct AttemptPolicy {
    pub max_attempts: u64,
    pub window_seconds: i64,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,
        }
    }
}

/// Successful login result.
#[derive(Debug)]
pub struct LoginOutcome {
    pub tokens: IssuedPair,
    pub principal: SanitizedPrincipal,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn IdentityStore>,
    kv: Arc<dyn SharedKv>,
    jwt: JwtService,
    secrets: SecretCodec,
    whitelist: WhitelistValidator,
    audit: AuditRecorder,
    notifier: Arc<dyn Notifier>,
    attempts: AttemptPolicy,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        kv: Arc<dyn SharedKv>,
        jwt: JwtService,
        secrets: SecretCodec,
        audit: AuditRecorder,
        notifier: Arc<dyn Notifier>,
        attempts: AttemptPolicy,
    ) -> Self {
        Self {
            whitelist: WhitelistValidator::new(store.clone()),
            store,
            kv,
            jwt,
            secrets,
            audit,
            notifier,
            attempts,
        }
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn secrets(&self) -> &SecretCodec {
        &self.secrets
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    async fn audit_login_failure(
        &self,
        identifier: &str,
        reason: &str,
        ip: Option<&str>,
        principal: Option<&Principal>,
    ) {
        let mut record = AuditRecord::new(
            actions::LOGIN_FAILED,
            AUDIT_ENTITY,
            format!("Login failed for {}", identifier),
        )
        .ip(ip)
        .metadata(json!({ "reason": reason, "identifier": identifier }));
        if let Some(principal) = principal {
            record = record.entity_id(principal.id());
        }
        self.audit.emit_sync(record).await;
    }

    /// Authenticate an identifier/password pair from a given origin and
    /// address. The identifier may be an email (case-insensitive) or a
    /// username (exact).
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        origin: Option<&str>,
        ip: Option<&str>,
    ) -> Result<LoginOutcome, ServiceError> {
        let counter_key = format!("login:{}", identifier.to_lowercase());
        let attempt = self
            .kv
            .incr_counter(&counter_key, self.attempts.window_seconds)
            .await
            .map_err(ServiceError::Internal)?;
        if attempt > self.attempts.max_attempts {
            self.audit_login_failure(identifier, reasons::RATE_LIMITED, ip, None)
                .await;
            return Err(ServiceError::TooManyAttempts {
                retry_after_seconds: self.attempts.window_seconds as u64,
            });
        }

        let principal = match self.store.resolve_identifier(identifier).await? {
            Some(principal) => principal,
            None => {
                // Equalize work with the known-identifier path
                self.secrets.burn(password);
                self.audit_login_failure(identifier, reasons::USER_NOT_FOUND, ip, None)
                    .await;
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if !self
            .secrets
            .verify_secret(password, &principal.base().password_enc)?
        {
            self.audit_login_failure(identifier, reasons::INVALID_PASSWORD, ip, Some(&principal))
                .await;
            return Err(ServiceError::InvalidCredentials);
        }

        // Correct password against a disabled account names the status; an
        // attacker without the password never learns it.
        if !principal.base().is_active() {
            let status = principal.status();
            self.audit_login_failure(identifier, status.as_str(), ip, Some(&principal))
                .await;
            return Err(ServiceError::AccountDisabled(status));
        }

        if let Err(rejection) = self.whitelist.check_login(&principal, origin, ip).await? {
            self.audit_login_failure(identifier, rejection.reason(), ip, Some(&principal))
                .await;
            return Err(rejection.into());
        }

        let tokens = self
            .jwt
            .issue_pair(ClaimSet {
                principal_id: principal.id(),
                kind: principal.kind(),
                role: principal.role().cloned(),
                permissions: effective_permissions(&principal),
                origin: origin.map(|s| s.to_string()),
                ip: ip.map(|s| s.to_string()),
            })
            .map_err(ServiceError::Internal)?;

        // One active session per principal: a new login replaces any
        // previously stored refresh token.
        let refresh_hash = SecretCodec::hash_token(&tokens.refresh_token);
        self.store
            .set_refresh_token(principal.kind(), principal.id(), Some(&refresh_hash))
            .await?;

        self.kv
            .reset_counter(&counter_key)
            .await
            .map_err(ServiceError::Internal)?;

        self.audit
            .emit_sync(
                AuditRecord::new(
                    actions::LOGIN_SUCCESS,
                    AUDIT_ENTITY,
                    format!("{} logged in", identifier),
                )
                .entity_id(principal.id())
                .performer(principal.id(), principal.kind())
                .ip(ip)
                .metadata(json!({ "kind": principal.kind().as_str() })),
            )
            .await;

        Ok(LoginOutcome {
            tokens,
            principal: principal.sanitized(),
        })
    }

    /// Revoke the presented access token and drop the stored refresh token.
    /// Best-effort: a stale or unknown session still logs out cleanly.
    pub async fn logout(
        &self,
        claims: &super::jwt::AccessTokenClaims,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        let remaining = (claims.exp - Utc::now().timestamp()).max(1);
        if let Err(e) = self.kv.deny_token(&claims.jti, remaining).await {
            // The token still dies at its natural expiry; a lost denylist
            // write must not keep the caller logged in.
            tracing::error!(error = %e, "Failed to denylist access token on logout");
        }

        self.store
            .set_refresh_token(claims.kind, claims.sub, None)
            .await?;

        self.audit
            .emit_sync(
                AuditRecord::new(actions::LOGOUT, AUDIT_ENTITY, "Session terminated")
                    .entity_id(claims.sub)
                    .performer(claims.sub, claims.kind)
                    .ip(ip),
            )
            .await;

        Ok(())
    }

    /// Rotate a refresh token. The presented token must be the one stored
    /// for the principal; concurrent rotations of the same token produce
    /// exactly one winner, and a replay of a rotated token invalidates the
    /// whole session.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ip: Option<&str>,
    ) -> Result<IssuedPair, ServiceError> {
        let claims = match self.jwt.validate_refresh_token(refresh_token) {
            Ok(claims) => claims,
            Err(_) => {
                self.audit
                    .emit_sync(
                        AuditRecord::new(
                            actions::REFRESH_TOKEN_INVALID,
                            AUDIT_ENTITY,
                            "Refresh rejected: expired or malformed token",
                        )
                        .ip(ip)
                        .metadata(json!({ "reason": reasons::TOKEN_EXPIRED_OR_MALFORMED })),
                    )
                    .await;
                return Err(ServiceError::InvalidToken);
            }
        };

        if self
            .kv
            .is_token_denied(&claims.jti)
            .await
            .map_err(ServiceError::Internal)?
        {
            // A denylisted refresh token is a replay of one already rotated
            // out or revoked; the whole session is compromised, not just
            // this request.
            if let Some(principal) = self.store.resolve_by_id(claims.kind, claims.sub).await? {
                self.invalidate_session(&principal, &claims.jti, claims.exp, ip)
                    .await?;
            } else {
                self.audit
                    .emit_sync(
                        AuditRecord::new(
                            actions::REFRESH_TOKEN_INVALID,
                            AUDIT_ENTITY,
                            "Refresh rejected: denylisted token",
                        )
                        .entity_id(claims.sub)
                        .ip(ip)
                        .metadata(json!({ "reason": reasons::TOKEN_DENYLISTED })),
                    )
                    .await;
            }
            return Err(ServiceError::InvalidToken);
        }

        let principal = match self.store.resolve_by_id(claims.kind, claims.sub).await? {
            Some(principal) => principal,
            None => {
                self.audit
                    .emit_sync(
                        AuditRecord::new(
                            actions::REFRESH_TOKEN_USER_NOT_FOUND,
                            AUDIT_ENTITY,
                            "Refresh rejected: principal no longer exists",
                        )
                        .entity_id(claims.sub)
                        .ip(ip),
                    )
                    .await;
                return Err(ServiceError::InvalidToken);
            }
        };

        if !principal.base().is_active() {
            let status = principal.status();
            self.audit
                .emit_sync(
                    AuditRecord::new(
                        actions::REFRESH_TOKEN_INVALID,
                        AUDIT_ENTITY,
                        "Refresh rejected: account disabled",
                    )
                    .entity_id(principal.id())
                    .ip(ip)
                    .metadata(json!({ "reason": status.as_str() })),
                )
                .await;
            return Err(ServiceError::AccountDisabled(status));
        }

        let presented_hash = SecretCodec::hash_token(refresh_token);
        let stored_matches = principal
            .base()
            .refresh_token_hash
            .as_deref()
            .map(|stored| SecretCodec::verify_token(refresh_token, stored))
            .unwrap_or(false);
        if !stored_matches {
            // Replay of a rotated token, or a token from a session that was
            // since logged out: kill the whole session.
            self.invalidate_session(&principal, &claims.jti, claims.exp, ip)
                .await?;
            return Err(ServiceError::InvalidToken);
        }

        let tokens = self
            .jwt
            .issue_pair(ClaimSet {
                principal_id: principal.id(),
                kind: principal.kind(),
                role: principal.role().cloned(),
                permissions: effective_permissions(&principal),
                origin: None,
                ip: ip.map(|s| s.to_string()),
            })
            .map_err(ServiceError::Internal)?;
        let new_hash = SecretCodec::hash_token(&tokens.refresh_token);

        // Compare-and-set: the loser of a concurrent rotation lands here
        // with a stale expected hash.
        let outcome = self
            .store
            .swap_refresh_token(principal.kind(), principal.id(), &presented_hash, &new_hash)
            .await?;
        if outcome == SwapOutcome::Lost {
            self.invalidate_session(&principal, &claims.jti, claims.exp, ip)
                .await?;
            return Err(ServiceError::InvalidToken);
        }

        // The rotated-out token stays dead for the rest of its lifetime
        let remaining = (claims.exp - Utc::now().timestamp()).max(1);
        self.kv
            .deny_token(&claims.jti, remaining)
            .await
            .map_err(ServiceError::Internal)?;

        self.audit
            .emit_sync(
                AuditRecord::new(
                    actions::REFRESH_TOKEN_SUCCESS,
                    AUDIT_ENTITY,
                    "Refresh token rotated",
                )
                .entity_id(principal.id())
                .performer(principal.id(), principal.kind())
                .ip(ip),
            )
            .await;

        Ok(tokens)
    }

    async fn invalidate_session(
        &self,
        principal: &Principal,
        jti: &str,
        exp: i64,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.store
            .set_refresh_token(principal.kind(), principal.id(), None)
            .await?;
        let remaining = (exp - Utc::now().timestamp()).max(1);
        self.kv
            .deny_token(jti, remaining)
            .await
            .map_err(ServiceError::Internal)?;
        self.audit
            .emit_sync(
                AuditRecord::new(
                    actions::REFRESH_TOKEN_INVALID,
                    AUDIT_ENTITY,
                    "Refresh rejected: token mismatch, session invalidated",
                )
                .entity_id(principal.id())
                .ip(ip)
                .metadata(json!({ "reason": reasons::TOKEN_MISMATCH })),
            )
            .await;
        Ok(())
    }

    /// Start a password reset. The response is identical whether or not the
    /// email belongs to an account; a newer request invalidates any earlier
    /// outstanding token.
    pub async fn request_password_reset(
        &self,
        email: &str,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        let principal = match self.store.resolve_identifier(email).await? {
            Some(principal) if principal.base().is_active() => principal,
            _ => {
                self.secrets.burn(email);
                self.audit
                    .emit_sync(
                        AuditRecord::new(
                            actions::PASSWORD_RESET_REQUESTED,
                            AUDIT_ENTITY_CREDENTIAL,
                            "Password reset requested for unknown or inactive account",
                        )
                        .ip(ip)
                        .metadata(json!({ "reason": reasons::USER_NOT_FOUND })),
                    )
                    .await;
                return Ok(());
            }
        };

        let issued =
            SecretCodec::generate_secure_token(Duration::minutes(RESET_TOKEN_TTL_MINUTES));
        self.store
            .set_reset_token(
                principal.kind(),
                principal.id(),
                &issued.token_hash,
                issued.expires_at,
            )
            .await?;

        // Delivery is best-effort: the token is stored either way, and the
        // caller's response must not reveal whether mail went out.
        if let Err(e) = self
            .notifier
            .send_reset_link(&principal.base().email, &issued.token)
            .await
        {
            tracing::error!(error = %e, "Failed to send password reset link");
        }

        self.audit
            .emit_sync(
                AuditRecord::new(
                    actions::PASSWORD_RESET_REQUESTED,
                    AUDIT_ENTITY_CREDENTIAL,
                    "Password reset link issued",
                )
                .entity_id(principal.id())
                .ip(ip),
            )
            .await;

        Ok(())
    }

    /// Complete a password reset: the token is single-use, the account gets
    /// operator-issued credentials delivered out of band, and any active
    /// session is invalidated.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        let token_hash = SecretCodec::hash_token(token);
        let principal = match self.store.find_by_reset_token_hash(&token_hash).await? {
            Some(principal) => principal,
            None => {
                self.audit
                    .emit_sync(
                        AuditRecord::new(
                            actions::PASSWORD_RESET_FAILED,
                            AUDIT_ENTITY_CREDENTIAL,
                            "Password reset rejected: unknown or expired token",
                        )
                        .ip(ip),
                    )
                    .await;
                return Err(ServiceError::InvalidToken);
            }
        };

        let password = SecretCodec::generate_strong_password();
        let password_enc = self.secrets.encrypt(&password)?;
        self.store
            .set_password(principal.kind(), principal.id(), &password_enc)
            .await?;

        let pin = match &principal {
            Principal::Business(_) => {
                let pin = SecretCodec::generate_pin();
                let pin_enc = self.secrets.encrypt(&pin)?;
                self.store.set_pin(principal.id(), &pin_enc).await?;
                Some(pin)
            }
            _ => None,
        };

        // Single use
        self.store
            .clear_reset_token(principal.kind(), principal.id())
            .await?;

        // The new credentials are already live; failing the request now
        // would strand the account behind a consumed token.
        if let Err(e) = self
            .notifier
            .send_new_credentials(&principal.base().email, &password, pin.as_deref())
            .await
        {
            tracing::error!(error = %e, "Failed to send reissued credentials");
        }

        self.audit
            .emit_sync(
                AuditRecord::new(
                    actions::PASSWORD_RESET_COMPLETED,
                    AUDIT_ENTITY_CREDENTIAL,
                    "Password reset completed, new credentials issued",
                )
                .entity_id(principal.id())
                .ip(ip)
                .metadata(json!({ "pin_reissued": pin.is_some() })),
            )
            .await;

        Ok(())
    }

    /// Consume an email-verification token.
    pub async fn verify_email(&self, token: &str, ip: Option<&str>) -> Result<(), ServiceError> {
        let token_hash = SecretCodec::hash_token(token);
        let principal = match self
            .store
            .find_by_verification_token_hash(&token_hash)
            .await?
        {
            Some(principal) => principal,
            None => {
                self.audit
                    .emit_sync(
                        AuditRecord::new(
                            actions::EMAIL_VERIFICATION_FAILED,
                            AUDIT_ENTITY_CREDENTIAL,
                            "Email verification rejected: unknown or expired token",
                        )
                        .ip(ip),
                    )
                    .await;
                return Err(ServiceError::InvalidToken);
            }
        };

        self.store
            .consume_verification_token(principal.kind(), principal.id())
            .await?;

        self.audit
            .emit_sync(
                AuditRecord::new(
                    actions::EMAIL_VERIFIED,
                    AUDIT_ENTITY_CREDENTIAL,
                    "Email address verified",
                )
                .entity_id(principal.id())
                .performer(principal.id(), principal.kind())
                .ip(ip),
            )
            .await;

        Ok(())
    }

    /// Is an access token still live (signature valid and not denylisted)?
    pub async fn check_access_token(
        &self,
        token: &str,
    ) -> Result<super::jwt::AccessTokenClaims, ServiceError> {
        let claims = self
            .jwt
            .validate_access_token(token)
            .map_err(|_| ServiceError::InvalidToken)?;
        if self
            .kv
            .is_token_denied(&claims.jti)
            .await
            .map_err(ServiceError::Internal)?
        {
            return Err(ServiceError::InvalidToken);
        }
        Ok(claims)
    }

    pub async fn health(&self) -> Result<(), ServiceError> {
        self.store.health_check().await?;
        self.kv.health_check().await.map_err(ServiceError::Internal)
    }
}
