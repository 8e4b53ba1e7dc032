pub mod audit;
pub mod auth;
pub mod credentials;
pub mod error;
pub mod jwt;
pub mod kv;
pub mod memory_store;
pub mod notify;
pub mod permissions;
pub mod pg_store;
pub mod secrets;
pub mod store;
pub mod whitelist;

pub use audit::{AuditRecorder, AuditSink, MemoryAuditSink, PgAuditSink};
pub use auth::{AttemptPolicy, AuthService, LoginOutcome};
pub use credentials::{CredentialService, CredentialUpdate};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, TokenResponse};
pub use kv::{MemoryKv, RedisKv, SharedKv};
pub use memory_store::MemoryStore;
pub use notify::{MockNotifier, Notifier, SentNotification, SmtpNotifier};
pub use pg_store::PgStore;
pub use secrets::SecretCodec;
pub use store::IdentityStore;
pub use whitelist::{validate_entries, WhitelistRejection, WhitelistValidator};
