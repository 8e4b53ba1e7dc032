//! Origin and source-address allow-list checks applied at login.
//!
//! Entries belong to the hierarchy, not the individual: a business user is
//! checked against the entries of its lineage's policy owner, so every
//! account under one admin shares one allow-list.

use std::sync::Arc;

use service_core::error::AppError;

use crate::models::{BusinessUser, Principal, PrincipalKind, WhitelistEntry};

use super::error::ServiceError;
use super::store::IdentityStore;

/// Which of the two independent checks failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistRejection {
    Origin,
    Ip,
}

impl WhitelistRejection {
    /// Audit-metadata reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            WhitelistRejection::Origin => crate::models::reasons::ORIGIN_NOT_WHITELISTED,
            WhitelistRejection::Ip => crate::models::reasons::IP_NOT_WHITELISTED,
        }
    }
}

impl From<WhitelistRejection> for ServiceError {
    fn from(rejection: WhitelistRejection) -> Self {
        match rejection {
            WhitelistRejection::Origin => ServiceError::OriginNotWhitelisted,
            WhitelistRejection::Ip => ServiceError::IpNotWhitelisted,
        }
    }
}

fn normalize_host(value: &str) -> &str {
    let value = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .unwrap_or(value);
    value.trim_end_matches('/')
}

// Exact, case-sensitive comparison once the scheme prefix and a trailing
// slash are stripped; entries must be stored the way clients present them.
fn origin_matches(origin: &str, domain: &str) -> bool {
    normalize_host(origin) == normalize_host(domain)
}

/// Check a presented origin and address against a set of entries.
///
/// The two dimensions are independent: the origin must match some entry
/// with a domain, and the address must match some entry with an IP, but not
/// necessarily the same entry. A dimension no entry constrains is not
/// checked. An empty entry set imposes nothing.
pub fn validate_entries(
    entries: &[WhitelistEntry],
    origin: Option<&str>,
    ip: Option<&str>,
) -> Result<(), WhitelistRejection> {
    let domains: Vec<&str> = entries.iter().filter_map(|e| e.domain.as_deref()).collect();
    if !domains.is_empty() {
        let origin_ok = origin
            .map(|o| domains.iter().any(|d| origin_matches(o, d)))
            .unwrap_or(false);
        if !origin_ok {
            return Err(WhitelistRejection::Origin);
        }
    }

    let ips: Vec<&str> = entries
        .iter()
        .flat_map(|e| [e.server_ip.as_deref(), e.local_ip.as_deref()])
        .flatten()
        .collect();
    if !ips.is_empty() {
        let ip_ok = ip.map(|addr| ips.contains(&addr)).unwrap_or(false);
        if !ip_ok {
            return Err(WhitelistRejection::Ip);
        }
    }

    Ok(())
}

/// Resolves the policy owner for a principal and applies its entries.
#[derive(Clone)]
pub struct WhitelistValidator {
    store: Arc<dyn IdentityStore>,
}

impl WhitelistValidator {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Entries governing a business user: a level-0 admin answers to its
    /// creating Root's entries, everyone deeper answers to the entries of
    /// the admin at the apex of its hierarchy path.
    async fn business_policy_entries(
        &self,
        user: &BusinessUser,
    ) -> Result<Vec<WhitelistEntry>, AppError> {
        if user.role.is_admin() {
            return match user.base.created_by_id {
                Some(root_id) => {
                    self.store
                        .whitelist_entries(PrincipalKind::Root, root_id)
                        .await
                }
                None => Ok(Vec::new()),
            };
        }
        match user.hierarchy_apex() {
            Some(apex_id) => {
                self.store
                    .whitelist_entries(PrincipalKind::Business, apex_id)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Apply the whitelist to a login attempt. Employees are exempt.
    pub async fn check_login(
        &self,
        principal: &Principal,
        origin: Option<&str>,
        ip: Option<&str>,
    ) -> Result<Result<(), WhitelistRejection>, AppError> {
        let entries = match principal {
            Principal::Employee(_) => return Ok(Ok(())),
            Principal::Root(root) => {
                self.store
                    .whitelist_entries(PrincipalKind::Root, root.base.id)
                    .await?
            }
            Principal::Business(user) => self.business_policy_entries(user).await?,
        };
        Ok(validate_entries(&entries, origin, ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn entry() -> WhitelistEntry {
        WhitelistEntry::new(PrincipalKind::Root, Uuid::new_v4())
    }

    #[test]
    fn test_empty_entry_set_imposes_nothing() {
        assert_eq!(validate_entries(&[], Some("https://x.test"), Some("1.2.3.4")), Ok(()));
        assert_eq!(validate_entries(&[], None, None), Ok(()));
    }

    #[test]
    fn test_dimensions_are_checked_independently() {
        let entries = vec![
            entry().with_domain("portal.example.com"),
            entry().with_server_ip("198.51.100.10").with_local_ip("10.0.0.5"),
        ];

        // Both dimensions satisfied, by different entries
        assert_eq!(
            validate_entries(&entries, Some("https://portal.example.com"), Some("10.0.0.5")),
            Ok(())
        );

        // Origin matches but the address matches no entry
        assert_eq!(
            validate_entries(&entries, Some("https://portal.example.com"), Some("203.0.113.9")),
            Err(WhitelistRejection::Ip)
        );

        // Address matches but the origin matches no entry
        assert_eq!(
            validate_entries(&entries, Some("https://evil.example.net"), Some("198.51.100.10")),
            Err(WhitelistRejection::Origin)
        );
    }

    #[test]
    fn test_unconstrained_dimension_is_not_checked() {
        let ip_only = vec![entry().with_server_ip("198.51.100.10")];
        assert_eq!(
            validate_entries(&ip_only, Some("https://anywhere.test"), Some("198.51.100.10")),
            Ok(())
        );

        let domain_only = vec![entry().with_domain("portal.example.com")];
        assert_eq!(
            validate_entries(&domain_only, Some("portal.example.com"), None),
            Ok(())
        );
    }

    #[test]
    fn test_missing_values_fail_closed_when_constrained() {
        let entries = vec![entry().with_domain("portal.example.com").with_server_ip("1.2.3.4")];
        assert_eq!(
            validate_entries(&entries, None, Some("1.2.3.4")),
            Err(WhitelistRejection::Origin)
        );
        assert_eq!(
            validate_entries(&entries, Some("portal.example.com"), None),
            Err(WhitelistRejection::Ip)
        );
    }

    #[test]
    fn test_origin_matching_strips_scheme_but_keeps_case() {
        let entries = vec![entry().with_domain("portal.example.com")];
        assert_eq!(
            validate_entries(&entries, Some("https://portal.example.com/"), None),
            Ok(())
        );
        assert_eq!(
            validate_entries(&entries, Some("http://portal.example.com"), None),
            Ok(())
        );

        // A case-mangled host is a different origin
        assert_eq!(
            validate_entries(&entries, Some("https://Portal.Example.com"), None),
            Err(WhitelistRejection::Origin)
        );
        assert_eq!(
            validate_entries(&entries, Some("PORTAL.EXAMPLE.COM"), None),
            Err(WhitelistRejection::Origin)
        );
    }
}
