//! Typed per-request caller context.
//!
//! Token verification happens upstream of this service; the gateway forwards
//! the resolved identity in headers. This extractor turns those headers into
//! an explicit value passed through the call chain instead of mutating
//! request extensions.

use crate::errors::AppError;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Subscription tier of the caller; defaults to `Free` when absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionTier {
    Free,
    Pro,
    Enterprise,
}

impl SubscriptionTier {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "pro" => SubscriptionTier::Pro,
            "enterprise" => SubscriptionTier::Enterprise,
            _ => SubscriptionTier::Free,
        }
    }
}

/// Identity of the authenticated caller for one request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub owner_id: Uuid,
    pub tier: SubscriptionTier,
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner_id = parts
            .headers
            .get("x-owner-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing x-owner-id header"))?;
        let owner_id = Uuid::parse_str(owner_id)
            .map_err(|_| AppError::unauthorized("x-owner-id is not a valid UUID"))?;

        let tier = parts
            .headers
            .get("x-subscription-tier")
            .and_then(|v| v.to_str().ok())
            .map(SubscriptionTier::parse)
            .unwrap_or(SubscriptionTier::Free);

        Ok(RequestContext { owner_id, tier })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_parsing_defaults_to_free() {
        assert_eq!(SubscriptionTier::parse("pro"), SubscriptionTier::Pro);
        assert_eq!(
            SubscriptionTier::parse("Enterprise"),
            SubscriptionTier::Enterprise
        );
        assert_eq!(SubscriptionTier::parse("gold"), SubscriptionTier::Free);
    }
}
