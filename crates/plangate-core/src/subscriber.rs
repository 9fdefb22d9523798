//! Subscriber identity.
//!
//! A subscription is owned either by a single user or by a tenant (an organisation or
//! site shared by many users). Callers build a [`SubscriberContext`] once, with the
//! constructor matching their deployment mode, and every lookup keys off it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::IdError;

/// Which kind of principal owns the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberKind {
    /// An individual user account.
    User,
    /// A tenant shared by many users.
    Tenant,
}

impl SubscriberKind {
    /// Return the string prefix used in subscriber references.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Tenant => "tenant",
        }
    }
}

/// The owner of a subscription, resolved once per request.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriberContext {
    kind: SubscriberKind,
    id: String,
}

impl SubscriberContext {
    /// Subscriber for a single user.
    #[must_use]
    pub fn from_user(user_id: impl Into<String>) -> Self {
        Self {
            kind: SubscriberKind::User,
            id: user_id.into(),
        }
    }

    /// Subscriber for a tenant.
    #[must_use]
    pub fn from_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            kind: SubscriberKind::Tenant,
            id: tenant_id.into(),
        }
    }

    /// Resolve the subscriber for a request: the tenant plan applies whenever a tenant
    /// is present, otherwise the user's own subscription.
    #[must_use]
    pub fn resolve(tenant_id: Option<&str>, user_id: Option<&str>) -> Option<Self> {
        match (tenant_id, user_id) {
            (Some(tenant), _) if !tenant.is_empty() => Some(Self::from_tenant(tenant)),
            (_, Some(user)) if !user.is_empty() => Some(Self::from_user(user)),
            _ => None,
        }
    }

    /// The owning principal's kind.
    #[must_use]
    pub const fn kind(&self) -> SubscriberKind {
        self.kind
    }

    /// The owning principal's identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stable storage key, e.g. `tenant:acme`.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SubscriberContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

impl fmt::Debug for SubscriberContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberContext({self})")
    }
}

impl FromStr for SubscriberContext {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdError::InvalidSubscriber(s.to_string());
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        if id.is_empty() {
            return Err(invalid());
        }
        match kind {
            "user" => Ok(Self::from_user(id)),
            "tenant" => Ok(Self::from_tenant(id)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for SubscriberContext {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubscriberContext> for String {
    fn from(ctx: SubscriberContext) -> Self {
        ctx.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_takes_precedence_over_user() {
        let ctx = SubscriberContext::resolve(Some("acme"), Some("42")).unwrap();
        assert_eq!(ctx, SubscriberContext::from_tenant("acme"));
    }

    #[test]
    fn falls_back_to_user_without_tenant() {
        let ctx = SubscriberContext::resolve(None, Some("42")).unwrap();
        assert_eq!(ctx.kind(), SubscriberKind::User);
        assert_eq!(ctx.id(), "42");

        let ctx = SubscriberContext::resolve(Some(""), Some("42")).unwrap();
        assert_eq!(ctx.kind(), SubscriberKind::User);
    }

    #[test]
    fn no_identity_resolves_to_none() {
        assert!(SubscriberContext::resolve(None, None).is_none());
    }

    #[test]
    fn parses_reference_strings() {
        let ctx: SubscriberContext = "tenant:acme:eu".parse().unwrap();
        assert_eq!(ctx.kind(), SubscriberKind::Tenant);
        assert_eq!(ctx.id(), "acme:eu");
        assert_eq!(ctx.key(), "tenant:acme:eu");

        assert!("acme".parse::<SubscriberContext>().is_err());
        assert!("group:acme".parse::<SubscriberContext>().is_err());
        assert!("user:".parse::<SubscriberContext>().is_err());
    }

    #[test]
    fn serializes_as_reference_string() {
        let ctx = SubscriberContext::from_user("7");
        assert_eq!(serde_json::to_string(&ctx).unwrap(), "\"user:7\"");
    }
}
