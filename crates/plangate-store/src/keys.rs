//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in column families.

use plangate_core::{FeatureId, ModuleId, PlanId, SubscriberContext, SubscriptionId};

/// Separator between the subscriber reference and the subscription id in index keys.
const SUBSCRIBER_SEPARATOR: u8 = 0x00;

/// Create a plan key from a plan ID.
#[must_use]
pub fn plan_key(plan_id: &PlanId) -> Vec<u8> {
    plan_id.as_bytes().to_vec()
}

/// Create a module key from a module ID.
#[must_use]
pub fn module_key(module_id: &ModuleId) -> Vec<u8> {
    module_id.as_bytes().to_vec()
}

/// Create a feature key from a feature ID.
#[must_use]
pub fn feature_key(feature_id: &FeatureId) -> Vec<u8> {
    feature_id.as_bytes().to_vec()
}

/// Create a feature slug index key.
///
/// Format: `module_id (16 bytes) || slug`
#[must_use]
pub fn feature_slug_key(module_id: &ModuleId, slug: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + slug.len());
    key.extend_from_slice(module_id.as_bytes());
    key.extend_from_slice(slug.as_bytes());
    key
}

/// Create a plan-feature key.
///
/// Format: `plan_id (16 bytes) || feature_id (16 bytes)`
#[must_use]
pub fn plan_feature_key(plan_id: &PlanId, feature_id: &FeatureId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(plan_id.as_bytes());
    key.extend_from_slice(feature_id.as_bytes());
    key
}

/// Create a subscription key from a subscription ID.
#[must_use]
pub fn subscription_key(subscription_id: &SubscriptionId) -> Vec<u8> {
    subscription_id.to_bytes().to_vec()
}

/// Create a subscriber-subscription index key.
///
/// Format: `subscriber || 0x00 || subscription_id (16 bytes)`
///
/// Since ULIDs are time-ordered, a subscriber's subscriptions sort by creation time.
#[must_use]
pub fn subscriber_subscription_key(
    subscriber: &SubscriberContext,
    subscription_id: &SubscriptionId,
) -> Vec<u8> {
    let mut key = subscriber_subscriptions_prefix(subscriber);
    key.extend_from_slice(&subscription_id.to_bytes());
    key
}

/// Create a prefix for iterating all subscriptions of a subscriber.
#[must_use]
pub fn subscriber_subscriptions_prefix(subscriber: &SubscriberContext) -> Vec<u8> {
    let reference = subscriber.key();
    let mut key = Vec::with_capacity(reference.len() + 17);
    key.extend_from_slice(reference.as_bytes());
    key.push(SUBSCRIBER_SEPARATOR);
    key
}

/// Extract the subscription ID from a subscriber-subscription index key.
///
/// Returns `None` if the key is shorter than 16 bytes.
#[must_use]
pub fn extract_subscription_id(key: &[u8]) -> Option<SubscriptionId> {
    let start = key.len().checked_sub(16)?;
    let bytes: [u8; 16] = key[start..].try_into().ok()?;
    Some(SubscriptionId::from_bytes(bytes))
}

/// Create a key from a string-form storage key.
#[must_use]
pub fn string_key(key: &str) -> Vec<u8> {
    key.as_bytes().to_vec()
}
