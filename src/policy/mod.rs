//! Policy and notification documents.
//!
//! All JSON documents the orchestrator sends to the control plane are built
//! here: the static trust policy, the access policy rendered from the two
//! store names and the region, and the per-run notification configuration.
//! The policy-version eviction rule also lives here as a pure function so
//! the quota behavior is testable without a control plane.

use crate::config::{MAX_POLICY_VERSIONS, OBJECT_CREATED_EVENTS};
use crate::control_plane::{NotificationBinding, NotificationConfiguration, PolicyVersion};
use serde_json::{json, Value};

/// Trust policy allowing the compute service to assume the execution role.
pub fn trust_policy() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "compute.cloud" },
            "Action": "sts:AssumeRole"
        }]
    })
}

/// Access policy granting the function read on the inbound store, write on
/// the outbound store, and log emission in the configured region.
///
/// The two store names and the region are the only placeholders; everything
/// else in the document is fixed.
pub fn render_access_policy(inbound_store: &str, outbound_store: &str, region: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": ["store:GetObject", "store:ListObjects"],
                "Resource": [
                    store_arn(inbound_store),
                    format!("{}/*", store_arn(inbound_store))
                ]
            },
            {
                "Effect": "Allow",
                "Action": ["store:PutObject"],
                "Resource": [format!("{}/*", store_arn(outbound_store))]
            },
            {
                "Effect": "Allow",
                "Action": ["logs:CreateStream", "logs:PutEvents"],
                "Resource": [format!("arn:cloud:logs:{region}:*:*")]
            }
        ]
    })
}

/// ARN-like handle for a store. Stores are globally namespaced, so the
/// handle carries neither region nor account.
pub fn store_arn(name: &str) -> String {
    format!("arn:cloud:store:::{name}")
}

/// Statement id for the inbound store's invoke grant. Derived from the
/// store name so re-grant attempts collide on the same id and stay
/// idempotent.
pub fn invoke_statement_id(store: &str) -> String {
    format!("{store}-invoke")
}

/// Notification configuration binding the inbound store's object-created
/// events to the function. Built fresh each run from the function's
/// resolved ARN.
pub fn notification_configuration(store: &str, function_arn: &str) -> NotificationConfiguration {
    NotificationConfiguration {
        bindings: vec![NotificationBinding {
            id: format!("{store}-object-created"),
            function_arn: function_arn.to_string(),
            events: OBJECT_CREATED_EVENTS.iter().map(|s| s.to_string()).collect(),
        }],
    }
}

/// Pick the version to evict before creating a new one, or `None` when the
/// quota leaves room.
///
/// The provider retains at most [`MAX_POLICY_VERSIONS`] versions (one
/// default plus four others). When the non-default count is already at the
/// cap, the oldest non-default version by creation time is evicted. The
/// default version is never a candidate.
pub fn select_eviction(versions: &[PolicyVersion]) -> Option<&PolicyVersion> {
    let non_default: Vec<&PolicyVersion> = versions.iter().filter(|v| !v.is_default).collect();
    if non_default.len() < MAX_POLICY_VERSIONS - 1 {
        return None;
    }
    non_default.into_iter().min_by_key(|v| v.created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn version(id: &str, is_default: bool, secs: i64) -> PolicyVersion {
        PolicyVersion {
            version_id: id.to_string(),
            is_default,
            created_at: Utc.timestamp_opt(secs, 0).single().unwrap(),
        }
    }

    #[test]
    fn test_no_eviction_below_quota() {
        let versions = vec![
            version("v1", true, 100),
            version("v2", false, 200),
            version("v3", false, 300),
        ];
        assert!(select_eviction(&versions).is_none());
    }

    #[test]
    fn test_evicts_oldest_non_default_at_quota() {
        let versions = vec![
            version("v5", false, 500),
            version("v1", true, 100),
            version("v3", false, 300),
            version("v2", false, 200),
            version("v4", false, 400),
        ];
        let victim = select_eviction(&versions).unwrap();
        assert_eq!(victim.version_id, "v2");
    }

    #[test]
    fn test_default_is_never_evicted_even_when_oldest() {
        let versions = vec![
            version("v1", true, 1),
            version("v2", false, 200),
            version("v3", false, 300),
            version("v4", false, 400),
            version("v5", false, 500),
        ];
        let victim = select_eviction(&versions).unwrap();
        assert_eq!(victim.version_id, "v2");
    }

    #[test]
    fn test_access_policy_substitutes_stores_and_region() {
        let doc = render_access_policy("photos-in", "photos-out", "eu-west-1");
        let rendered = doc.to_string();
        assert!(rendered.contains("arn:cloud:store:::photos-in"));
        assert!(rendered.contains("arn:cloud:store:::photos-out/*"));
        assert!(rendered.contains("arn:cloud:logs:eu-west-1"));
    }

    #[test]
    fn test_statement_id_is_store_derived() {
        assert_eq!(invoke_statement_id("photos-in"), "photos-in-invoke");
    }

    #[test]
    fn test_notification_targets_function_arn() {
        let config = notification_configuration("photos-in", "arn:cloud:compute::1:function/f");
        assert_eq!(config.bindings.len(), 1);
        assert_eq!(
            config.bindings[0].function_arn,
            "arn:cloud:compute::1:function/f"
        );
        assert!(!config.bindings[0].events.is_empty());
    }
}
