// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::apply::OperationResult;
use crate::error::ApiError;
use crate::policy::QuotaIdentity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

pub const QUOTA_READY: &str = "QuotaReady";
pub const REASON_QUOTA_CREATED: &str = "QuotaCreated";
pub const REASON_ERROR: &str = "Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

pub fn new_condition(
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: String,
    observed_generation: Option<i64>,
    now: Time,
) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.as_str().to_string(),
        reason: reason.to_string(),
        message,
        observed_generation,
        last_transition_time: now,
    }
}

/// Summarizes the outcome of applying the quota as a QuotaReady condition.
pub fn quota_ready_condition(
    outcome: &Result<OperationResult, ApiError>,
    identity: &QuotaIdentity,
    observed_generation: Option<i64>,
    now: Time,
) -> Condition {
    match outcome {
        Ok(_) => new_condition(
            QUOTA_READY,
            ConditionStatus::True,
            REASON_QUOTA_CREATED,
            format!(
                "ResourceQuota {} has successfully been created in {} namespace",
                identity.name, identity.namespace
            ),
            observed_generation,
            now,
        ),
        Err(err) => new_condition(
            QUOTA_READY,
            ConditionStatus::False,
            REASON_ERROR,
            format!("Unable to create or patch the ResourceQuota {}: {}", identity.key(), err),
            observed_generation,
            now,
        ),
    }
}

/// Folds `incoming` into `existing` and reports whether anything changed.
///
/// An entry of the same type is replaced in place only when its status or
/// reason differ; a message-only difference is not a change. The
/// lastTransitionTime of the replaced entry is kept unless the status flips.
/// Duplicate entries of the type are collapsed into the first one.
pub fn merge_condition(existing: &[Condition], incoming: Condition) -> (Vec<Condition>, bool) {
    let mut merged = Vec::with_capacity(existing.len() + 1);
    let mut changed = false;
    let mut seen = false;

    for condition in existing {
        if condition.type_ != incoming.type_ {
            merged.push(condition.clone());
            continue;
        }
        if seen {
            changed = true;
            continue;
        }
        seen = true;
        if condition.status == incoming.status && condition.reason == incoming.reason {
            merged.push(condition.clone());
        } else {
            let last_transition_time = if condition.status == incoming.status {
                condition.last_transition_time.clone()
            } else {
                incoming.last_transition_time.clone()
            };
            merged.push(Condition {
                last_transition_time,
                ..incoming.clone()
            });
            changed = true;
        }
    }

    if !seen {
        merged.push(incoming);
        changed = true;
    }
    (merged, changed)
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|condition| condition.type_ == type_)
}
