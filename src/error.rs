// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use kube_core::ErrorResponse;
use thiserror::Error;

// ApiError is what every ClusterClient operation reports on failure.
// NotFound, AlreadyExists and Conflict get their own variants because the
// reconciler branches on them; everything else is opaque and retried.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("NotFound: {0}")]
    ObjectNotFound(String),
    #[error("AlreadyExists: {0}")]
    ObjectAlreadyExists(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("{reason} ({code}): {message}")]
    Rejected {
        reason: String,
        message: String,
        code: u16,
    },
    #[error("Invalid tenant scope {scope}: {message}")]
    InvalidScope { scope: String, message: String },
    #[error("Request failed: {0}")]
    Request(#[source] kube_client::Error),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::ObjectNotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ApiError::ObjectAlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict(_))
    }
}

// Translates the API error from kube-rs APIs by the reason the API server reports.
impl From<kube_client::Error> for ApiError {
    fn from(error: kube_client::Error) -> Self {
        match error {
            kube_client::Error::Api(ErrorResponse {
                reason,
                message,
                code,
                ..
            }) => match reason.as_str() {
                "NotFound" => ApiError::ObjectNotFound(message),
                "AlreadyExists" => ApiError::ObjectAlreadyExists(message),
                "Conflict" => ApiError::Conflict(message),
                _ => ApiError::Rejected {
                    reason,
                    message,
                    code,
                },
            },
            other => ApiError::Request(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(reason: &str, code: u16) -> kube_client::Error {
        kube_client::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} happened", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn maps_reasons_the_reconciler_branches_on() {
        assert!(ApiError::from(api_error("NotFound", 404)).is_not_found());
        assert!(ApiError::from(api_error("AlreadyExists", 409)).is_already_exists());
        assert!(ApiError::from(api_error("Conflict", 409)).is_conflict());
    }

    #[test]
    fn keeps_other_rejections_opaque() {
        match ApiError::from(api_error("ServiceUnavailable", 503)) {
            ApiError::Rejected { reason, code, .. } => {
                assert_eq!(reason, "ServiceUnavailable");
                assert_eq!(code, 503);
            }
            other => panic!("unexpected mapping: {:?}", other),
        }
    }
}
