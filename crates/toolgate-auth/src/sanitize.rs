//! Error sanitization boundary
//!
//! Everything that crosses back to an unauthenticated caller goes through this
//! module. Callers get one of [`PUBLIC_MESSAGES`]; the reason and any
//! underlying error detail are recorded with `tracing` for operators only.
//!
//! The mapping is a plain `match` without a wildcard arm, so adding a variant
//! to [`FailureReason`] fails to compile until it is mapped here.

use tracing::{debug, warn};

use crate::error::FailureReason;

/// Returned for every rejected token
pub const TOKEN_VALIDATION_FAILED: &str = "token validation failed";

/// Returned when the request carries no usable credentials
pub const AUTHENTICATION_REQUIRED: &str = "authentication required";

/// The complete set of strings that may reach a caller
pub const PUBLIC_MESSAGES: [&str; 2] = [TOKEN_VALIDATION_FAILED, AUTHENTICATION_REQUIRED];

/// Map a failure reason to its public message
pub fn to_public_message(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::KeySourceUnreachable
        | FailureReason::SignatureInvalid
        | FailureReason::TokenExpired
        | FailureReason::IssuerMismatch
        | FailureReason::AudienceMismatch
        | FailureReason::MalformedToken => TOKEN_VALIDATION_FAILED,
    }
}

/// Log a rejection with full detail and return its public message
pub fn reject(reason: FailureReason, detail: &dyn std::fmt::Display) -> &'static str {
    warn!(reason = %reason, error = %detail, "bearer token rejected");
    to_public_message(reason)
}

/// Public message for an error that has no [`FailureReason`]
///
/// The error is logged at debug level and never echoed.
pub fn uncategorized(error: &dyn std::error::Error) -> &'static str {
    debug!(error = %error, "uncategorized authentication error");
    TOKEN_VALIDATION_FAILED
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Fails to compile when a variant is added without listing it here,
    // which forces FailureReason::ALL to be revisited as well.
    fn position(reason: FailureReason) -> usize {
        match reason {
            FailureReason::KeySourceUnreachable => 0,
            FailureReason::SignatureInvalid => 1,
            FailureReason::TokenExpired => 2,
            FailureReason::IssuerMismatch => 3,
            FailureReason::AudienceMismatch => 4,
            FailureReason::MalformedToken => 5,
        }
    }

    #[test]
    fn every_reason_maps_into_public_set() {
        for (i, reason) in FailureReason::ALL.into_iter().enumerate() {
            assert_eq!(position(reason), i, "FailureReason::ALL out of sync");
            assert!(PUBLIC_MESSAGES.contains(&to_public_message(reason)));
        }
    }

    #[test]
    fn public_message_never_names_the_reason() {
        for reason in FailureReason::ALL {
            assert!(!to_public_message(reason).contains(reason.as_str()));
        }
    }

    #[test]
    fn uncategorized_is_generic() {
        let err = std::io::Error::other("connect to http://localhost:1/jwks refused");
        assert_eq!(uncategorized(&err), TOKEN_VALIDATION_FAILED);
    }

    proptest! {
        #[test]
        fn detail_never_leaks(detail in "[a-z]{3,12}\\.internal\\.example:[0-9]{2,5}") {
            for reason in FailureReason::ALL {
                let public = reject(reason, &detail);
                prop_assert!(PUBLIC_MESSAGES.contains(&public));
                prop_assert!(!public.contains(&detail));
            }
            let err = std::io::Error::other(detail.clone());
            prop_assert!(!uncategorized(&err).contains(&detail));
        }
    }
}
