//! # Validation Module
//!
//! Input checks shared by the entity constructors. Each validator returns
//! the first problem it finds; constructors run them before building any
//! state, so a rejected input never leaves a half-built entity behind.
//!
//! ```rust
//! use agent_core::validation::{validate_agent_id, validate_order_id};
//!
//! assert!(validate_agent_id(7).is_ok());
//! assert!(validate_order_id("ORD-2026-0001").is_ok());
//! assert!(validate_order_id("   ").is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Order references coming from the order service are capped at this length.
pub const MAX_ORDER_ID_LEN: usize = 100;

// =============================================================================
// Identifiers
// =============================================================================

/// Agent IDs are database-assigned and always positive.
pub fn validate_agent_id(agent_id: i64) -> ValidationResult<()> {
    if agent_id <= 0 {
        return Err(ValidationError::required("agent_id"));
    }
    Ok(())
}

/// Validates an external order reference and returns it trimmed.
pub fn validate_order_id(order_id: &str) -> ValidationResult<String> {
    let order_id = order_id.trim();

    if order_id.is_empty() {
        return Err(ValidationError::required("order_id"));
    }

    if order_id.len() > MAX_ORDER_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "order_id".to_string(),
            max: MAX_ORDER_ID_LEN,
        });
    }

    Ok(order_id.to_string())
}

/// Agent and team codes: 1-20 characters, letters, digits and hyphens.
pub fn validate_code(field: &str, code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::required(field));
    }

    if code.len() > 20 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 20,
        });
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, digits and hyphens".to_string(),
        });
    }

    Ok(code.to_string())
}

/// Product and category ids from the order service, trimmed. Bonus tables
/// store and match them in this form.
pub fn validate_item_id(field: &str, item_id: &str) -> ValidationResult<String> {
    let item_id = item_id.trim();

    if item_id.is_empty() {
        return Err(ValidationError::required(field));
    }

    if item_id.len() > MAX_ORDER_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ORDER_ID_LEN,
        });
    }

    Ok(item_id.to_string())
}

// =============================================================================
// Text
// =============================================================================

pub fn validate_name(field: &str, name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(name.to_string())
}

/// A deliberately loose email check: one `@` with text on both sides and a
/// dot in the domain. Deliverability is the identity provider's problem.
pub fn validate_email(email: &str) -> ValidationResult<String> {
    let email = email.trim();

    if email.is_empty() {
        return Err(ValidationError::required("email"));
    }

    let invalid = || ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: "must look like name@domain.tld".to_string(),
    };

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(invalid());
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid());
    }

    Ok(email.to_lowercase())
}

// =============================================================================
// Amounts
// =============================================================================

pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

pub fn validate_non_negative_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_agent_id() {
        assert!(validate_agent_id(1).is_ok());
        assert!(validate_agent_id(0).is_err());
        assert!(validate_agent_id(-4).is_err());
    }

    #[test]
    fn test_validate_item_id() {
        assert_eq!(validate_item_id("item_id", " SKU-1\t").unwrap(), "SKU-1");
        assert!(validate_item_id("item_id", "  ").is_err());
        assert!(validate_item_id("item_id", &"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_order_id() {
        assert_eq!(validate_order_id("  ORD-1 ").unwrap(), "ORD-1");
        assert!(validate_order_id("").is_err());
        assert!(validate_order_id(&"9".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_code() {
        assert_eq!(validate_code("code", "AGT0001").unwrap(), "AGT0001");
        assert!(validate_code("code", "TEAM-KL").is_ok());
        assert!(validate_code("code", "").is_err());
        assert!(validate_code("code", "has space").is_err());
        assert!(validate_code("code", &"A".repeat(21)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("Aisha@Example.com").unwrap(), "aisha@example.com");
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@b@c.com").is_err());
        assert!(validate_email("a@localhost").is_err());
        assert!(validate_email("a@.com").is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_positive_amount("order_total", Money::from_cents(1)).is_ok());
        assert!(validate_positive_amount("order_total", Money::zero()).is_err());
        assert!(validate_non_negative_amount("target", Money::zero()).is_ok());
        assert!(validate_non_negative_amount("target", Money::from_cents(-1)).is_err());
    }
}
