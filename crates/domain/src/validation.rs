//! Field-level validation rules.
//!
//! Pure checks over in-memory input. Referential checks (does the
//! customer exist, are all product IDs resolvable) are driven by the
//! orchestrator, which passes the resolved state in; nothing here
//! touches the store or mutates anything.

use std::collections::HashSet;
use std::sync::LazyLock;

use common::{Money, ProductId};
use regex::Regex;
use thiserror::Error;

/// Accepted phone formats: `+<country code><9-10 digits>` or
/// `ddd-ddd-dddd`.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\+\d{1,3}\d{9,10}|\d{3}-\d{3}-\d{4})$").expect("phone pattern is valid")
});

/// A rejected mutation input, with the caller-facing reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Another customer already has this email.
    #[error("Email already exists")]
    EmailExists,

    /// The phone number matches neither accepted format.
    #[error("Phone must be in format '+1234567890' or '123-456-7890'")]
    InvalidPhoneFormat,

    /// Product price must be strictly positive.
    #[error("Price must be positive")]
    NonPositivePrice,

    /// Product stock cannot be negative.
    #[error("Stock cannot be negative")]
    NegativeStock,

    /// The order references a customer that does not exist.
    #[error("Invalid customer ID")]
    UnknownCustomer,

    /// An order needs at least one product.
    #[error("At least one product is required")]
    NoProducts,

    /// One or more requested product IDs did not resolve.
    #[error("One or more invalid product IDs")]
    UnknownProducts,
}

/// Validates an optional phone number.
///
/// Absent or empty phones are fine; a non-empty phone must match one of
/// the accepted formats.
pub fn validate_phone(phone: Option<&str>) -> Result<(), ValidationError> {
    match phone {
        None => Ok(()),
        Some(value) if value.is_empty() => Ok(()),
        Some(value) if PHONE_PATTERN.is_match(value) => Ok(()),
        Some(_) => Err(ValidationError::InvalidPhoneFormat),
    }
}

/// Validates that a product price is strictly positive.
pub fn validate_price(price: Money) -> Result<(), ValidationError> {
    if price.is_positive() {
        Ok(())
    } else {
        Err(ValidationError::NonPositivePrice)
    }
}

/// Validates that a stock level is non-negative.
pub fn validate_stock(stock: i64) -> Result<(), ValidationError> {
    if stock < 0 {
        Err(ValidationError::NegativeStock)
    } else {
        Ok(())
    }
}

/// Validates that an order requests at least one product.
pub fn validate_order_products(product_ids: &[ProductId]) -> Result<(), ValidationError> {
    if product_ids.is_empty() {
        Err(ValidationError::NoProducts)
    } else {
        Ok(())
    }
}

/// Validates that every requested product ID resolved to a row.
///
/// A partial resolution is a hard failure, never a partial order:
/// the distinct requested IDs must match the resolved rows one to one.
pub fn validate_resolved_products(
    requested: &[ProductId],
    resolved_count: usize,
) -> Result<(), ValidationError> {
    let distinct: HashSet<&ProductId> = requested.iter().collect();
    if distinct.len() == resolved_count {
        Ok(())
    } else {
        Err(ValidationError::UnknownProducts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn international_phone_accepted() {
        assert!(validate_phone(Some("+14155550100")).is_ok());
        assert!(validate_phone(Some("+4915123456789")).is_ok());
    }

    #[test]
    fn dashed_phone_accepted() {
        assert!(validate_phone(Some("123-456-7890")).is_ok());
    }

    #[test]
    fn malformed_phones_rejected() {
        assert_eq!(
            validate_phone(Some("415-555")),
            Err(ValidationError::InvalidPhoneFormat)
        );
        assert_eq!(
            validate_phone(Some("+1415")),
            Err(ValidationError::InvalidPhoneFormat)
        );
        assert_eq!(
            validate_phone(Some("phone")),
            Err(ValidationError::InvalidPhoneFormat)
        );
        // No partial matches: trailing garbage fails the whole value.
        assert_eq!(
            validate_phone(Some("123-456-7890x")),
            Err(ValidationError::InvalidPhoneFormat)
        );
    }

    #[test]
    fn absent_or_empty_phone_is_fine() {
        assert!(validate_phone(None).is_ok());
        assert!(validate_phone(Some("")).is_ok());
    }

    #[test]
    fn zero_and_negative_prices_rejected() {
        assert_eq!(
            validate_price(Money::zero()),
            Err(ValidationError::NonPositivePrice)
        );
        assert_eq!(
            validate_price(Money::from_cents(-100)),
            Err(ValidationError::NonPositivePrice)
        );
        assert!(validate_price(Money::from_cents(1)).is_ok());
    }

    #[test]
    fn negative_stock_rejected() {
        assert_eq!(validate_stock(-1), Err(ValidationError::NegativeStock));
        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(100).is_ok());
    }

    #[test]
    fn empty_product_list_rejected() {
        assert_eq!(
            validate_order_products(&[]),
            Err(ValidationError::NoProducts)
        );
        assert!(validate_order_products(&[ProductId::new()]).is_ok());
    }

    #[test]
    fn partial_resolution_rejected() {
        let ids = vec![ProductId::new(), ProductId::new()];
        assert!(validate_resolved_products(&ids, 2).is_ok());
        assert_eq!(
            validate_resolved_products(&ids, 1),
            Err(ValidationError::UnknownProducts)
        );
    }

    #[test]
    fn duplicate_requested_ids_count_once() {
        let id = ProductId::new();
        let ids = vec![id, id];
        assert!(validate_resolved_products(&ids, 1).is_ok());
    }
}
