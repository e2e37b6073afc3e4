//! Input validation for API requests.
//!
//! Field checks return `Result<(), String>`; request-level checks collect them
//! with [`ValidationErrorBuilder`] so every bad field is reported at once.

use super::error::{ApiError, ValidationErrorBuilder};

pub fn validate_product_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Product name cannot be empty".to_string());
    }
    if name.len() > 200 {
        return Err("Product name is too long (max 200 characters)".to_string());
    }
    Ok(())
}

pub fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() || price <= 0.0 {
        return Err("Product price must be greater than zero".to_string());
    }
    Ok(())
}

pub fn validate_category(category: &str) -> Result<(), String> {
    if category.trim().is_empty() {
        return Err("Product category cannot be empty".to_string());
    }
    if category.len() > 100 {
        return Err("Product category is too long (max 100 characters)".to_string());
    }
    Ok(())
}

/// Validate all product fields together
pub fn validate_product(name: &str, price: f64, category: &str) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_product_name(name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_price(price) {
        errors.add("price", e);
    }
    if let Err(e) = validate_category(category) {
        errors.add("category", e);
    }
    errors.finish()
}

pub fn validate_subject(subject: &str) -> Result<(), String> {
    if subject.trim().is_empty() {
        return Err("Subject is required".to_string());
    }
    if subject.contains(['\r', '\n']) {
        return Err("Subject must be a single line".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;

    #[test]
    fn test_validate_product_collects_all_fields() {
        assert!(validate_product("Gouda", 12.5, "cheese").is_ok());

        let err = validate_product(" ", 0.0, "").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(err.message().contains("3 fields"));
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(0.01).is_ok());
        assert!(validate_price(0.0).is_err());
        assert!(validate_price(-3.0).is_err());
        assert!(validate_price(f64::NAN).is_err());
        assert!(validate_price(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_subject() {
        assert!(validate_subject("Weekly offers").is_ok());
        assert!(validate_subject("").is_err());
        assert!(validate_subject("Hi\r\nBcc: x@example.com").is_err());
    }
}
