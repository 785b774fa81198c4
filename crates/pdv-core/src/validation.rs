//! # Validation Module
//!
//! Record validation run by foreground mutations before anything is written
//! to the local store.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI forms                                                     │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: MutationService (pdv-sync)                                   │
//! │  └── THIS MODULE via SyncEntity::validate                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: PDV backend                                                  │
//! │  └── Authoritative rules (rejections surface as HTTP errors on push)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records arriving from the server through a pull are NOT validated here;
//! the server is authoritative for what it already accepted.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::money::Money;
use crate::record::Sale;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of descriptions and names.
pub const MAX_TEXT_LEN: usize = 200;

/// Maximum length of a single barcode.
pub const MAX_BARCODE_LEN: usize = 50;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a required text field (description, name, reference ID).
///
/// ## Example
/// ```rust
/// use pdv_core::validation::validate_text;
///
/// assert!(validate_text("description", "Bebidas").is_ok());
/// assert!(validate_text("description", "   ").is_err());
/// ```
pub fn validate_text(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LEN,
        });
    }

    Ok(())
}

/// Validates a monetary amount is not negative.
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a decimal is finite.
pub fn validate_finite(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a single barcode.
///
/// ## Rules
/// - Not empty, at most 50 characters
/// - No whitespace inside the code
pub fn validate_barcode(code: &str) -> ValidationResult<()> {
    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if code.len() > MAX_BARCODE_LEN {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: MAX_BARCODE_LEN,
        });
    }

    if code.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

/// Trims barcodes, drops blanks and removes case-insensitive duplicates,
/// keeping the first spelling.
///
/// ## Example
/// ```rust
/// use pdv_core::validation::normalize_barcodes;
///
/// let codes = vec![" 789A ".to_string(), "789a".to_string(), "".to_string()];
/// assert_eq!(normalize_barcodes(&codes), vec!["789A".to_string()]);
/// ```
pub fn normalize_barcodes(codes: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    codes
        .iter()
        .map(|code| code.trim())
        .filter(|code| !code.is_empty())
        .filter(|code| seen.insert(code.to_lowercase()))
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Sale Validation
// =============================================================================

/// Validates a sale's totals.
///
/// ## Rules
/// - At least one line, each with a product and positive quantity
/// - No negative amounts
/// - `paidValue >= totalValue`
/// - `changeValue == paidValue - totalValue`
pub fn validate_sale_totals(sale: &Sale) -> ValidationResult<()> {
    if sale.sale_products.is_empty() {
        return Err(ValidationError::Required {
            field: "saleProducts".to_string(),
        });
    }

    for line in &sale.sale_products {
        validate_text("productId", &line.product_id)?;
        validate_finite("quantity", line.quantity)?;
        if line.quantity <= 0.0 {
            return Err(ValidationError::Negative {
                field: "quantity".to_string(),
            });
        }
        validate_amount("unitPrice", line.unit_price)?;
    }

    validate_amount("totalValue", sale.total_value)?;
    validate_amount("paidValue", sale.paid_value)?;
    validate_amount("changeValue", sale.change_value)?;

    if sale.paid_value < sale.total_value {
        return Err(ValidationError::Inconsistent {
            field: "paidValue".to_string(),
            reason: format!("{} is less than total {}", sale.paid_value, sale.total_value),
        });
    }

    if sale.change_value != sale.paid_value - sale.total_value {
        return Err(ValidationError::Inconsistent {
            field: "changeValue".to_string(),
            reason: format!(
                "expected {}, got {}",
                sale.paid_value - sale.total_value,
                sale.change_value
            ),
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
    use crate::record::{RecordMeta, SaleProduct};

    fn sale(total: i64, paid: i64, change: i64) -> Sale {
        Sale {
            meta: RecordMeta::new_local(),
            payment_form_id: "pf".into(),
            cashier_id: "c".into(),
            checkout_id: "k".into(),
            total_value: Money::from_cents(total),
            paid_value: Money::from_cents(paid),
            change_value: Money::from_cents(change),
            sale_products: vec![SaleProduct {
                product_id: "p".into(),
                quantity: 2.0,
                unit_price: Money::from_cents(total / 2),
            }],
        }
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("name", "Caixa 1").is_ok());
        assert!(matches!(
            validate_text("name", ""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_text("name", &"x".repeat(201)),
            Err(ValidationError::TooLong { max: 200, .. })
        ));
    }

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("7891000100103").is_ok());
        assert!(validate_barcode("789 100").is_err());
        assert!(validate_barcode(&"1".repeat(51)).is_err());
    }

    #[test]
    fn test_normalize_barcodes_dedups_case_insensitively() {
        let codes = vec!["ABC".to_string(), " abc".to_string(), "123".to_string()];
        assert_eq!(normalize_barcodes(&codes), vec!["ABC".to_string(), "123".to_string()]);
    }

    #[test]
    fn test_sale_totals_valid() {
        assert!(validate_sale_totals(&sale(1000, 1500, 500)).is_ok());
        assert!(validate_sale_totals(&sale(1000, 1000, 0)).is_ok());
    }

    #[test]
    fn test_sale_totals_underpaid() {
        let err = validate_sale_totals(&sale(1000, 900, 0)).unwrap_err();
        assert!(matches!(err, ValidationError::Inconsistent { ref field, .. } if field == "paidValue"));
    }

    #[test]
    fn test_sale_totals_wrong_change() {
        let err = validate_sale_totals(&sale(1000, 2000, 500)).unwrap_err();
        assert!(matches!(err, ValidationError::Inconsistent { ref field, .. } if field == "changeValue"));
    }

    #[test]
    fn test_sale_without_lines_is_rejected() {
        let mut s = sale(1000, 1000, 0);
        s.sale_products.clear();
        assert!(matches!(
            validate_sale_totals(&s),
            Err(ValidationError::Required { .. })
        ));
    }
}
