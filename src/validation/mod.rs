use bigdecimal::BigDecimal;
use std::fmt;
use std::str::FromStr;

/// Fits the 25-character reference label sub-field of the BR Code.
pub const ORDER_REFERENCE_MAX_LEN: usize = 25;
/// Keeps the additional-data block under the 99-byte TLV limit.
pub const DESCRIPTION_MAX_LEN: usize = 60;
pub const OPERATOR_ID_MAX_LEN: usize = 64;
pub const CONFIRMATION_ID_MAX_LEN: usize = 255;
/// The amount field of a BR Code is capped at 13 characters.
pub const AMOUNT_MAX: &str = "9999999999.99";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_whitespace() { ' ' } else { ch })
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

/// Positive, at most two decimal places, and small enough to encode.
pub fn validate_payment_amount(amount: &BigDecimal) -> ValidationResult {
    validate_positive_amount(amount)?;

    if amount.with_scale(2) != *amount {
        return Err(ValidationError::new(
            "amount",
            "must have at most two decimal places",
        ));
    }

    let max = BigDecimal::from_str(AMOUNT_MAX)
        .map_err(|_| ValidationError::new("amount", "invalid upper bound"))?;
    if amount > &max {
        return Err(ValidationError::new(
            "amount",
            format!("must not exceed {}", AMOUNT_MAX),
        ));
    }

    Ok(())
}

pub fn validate_order_reference(reference: &str) -> ValidationResult {
    validate_required("orderReference", reference)?;
    validate_max_len("orderReference", reference, ORDER_REFERENCE_MAX_LEN)?;

    if !reference
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(ValidationError::new(
            "orderReference",
            "must contain only letters, digits, '-' or '_'",
        ));
    }

    Ok(())
}

pub fn validate_description(description: &str) -> ValidationResult {
    validate_max_len("description", description, DESCRIPTION_MAX_LEN)?;

    if !description.is_ascii() {
        return Err(ValidationError::new(
            "description",
            "must contain only ASCII characters",
        ));
    }

    Ok(())
}

pub fn validate_operator_id(operator: &str) -> ValidationResult {
    let operator = sanitize_string(operator);
    validate_required("operator", &operator)?;
    validate_max_len("operator", &operator, OPERATOR_ID_MAX_LEN)
}

pub fn validate_confirmation_id(confirmation_id: &str) -> ValidationResult {
    validate_required("bankTransactionId", confirmation_id)?;
    validate_max_len("bankTransactionId", confirmation_id, CONFIRMATION_ID_MAX_LEN)
}
