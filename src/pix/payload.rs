//! BR Code payload encoder and decoder.
//!
//! Field order is fixed; the checksum is only valid when the bytes are
//! assembled exactly in this order.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use thiserror::Error;

use super::crc::crc16_hex;
use super::tlv::{self, TlvError};

pub const PIX_DOMAIN: &str = "br.gov.bcb.pix";
pub const CURRENCY_BRL: &str = "986";
pub const COUNTRY_CODE: &str = "BR";
pub const MERCHANT_NAME_MAX_CHARS: usize = 25;
pub const MERCHANT_CITY_MAX_CHARS: usize = 15;

const TAG_FORMAT_INDICATOR: &str = "00";
const TAG_MERCHANT_ACCOUNT: &str = "26";
const TAG_CATEGORY_CODE: &str = "52";
const TAG_CURRENCY: &str = "53";
const TAG_AMOUNT: &str = "54";
const TAG_COUNTRY: &str = "58";
const TAG_MERCHANT_NAME: &str = "59";
const TAG_MERCHANT_CITY: &str = "60";
const TAG_ADDITIONAL_DATA: &str = "62";
const TAG_CRC: &str = "63";

// Sub-tags of the merchant account block.
const SUB_DOMAIN: &str = "00";
const SUB_KEY: &str = "01";

// Sub-tags of the additional data block.
const SUB_REFERENCE: &str = "05";
const SUB_DESCRIPTION: &str = "99";

const CRC_PREFIX: &str = "6304";

#[derive(Debug, Error)]
pub enum PixCodeError {
    #[error("PIX key is not configured")]
    MissingPixKey,

    #[error(transparent)]
    Tlv(#[from] TlvError),

    #[error("checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch { expected: String, found: String },

    #[error("payload has no checksum field")]
    MissingChecksum,

    #[error("payload is missing field {0}")]
    MissingField(&'static str),

    #[error("invalid amount in payload: {0}")]
    InvalidAmount(String),
}

/// Inputs for one scannable payment code.
#[derive(Debug, Clone)]
pub struct BrCode<'a> {
    pub pix_key: Option<&'a str>,
    pub amount: &'a BigDecimal,
    pub merchant_name: &'a str,
    pub merchant_city: &'a str,
    pub merchant_category_code: &'a str,
    pub description: Option<&'a str>,
    pub order_reference: Option<&'a str>,
}

/// A payload split back into its fields after the checksum was verified.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBrCode {
    pub pix_key: String,
    pub amount: Option<BigDecimal>,
    pub merchant_name: String,
    pub merchant_city: String,
    pub merchant_category_code: String,
    pub currency: String,
    pub country_code: String,
    pub order_reference: Option<String>,
    pub description: Option<String>,
    pub checksum: String,
}

/// Formats an amount with exactly two decimal places, rounding half up.
pub fn format_amount(amount: &BigDecimal) -> String {
    amount.round(2).with_scale(2).to_string()
}

fn truncate_upper(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect::<String>().to_uppercase()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Builds the payload string, checksum included.
pub fn encode(code: &BrCode<'_>) -> Result<String, PixCodeError> {
    let pix_key = non_empty(code.pix_key).ok_or(PixCodeError::MissingPixKey)?;

    let mut merchant_account = String::new();
    tlv::write_field(&mut merchant_account, SUB_DOMAIN, PIX_DOMAIN)?;
    tlv::write_field(&mut merchant_account, SUB_KEY, pix_key)?;

    let mut additional_data = String::new();
    if let Some(reference) = non_empty(code.order_reference) {
        tlv::write_field(&mut additional_data, SUB_REFERENCE, reference)?;
    }
    if let Some(description) = non_empty(code.description) {
        tlv::write_field(&mut additional_data, SUB_DESCRIPTION, description)?;
    }

    let mut payload = String::with_capacity(160);
    tlv::write_field(&mut payload, TAG_FORMAT_INDICATOR, "01")?;
    tlv::write_field(&mut payload, TAG_MERCHANT_ACCOUNT, &merchant_account)?;
    tlv::write_field(&mut payload, TAG_CATEGORY_CODE, code.merchant_category_code)?;
    tlv::write_field(&mut payload, TAG_CURRENCY, CURRENCY_BRL)?;
    if code.amount > &BigDecimal::from(0) {
        tlv::write_field(&mut payload, TAG_AMOUNT, &format_amount(code.amount))?;
    }
    tlv::write_field(&mut payload, TAG_COUNTRY, COUNTRY_CODE)?;
    tlv::write_field(
        &mut payload,
        TAG_MERCHANT_NAME,
        &truncate_upper(code.merchant_name, MERCHANT_NAME_MAX_CHARS),
    )?;
    tlv::write_field(
        &mut payload,
        TAG_MERCHANT_CITY,
        &truncate_upper(code.merchant_city, MERCHANT_CITY_MAX_CHARS),
    )?;
    tlv::write_field(&mut payload, TAG_ADDITIONAL_DATA, &additional_data)?;

    payload.push_str(CRC_PREFIX);
    let crc = crc16_hex(&payload);
    payload.push_str(&crc);

    Ok(payload)
}

/// True when the trailing checksum matches everything preceding it.
pub fn verify_checksum(payload: &str) -> bool {
    split_checksum(payload)
        .map(|(body, found)| crc16_hex(body) == found)
        .unwrap_or(false)
}

fn split_checksum(payload: &str) -> Option<(&str, &str)> {
    let cut = payload.len().checked_sub(4)?;
    let body = payload.get(..cut)?;
    let found = payload.get(cut..)?;
    if !body.ends_with(CRC_PREFIX) {
        return None;
    }
    Some((body, found))
}

/// Parses a payload produced by [`encode`] (or any conforming BR Code).
pub fn decode(payload: &str) -> Result<DecodedBrCode, PixCodeError> {
    let (body, found) = split_checksum(payload).ok_or(PixCodeError::MissingChecksum)?;
    let expected = crc16_hex(body);
    if expected != found {
        return Err(PixCodeError::ChecksumMismatch {
            expected,
            found: found.to_string(),
        });
    }

    let fields = tlv::parse(payload)?;
    let required = |tag: &str, name: &'static str| {
        tlv::find(&fields, tag)
            .map(str::to_string)
            .ok_or(PixCodeError::MissingField(name))
    };

    let merchant_account = tlv::find(&fields, TAG_MERCHANT_ACCOUNT)
        .ok_or(PixCodeError::MissingField("merchant_account"))?;
    let account_fields = tlv::parse(merchant_account)?;
    let pix_key = tlv::find(&account_fields, SUB_KEY)
        .ok_or(PixCodeError::MissingField("pix_key"))?
        .to_string();

    let amount = tlv::find(&fields, TAG_AMOUNT)
        .map(|raw| BigDecimal::from_str(raw).map_err(|_| PixCodeError::InvalidAmount(raw.to_string())))
        .transpose()?;

    let (order_reference, description) = match tlv::find(&fields, TAG_ADDITIONAL_DATA) {
        Some(block) => {
            let inner = tlv::parse(block)?;
            (
                tlv::find(&inner, SUB_REFERENCE).map(str::to_string),
                tlv::find(&inner, SUB_DESCRIPTION).map(str::to_string),
            )
        }
        None => (None, None),
    };

    Ok(DecodedBrCode {
        pix_key,
        amount,
        merchant_name: required(TAG_MERCHANT_NAME, "merchant_name")?,
        merchant_city: required(TAG_MERCHANT_CITY, "merchant_city")?,
        merchant_category_code: required(TAG_CATEGORY_CODE, "merchant_category_code")?,
        currency: required(TAG_CURRENCY, "currency")?,
        country_code: required(TAG_COUNTRY, "country_code")?,
        order_reference,
        description,
        checksum: required(TAG_CRC, "checksum")?,
    })
}
