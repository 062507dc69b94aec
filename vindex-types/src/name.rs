use crate::constants::{
    MAX_DOMAIN_NAME_LEN, MAX_DOMAIN_RECORD_LEN, MAX_DOMAIN_YEARS, MAX_SYMBOL_LEN,
    MIN_DOMAIN_NAME_LEN, NATIVE_DENOM,
};
use crate::error::ValidationError;

/// Validate a domain name: lowercase alphanumerics, hyphens and dots, 3-32
/// chars, not starting or ending with a hyphen or dot.
pub fn validate_domain_name(name: &str) -> Result<(), ValidationError> {
    if name.len() < MIN_DOMAIN_NAME_LEN || name.len() > MAX_DOMAIN_NAME_LEN {
        return Err(ValidationError::InvalidName {
            reason: format!(
                "name must be {MIN_DOMAIN_NAME_LEN}-{MAX_DOMAIN_NAME_LEN} characters, got {}",
                name.len()
            ),
        });
    }
    let edge = |c: char| c == '-' || c == '.';
    if name.starts_with(edge) || name.ends_with(edge) {
        return Err(ValidationError::InvalidName {
            reason: "name must not start or end with a hyphen or dot".to_string(),
        });
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && !edge(*c))
    {
        return Err(ValidationError::InvalidName {
            reason: format!("name must be lowercase alphanumeric, hyphens or dots, found '{c}'"),
        });
    }
    Ok(())
}

/// Validate a registration or renewal period.
pub fn validate_years(years: u32) -> Result<(), ValidationError> {
    if years == 0 || years > MAX_DOMAIN_YEARS {
        return Err(ValidationError::Malformed {
            reason: format!("years must be 1-{MAX_DOMAIN_YEARS}, got {years}"),
        });
    }
    Ok(())
}

/// Validate a domain record payload.
pub fn validate_record(record: &str) -> Result<(), ValidationError> {
    if record.len() > MAX_DOMAIN_RECORD_LEN {
        return Err(ValidationError::Malformed {
            reason: format!(
                "record must be at most {MAX_DOMAIN_RECORD_LEN} bytes, got {}",
                record.len()
            ),
        });
    }
    Ok(())
}

/// Validate a token symbol: 1-12 uppercase alphanumerics, never the native denom.
pub fn validate_symbol(symbol: &str) -> Result<(), ValidationError> {
    if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LEN {
        return Err(ValidationError::Malformed {
            reason: format!(
                "symbol must be 1-{MAX_SYMBOL_LEN} characters, got {}",
                symbol.len()
            ),
        });
    }
    if symbol.eq_ignore_ascii_case(NATIVE_DENOM) {
        return Err(ValidationError::Malformed {
            reason: "symbol is reserved for the native denom".to_string(),
        });
    }
    if let Some(c) = symbol
        .chars()
        .find(|c| !c.is_ascii_uppercase() && !c.is_ascii_digit())
    {
        return Err(ValidationError::Malformed {
            reason: format!("symbol must be uppercase alphanumeric, found '{c}'"),
        });
    }
    Ok(())
}
