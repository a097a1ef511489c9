//! Identifier guard for provisioning DDL.
//!
//! `CREATE DATABASE` / `CREATE USER` statements cannot take bind parameters,
//! so every identifier that ends up inside a DDL string must pass through
//! here first.

use crate::error::{GatewayError, Result};

const MAX_IDENTIFIER_LEN: usize = 63;

/// Validate a database/user/table identifier.
///
/// Accepts `[A-Za-z_][A-Za-z0-9_]*` up to 63 bytes; everything else is
/// rejected before any DDL string is assembled.
pub fn validate_identifier(ident: &str) -> Result<&str> {
    let first = ident
        .chars()
        .next()
        .ok_or_else(|| GatewayError::InvalidIdentifier("empty identifier".into()))?;
    if ident.len() > MAX_IDENTIFIER_LEN {
        return Err(GatewayError::InvalidIdentifier(format!(
            "identifier too long ({} bytes): {}",
            ident.len(),
            ident
        )));
    }
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(GatewayError::InvalidIdentifier(format!(
            "identifier must start with a letter or underscore: {ident}"
        )));
    }
    if let Some(bad) = ident.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(GatewayError::InvalidIdentifier(format!(
            "identifier contains {bad:?}: {ident}"
        )));
    }
    Ok(ident)
}

/// Escape a string for use as a standard-conforming single-quoted SQL
/// literal (Postgres with `standard_conforming_strings`, the default since
/// 9.1: backslash is an ordinary character, only `'` needs doubling).
///
/// Only for password literals in `CREATE ROLE`; everything else uses bind
/// parameters.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("''"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Escape a string for use as a MySQL single-quoted literal, where backslash
/// is an escape character inside strings and must be doubled as well.
///
/// Only for password literals in `CREATE USER`; everything else uses bind
/// parameters.
pub fn quote_literal_mysql(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}
