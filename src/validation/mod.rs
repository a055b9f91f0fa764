//! Validation functionality
//!
//! Provides identifier canonicalization and quoting, and the validation error
//! shared by batches, dialects and stagers.

pub mod input;

pub use input::{
    IdentifierPolicy, MAX_IDENTIFIER_LENGTH, ValidationError, ValidationResult,
    canonicalize_identifier, quote_identifier, suffixed_identifier,
};
