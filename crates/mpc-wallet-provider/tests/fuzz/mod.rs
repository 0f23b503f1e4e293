//! Fuzz tests module
//!
//! Property-based testing using proptest to find edge cases:
//! - Typed-data validation fuzzing
//! - Registry and envelope fuzzing

pub mod typed_data_fuzz;
