//! Integration tests module
//!
//! End-to-end provider flows driven through a channel popup host.

pub mod dispatch_test;
pub mod policy_test;
