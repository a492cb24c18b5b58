//! # TCB Common Library
//!
//! Shared code for the telecom↔CRM bridge:
//! - Error types
//! - Configuration loading
//! - Phone number normalization
//! - CRM property-map model

pub mod config;
pub mod error;
pub mod phone;
pub mod props;

pub use error::{Error, Result};
pub use phone::CanonicalPhone;
pub use props::PropertyMap;
