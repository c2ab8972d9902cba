//! # Tirta Common Library
//!
//! Shared code for the Tirta water-metering services including:
//! - Common error type
//! - Event types (TirtaEvent enum) and the broadcast EventBus
//! - Configuration loading and data folder resolution
//! - Tiered pricing arithmetic

pub mod config;
pub mod error;
pub mod events;
pub mod pricing;

pub use error::{Error, Result};
