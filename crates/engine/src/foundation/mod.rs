//! Foundation module - Core utilities and types
//!
//! - Math types and operations
//! - Bounding volumes and frustum culling
//! - Time management
//! - Logging setup

pub mod math;
pub mod bounds;
pub mod time;
pub mod logging;
