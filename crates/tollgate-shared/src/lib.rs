//! # Tollgate Shared
//!
//! Wire types shared across the HTTP surface: response envelopes and
//! request DTOs.

pub mod dto;
pub mod response;

pub use response::{ApiResponse, ErrorBody};
