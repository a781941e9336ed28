//! Wire format types for provider-specific API protocols
//!
//! Each module contains pure serde structs matching the respective vendor's
//! JSON API format. These types are only used at the HTTP boundary.

pub mod anthropic;
pub mod gemini;
pub mod openai;
