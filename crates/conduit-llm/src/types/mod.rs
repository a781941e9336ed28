//! Canonical request and response types
//!
//! These types are backend-agnostic. Every vendor wire format converts to
//! and from them.

pub mod content;
pub mod request;
pub mod response;

pub use content::{Blob, Content, FileData, FunctionCall, FunctionResponse, Part, Role};
pub use request::{FunctionDeclaration, GenerateRequest, GenerationConfig};
pub use response::{Candidate, FinishReason, GenerateResponse, UsageMetadata};
