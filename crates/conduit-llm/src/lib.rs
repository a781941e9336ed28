//! Backend normalization for conduit
//!
//! One canonical conversation model converted to and from the `OpenAI`
//! chat completions, Anthropic Messages, and Gemini `generateContent`
//! wire formats, with a pipeline that drives a single call (plain or
//! streamed) through the adapter chosen from the resolved configuration.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod accumulator;
pub mod convert;
pub mod error;
pub mod error_handler;
pub mod observer;
pub mod pipeline;
pub mod protocol;
pub mod provider;
pub mod types;

pub use accumulator::{FinalizedToolCall, SlotState, ToolCallAccumulator};
pub use convert::{ConversionOptions, OrphanToolCallPolicy};
pub use error::{LlmError, ToolArgumentParseError};
pub use error_handler::{ErrorHandler, ErrorKind};
pub use observer::{CallEvent, CallInfo, CallObserver};
pub use pipeline::{ContentGenerationPipeline, PipelineOptions, ResponseStream};
pub use provider::{Adapter, AdapterOptions, Credentials, CredentialsProvider, ProviderAdapter, ProviderCapabilities};
pub use types::{
    Blob, Candidate, Content, FileData, FinishReason, FunctionCall, FunctionDeclaration, FunctionResponse,
    GenerateRequest, GenerateResponse, GenerationConfig, Part, Role, UsageMetadata,
};
