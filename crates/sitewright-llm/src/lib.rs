//! Unified model gateway for the Sitewright factory.
//!
//! Wraps one or more generative-model providers behind a single
//! request/response shape, with rate-limit backoff and best-effort usage
//! reporting. Providers differ in how they nest the textual payload;
//! extraction here tolerates missing fields instead of raising.

mod anthropic;
mod gateway;
mod openai;
mod provider;
mod types;

pub use anthropic::AnthropicAdapter;
pub use gateway::{LogReporter, ModelGateway, UsageReporter};
pub use openai::OpenAiAdapter;
pub use provider::{DynProvider, ProviderAdapter};
pub use types::{ContentPart, FinishReason, Message, Request, Response, Role, Usage};
