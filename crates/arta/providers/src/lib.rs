//! Provider router: a uniform facade over chat and embedding vendors.
//!
//! Providers are described by small capability records (endpoint, header
//! builder, payload builder, response parser) selected by name, so adding a
//! vendor never touches callers. The router wraps every upstream call with
//! bounded retry, exponential backoff and explicit cancellation, and exposes
//! three typed operations (intent classification, transaction extraction,
//! month summarisation) on top of raw `chat`.

#![deny(unsafe_code)]

mod error;
mod ops;
mod registry;
mod router;
mod transport;

pub use error::{ProviderError, ProviderResult};
pub use ops::{coerce_json, unknown_classification, ModelGateway, SummarizeRequest};
pub use registry::{builtin_spec, ProviderName, ProviderSpec};
pub use router::{
    ChatOptions, ChatOutcome, EmbedOptions, EmbedOutcome, ProviderRouter, RetryPolicy, Usage,
    EMBED_BATCH_LIMIT, EMBED_TEXT_LIMIT,
};
pub use transport::{HttpCall, ProviderTransport, ReqwestTransport};
