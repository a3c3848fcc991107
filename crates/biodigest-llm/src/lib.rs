//! biodigest-llm — LLM backends, paper classification with bounded retry,
//! and the digest summary.

pub mod backend;
pub mod batch;
pub mod classifier;
pub mod retry;
pub mod summarize;

pub use backend::{build_backend, LlmBackend, LlmError, LlmRequest, LlmResponse, Message, Provider};
pub use batch::{classify_batch, classify_one_with_retry};
pub use classifier::{debug_verdict, parse_verdict, ClassifyError, LlmClassifier, PaperClassifier};
pub use retry::{fallback_verdict, RetryPolicy, FALLBACK_RELEVANCE};
pub use summarize::{DigestSummarizer, DigestSummary};
