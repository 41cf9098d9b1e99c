//! Provider adapters for GenTask.
//!
//! Each external generation service is normalized into the
//! [`GenerationProvider`] contract: `submit(spec) -> JobHandle`,
//! `poll(handle) -> PollStatus`. Transport differences (request/poll JSON
//! vs. chunked event streams) are hidden inside the adapters; the task
//! state machine and fallback coordinator never see provider wire shapes.

pub mod adapter;
pub mod error;
pub mod pulsar;
pub mod upload;
pub mod veyra;

pub use adapter::{GenerationProvider, JobHandle, PollStatus};
pub use error::{ProviderError, ProviderResult};
pub use pulsar::PulsarClient;
pub use upload::{HttpUploader, MediaUploader, UploadError, UploadResult};
pub use veyra::VeyraClient;
