//! gcloud CLI command layer

mod compute;
pub mod error;
pub mod models;
mod operations;
mod runner;

pub use compute::Gcloud;
pub use error::{ignore_already_exists, ignore_not_found, GcloudError, GcloudResult};
pub use operations::ComputeApi;
pub use runner::{CommandRunner, ProcessRunner};
