//! lbscale-common - Shared types and constants
//!
//! Types shared by the orchestration code that carry no process or network
//! dependencies.
//!
//! ## Modules
//!
//! - [`defaults`]: Default resource names, locations and tuning values
//! - [`instance_status`]: Compute Engine instance lifecycle states
//! - [`resource_kind`]: Kinds of managed resources and their teardown ordering
//! - [`stats`]: Latency statistics (min/avg/max)

pub mod defaults;
pub mod instance_status;
pub mod resource_kind;
pub mod stats;

pub use instance_status::InstanceStatus;
pub use resource_kind::ResourceKind;
pub use stats::LatencyStats;
