//! Compute Engine instance lifecycle states
//!
//! Parsed from the `status` field of `gcloud compute instances describe`.

/// Instance status as reported by Compute Engine
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum InstanceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Suspending,
    Suspended,
    Repairing,
    /// A stopped instance; Compute Engine reports stopped VMs as TERMINATED
    Terminated,
}

impl InstanceStatus {
    /// Parse from string, returning None for unknown values
    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse().ok()
    }

    /// Check if the instance is fully stopped (its disk can be imaged)
    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Terminated)
    }
}
