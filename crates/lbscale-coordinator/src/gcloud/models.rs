//! Structured gcloud output (`--format=json`) used by status and sweep queries

use serde::Deserialize;

/// Last path segment of a resource URL (`.../instanceGroups/us-1-mig` -> `us-1-mig`)
pub fn resource_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingRuleInfo {
    pub name: String,
    #[serde(rename = "IPAddress", default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub ip_version: Option<String>,
    #[serde(default)]
    pub port_range: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendInfo {
    /// Instance group URL
    pub group: String,
    #[serde(default)]
    pub balancing_mode: Option<String>,
    #[serde(default)]
    pub max_rate_per_instance: Option<f64>,
    #[serde(default)]
    pub max_utilization: Option<f64>,
    #[serde(default)]
    pub capacity_scaler: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfigInfo {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub sample_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendServiceInfo {
    pub name: String,
    #[serde(default)]
    pub backends: Vec<BackendInfo>,
    #[serde(default)]
    pub health_checks: Vec<String>,
    #[serde(default)]
    pub log_config: Option<LogConfigInfo>,
}

/// One entry of `backend-services get-health`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendHealth {
    /// Instance group URL
    pub backend: String,
    #[serde(default)]
    pub status: BackendHealthStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendHealthStatus {
    #[serde(default)]
    pub health_status: Vec<InstanceHealth>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceHealth {
    pub instance: String,
    #[serde(default)]
    pub health_state: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl InstanceHealth {
    pub fn is_healthy(&self) -> bool {
        self.health_state.as_deref() == Some("HEALTHY")
    }
}

impl BackendHealth {
    pub fn healthy_count(&self) -> usize {
        self.status
            .health_status
            .iter()
            .filter(|h| h.is_healthy())
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.status.health_status.len()
    }
}

/// Output of `instance-groups managed describe`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub name: String,
    #[serde(default)]
    pub target_size: Option<u32>,
    #[serde(default)]
    pub status: Option<GroupStatusInfo>,
    /// Autoscaler gcloud embeds in the describe output, if one is attached
    #[serde(default)]
    pub autoscaler: Option<AutoscalerInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatusInfo {
    #[serde(default)]
    pub is_stable: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerInfo {
    #[serde(default)]
    pub autoscaling_policy: Option<AutoscalingPolicyInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingPolicyInfo {
    #[serde(default)]
    pub min_num_replicas: Option<u32>,
    #[serde(default)]
    pub max_num_replicas: Option<u32>,
}

impl GroupInfo {
    pub fn is_stable(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.is_stable)
    }

    /// `(min, max)` replicas of the attached autoscaler
    pub fn replica_bounds(&self) -> Option<(u32, u32)> {
        let policy = self.autoscaler.as_ref()?.autoscaling_policy.as_ref()?;
        // minNumReplicas is omitted from the JSON when it is zero
        Some((policy.min_num_replicas.unwrap_or(0), policy.max_num_replicas?))
    }
}

/// One entry of `instance-groups managed list-instances`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedInstance {
    /// Instance URL
    pub instance: String,
    #[serde(default)]
    pub instance_status: Option<String>,
    #[serde(default)]
    pub current_action: Option<String>,
}

impl ManagedInstance {
    pub fn name(&self) -> &str {
        resource_name(&self.instance)
    }
}

/// Zonal resource found by a name-pattern listing (instances, disks)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZonalResource {
    pub name: String,
    /// Zone URL as returned by the API
    pub zone: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl ZonalResource {
    pub fn zone_name(&self) -> &str {
        resource_name(&self.zone)
    }
}
