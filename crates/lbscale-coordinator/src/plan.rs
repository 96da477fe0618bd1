//! Resource descriptors for the demo deployment
//!
//! `ResourcePlan` holds the static description of every resource the
//! orchestrators create, derived once from a `DeploymentConfig`. Names are
//! the single source of truth for cross-resource references.

use crate::config::{DeploymentConfig, Location};
use lbscale_common::defaults::{
    DEFAULT_BASE_IMAGE_FAMILY, DEFAULT_BASE_IMAGE_PROJECT, DEFAULT_COOL_DOWN_SECS,
    DEFAULT_MAX_RATE_PER_INSTANCE, DEFAULT_MAX_REPLICAS, DEFAULT_MIN_REPLICAS,
    DEFAULT_TARGET_UTILIZATION, HEALTH_CHECK_SOURCE_RANGES, HEALTH_CHECK_TAG, HTTP_PORT,
    NAMED_PORT,
};
use std::time::Duration;

/// Startup script baked into the web server image
pub const WEBSERVER_STARTUP_SCRIPT: &str = "#!/bin/bash
apt-get update
apt-get install -y apache2
systemctl enable apache2
";

/// Ingress firewall rule
#[derive(Debug, Clone, PartialEq)]
pub struct FirewallRule {
    pub name: String,
    pub network: String,
    pub target_tag: String,
    pub source_ranges: Vec<String>,
    /// `protocol:port` entries, e.g. `tcp:80`
    pub allowed: Vec<String>,
}

/// Cloud Router plus the NAT gateway it carries
#[derive(Debug, Clone, PartialEq)]
pub struct RouterNat {
    pub router: String,
    pub nat: String,
    pub network: String,
    pub region: String,
}

/// Boot image for a VM
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Latest image of a public family
    Family { family: String, project: String },
    /// Custom image in the demo project
    Custom(String),
}

/// A standalone VM
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSpec {
    pub name: String,
    pub zone: String,
    pub machine_type: String,
    pub network: String,
    pub image: ImageSource,
    pub tags: Vec<String>,
    /// Whether the VM gets an ephemeral public address
    pub external_address: bool,
    /// Keep the boot disk when the VM is deleted
    pub keep_boot_disk: bool,
    pub startup_script: Option<String>,
}

impl InstanceSpec {
    /// Region of the instance's zone (`us-central1-c` -> `us-central1`)
    pub fn region(&self) -> &str {
        self.zone
            .rsplit_once('-')
            .map_or(self.zone.as_str(), |(region, _)| region)
    }
}

/// Custom image baked from a builder VM's boot disk
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pub name: String,
    pub builder: InstanceSpec,
}

impl SourceImage {
    /// The builder's boot disk shares the VM name
    pub fn source_disk(&self) -> &str {
        &self.builder.name
    }

    pub fn source_disk_zone(&self) -> &str {
        &self.builder.zone
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceTemplate {
    pub name: String,
    pub image: String,
    pub machine_type: String,
    pub network: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum HealthCheckProtocol {
    Tcp,
    Http,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheck {
    pub name: String,
    pub protocol: HealthCheckProtocol,
    pub port: u16,
}

/// Autoscaling policy attached to a managed instance group
#[derive(Debug, Clone, PartialEq)]
pub struct Autoscaling {
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Fraction of backend serving capacity the autoscaler targets
    pub target_utilization: f64,
    pub cool_down: Duration,
}

/// Regional managed instance group
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceGroup {
    pub name: String,
    pub region: String,
    pub template: String,
    pub health_check: String,
    /// Time the autohealer waits before probing a new instance
    pub initial_delay: Duration,
    pub named_port: (String, u16),
    pub autoscaling: Autoscaling,
}

/// How the load balancer measures a backend's capacity
#[derive(Debug, Clone, PartialEq)]
pub enum BalancingMode {
    Rate { max_rate_per_instance: u32 },
    Utilization { max_utilization: f64 },
}

impl BalancingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalancingMode::Rate { .. } => "RATE",
            BalancingMode::Utilization { .. } => "UTILIZATION",
        }
    }
}

/// One instance group behind the backend service
#[derive(Debug, Clone, PartialEq)]
pub struct Backend {
    pub group: String,
    pub region: String,
    pub mode: BalancingMode,
    pub capacity_scaler: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub enable: bool,
    pub sample_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendService {
    pub name: String,
    pub protocol: String,
    pub port_name: String,
    pub health_check: String,
    pub backends: Vec<Backend>,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
pub enum IpVersion {
    #[strum(serialize = "IPV4")]
    V4,
    #[strum(serialize = "IPV6")]
    V6,
}

/// Global forwarding rule; its address is only known after creation
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardingRule {
    pub name: String,
    pub ip_version: IpVersion,
    pub port: u16,
}

/// URL map, target proxy and forwarding rules
#[derive(Debug, Clone, PartialEq)]
pub struct Frontend {
    pub url_map: String,
    pub target_proxy: String,
    pub default_service: String,
    pub forwarding_rules: Vec<ForwardingRule>,
}

impl Frontend {
    /// The IPv4 entry point used for probing and benchmarking
    pub fn ipv4_rule(&self) -> Option<&ForwardingRule> {
        self.forwarding_rules
            .iter()
            .find(|r| r.ip_version == IpVersion::V4)
    }
}

/// Every resource of the demo, in creation order
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePlan {
    pub firewall: FirewallRule,
    pub router_nat: RouterNat,
    pub image: SourceImage,
    pub template: InstanceTemplate,
    pub health_check: HealthCheck,
    pub groups: Vec<InstanceGroup>,
    pub backend_service: BackendService,
    pub frontend: Frontend,
    pub load_generator: InstanceSpec,
}

impl ResourcePlan {
    pub fn from_config(config: &DeploymentConfig) -> Self {
        let network = config.network.clone();
        let tag = HEALTH_CHECK_TAG.to_string();
        let image_name = "mywebserver".to_string();
        let template_name = "mywebserver-template".to_string();
        let health_check_name = "http-health-check".to_string();
        let backend_name = "http-backend".to_string();

        let firewall = FirewallRule {
            name: "fw-allow-health-checks".to_string(),
            network: network.clone(),
            target_tag: tag.clone(),
            source_ranges: HEALTH_CHECK_SOURCE_RANGES
                .iter()
                .map(|r| r.to_string())
                .collect(),
            allowed: vec![format!("tcp:{HTTP_PORT}")],
        };

        let router_nat = RouterNat {
            router: "nat-router-us1".to_string(),
            nat: "nat-config".to_string(),
            network: network.clone(),
            region: config.primary.region.clone(),
        };

        let image = SourceImage {
            name: image_name.clone(),
            builder: InstanceSpec {
                name: "webserver".to_string(),
                zone: config.primary.zone.clone(),
                machine_type: config.machine_type.clone(),
                network: network.clone(),
                image: ImageSource::Family {
                    family: DEFAULT_BASE_IMAGE_FAMILY.to_string(),
                    project: DEFAULT_BASE_IMAGE_PROJECT.to_string(),
                },
                tags: vec![tag.clone()],
                external_address: false,
                keep_boot_disk: true,
                startup_script: Some(WEBSERVER_STARTUP_SCRIPT.to_string()),
            },
        };

        let template = InstanceTemplate {
            name: template_name.clone(),
            image: image_name.clone(),
            machine_type: config.machine_type.clone(),
            network: network.clone(),
            tags: vec![tag],
        };

        let health_check = HealthCheck {
            name: health_check_name.clone(),
            protocol: HealthCheckProtocol::Tcp,
            port: HTTP_PORT,
        };

        let group = |name: &str, location: &Location| InstanceGroup {
            name: name.to_string(),
            region: location.region.clone(),
            template: template_name.clone(),
            health_check: health_check_name.clone(),
            initial_delay: Duration::from_secs(60),
            named_port: (NAMED_PORT.to_string(), HTTP_PORT),
            autoscaling: Autoscaling {
                min_replicas: DEFAULT_MIN_REPLICAS,
                max_replicas: DEFAULT_MAX_REPLICAS,
                target_utilization: DEFAULT_TARGET_UTILIZATION,
                cool_down: Duration::from_secs(DEFAULT_COOL_DOWN_SECS),
            },
        };
        let groups = vec![
            group("us-1-mig", &config.primary),
            group("notus-1-mig", &config.secondary),
        ];

        let backend_service = BackendService {
            name: backend_name.clone(),
            protocol: "HTTP".to_string(),
            port_name: NAMED_PORT.to_string(),
            health_check: health_check_name,
            backends: vec![
                Backend {
                    group: groups[0].name.clone(),
                    region: groups[0].region.clone(),
                    mode: BalancingMode::Rate {
                        max_rate_per_instance: DEFAULT_MAX_RATE_PER_INSTANCE,
                    },
                    capacity_scaler: 1.0,
                },
                Backend {
                    group: groups[1].name.clone(),
                    region: groups[1].region.clone(),
                    mode: BalancingMode::Utilization {
                        max_utilization: DEFAULT_TARGET_UTILIZATION,
                    },
                    capacity_scaler: 1.0,
                },
            ],
            logging: LogConfig {
                enable: true,
                sample_rate: 1.0,
            },
        };

        let frontend = Frontend {
            url_map: "http-lb".to_string(),
            target_proxy: "http-lb-target-proxy".to_string(),
            default_service: backend_name,
            forwarding_rules: vec![
                ForwardingRule {
                    name: "http-lb-forwarding-rule".to_string(),
                    ip_version: IpVersion::V4,
                    port: HTTP_PORT,
                },
                ForwardingRule {
                    name: "http-lb-forwarding-rule-ipv6".to_string(),
                    ip_version: IpVersion::V6,
                    port: HTTP_PORT,
                },
            ],
        };

        let load_generator = InstanceSpec {
            name: "stress-test".to_string(),
            zone: config.loadgen.zone.clone(),
            machine_type: config.loadgen_machine_type.clone(),
            network,
            image: ImageSource::Custom(image_name),
            tags: Vec::new(),
            external_address: true,
            keep_boot_disk: false,
            startup_script: None,
        };

        Self {
            firewall,
            router_nat,
            image,
            template,
            health_check,
            groups,
            backend_service,
            frontend,
            load_generator,
        }
    }

    pub fn group(&self, name: &str) -> Option<&InstanceGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}
