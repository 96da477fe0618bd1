//! Default configuration values
//!
//! Resource names match the classic "HTTP load balancer with autoscaling"
//! demo so that an environment set up by hand can be torn down by lbscale.

/// Default VPC network
pub const DEFAULT_NETWORK: &str = "default";

/// Default location of the first backend
pub const DEFAULT_PRIMARY_REGION: &str = "us-central1";
pub const DEFAULT_PRIMARY_ZONE: &str = "us-central1-c";

/// Default location of the second backend
pub const DEFAULT_SECONDARY_REGION: &str = "europe-west1";
pub const DEFAULT_SECONDARY_ZONE: &str = "europe-west1-d";

/// Default location of the load generator host
pub const DEFAULT_LOADGEN_REGION: &str = "us-west1";
pub const DEFAULT_LOADGEN_ZONE: &str = "us-west1-c";

/// Machine type for backend instances and the image builder
pub const DEFAULT_MACHINE_TYPE: &str = "e2-micro";

/// Machine type for the load generator (ab at c=1000 needs more than a micro)
pub const DEFAULT_LOADGEN_MACHINE_TYPE: &str = "e2-standard-2";

/// Base image family for the builder VM
pub const DEFAULT_BASE_IMAGE_FAMILY: &str = "debian-12";
pub const DEFAULT_BASE_IMAGE_PROJECT: &str = "debian-cloud";

/// Network tag that the health-check firewall rule targets
pub const HEALTH_CHECK_TAG: &str = "allow-health-checks";

/// Google front-end and health checker source ranges
pub const HEALTH_CHECK_SOURCE_RANGES: &[&str] = &["130.211.0.0/22", "35.191.0.0/16"];

/// Port served by the backends
pub const HTTP_PORT: u16 = 80;

/// Named port used by the backend service
pub const NAMED_PORT: &str = "http";

/// Autoscaling bounds per instance group
pub const DEFAULT_MIN_REPLICAS: u32 = 1;
pub const DEFAULT_MAX_REPLICAS: u32 = 2;
pub const DEFAULT_TARGET_UTILIZATION: f64 = 0.8;
pub const DEFAULT_COOL_DOWN_SECS: u64 = 45;

/// Rate-based balancing capacity for the primary backend
pub const DEFAULT_MAX_RATE_PER_INSTANCE: u32 = 50;

/// Substring the load balancer response body must contain to count as serving
pub const DEFAULT_READY_MARKER: &str = "Apache2";

/// Default benchmark shape
pub const DEFAULT_BENCH_REQUESTS: u64 = 500_000;
pub const DEFAULT_BENCH_CONCURRENCY: u32 = 1_000;

/// Bounded readiness wait before a stress test (attempts x interval)
pub const DEFAULT_READY_ATTEMPTS: u32 = 30;
pub const DEFAULT_READY_INTERVAL_SECS: u64 = 10;

/// Cadence of the continuous monitor
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 10;

/// Name prefixes the teardown sweep considers part of the demo
pub const SWEEP_NAME_PATTERNS: &[&str] = &["webserver", "stress-test", "us-1-mig", "notus-1-mig"];
