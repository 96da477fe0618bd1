//! Kinds of managed resources, as named in progress output and reports

/// Kinds of cloud resources created by lbscale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ResourceKind {
    /// Ingress firewall rule admitting health-check probes
    FirewallRule,
    /// Cloud Router carrying the NAT configuration
    Router,
    /// Cloud NAT gateway on the router
    Nat,
    /// Throwaway VM used to bake the web server image
    BuilderInstance,
    /// Custom image baked from the builder disk
    Image,
    /// Instance template referencing the image
    InstanceTemplate,
    /// Health check shared by all instance groups
    HealthCheck,
    /// Regional managed instance group
    InstanceGroup,
    /// Global backend service aggregating the instance groups
    BackendService,
    /// URL map pointing at the backend service
    UrlMap,
    /// Target HTTP proxy bound to the URL map
    TargetProxy,
    /// Global forwarding rule (public entry point)
    ForwardingRule,
    /// Disposable load generator VM
    LoadGenerator,
    /// Stray instance found by the teardown sweep
    StrayInstance,
    /// Stray persistent disk found by the teardown sweep
    StrayDisk,
}
