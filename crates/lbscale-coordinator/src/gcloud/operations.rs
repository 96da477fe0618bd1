//! Compute operations trait for testing

use super::error::GcloudResult;
use super::models::{
    BackendHealth, BackendServiceInfo, ForwardingRuleInfo, GroupInfo, ManagedInstance,
    ZonalResource,
};
use crate::plan::{
    Backend, BackendService, FirewallRule, ForwardingRule, Frontend, HealthCheck,
    InstanceGroup, InstanceSpec, InstanceTemplate, RouterNat, SourceImage,
};
use lbscale_common::InstanceStatus;
use std::future::Future;

/// Trait for every external compute operation the orchestrators issue.
///
/// Each method maps to one CLI call. Implemented by [`super::Gcloud`] for
/// real runs and by recording fakes in tests, so ordering and failure
/// policies can be verified without a cloud project.
pub trait ComputeApi: Send + Sync {
    // Firewall

    fn create_firewall_rule(&self, rule: &FirewallRule)
        -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_firewall_rule(&self, name: &str) -> impl Future<Output = GcloudResult<()>> + Send;

    // Router / NAT

    fn create_router(&self, router: &RouterNat) -> impl Future<Output = GcloudResult<()>> + Send;

    fn create_nat(&self, router: &RouterNat) -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_nat(&self, router: &RouterNat) -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_router(&self, router: &RouterNat) -> impl Future<Output = GcloudResult<()>> + Send;

    // Instances

    fn create_instance(&self, spec: &InstanceSpec)
        -> impl Future<Output = GcloudResult<()>> + Send;

    fn stop_instance(&self, name: &str, zone: &str)
        -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_instance(&self, name: &str, zone: &str)
        -> impl Future<Output = GcloudResult<()>> + Send;

    fn instance_status(
        &self,
        name: &str,
        zone: &str,
    ) -> impl Future<Output = GcloudResult<InstanceStatus>> + Send;

    /// Serial console output (used to detect startup-script completion)
    fn serial_output(&self, name: &str, zone: &str)
        -> impl Future<Output = GcloudResult<String>> + Send;

    /// Run a shell command on an instance over SSH and return its stdout
    fn ssh(
        &self,
        name: &str,
        zone: &str,
        command: &str,
    ) -> impl Future<Output = GcloudResult<String>> + Send;

    // Image and template

    fn image_exists(&self, name: &str) -> impl Future<Output = GcloudResult<bool>> + Send;

    fn create_image(&self, image: &SourceImage) -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_image(&self, name: &str) -> impl Future<Output = GcloudResult<()>> + Send;

    fn create_instance_template(
        &self,
        template: &InstanceTemplate,
    ) -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_instance_template(&self, name: &str)
        -> impl Future<Output = GcloudResult<()>> + Send;

    // Health check

    fn create_health_check(&self, check: &HealthCheck)
        -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_health_check(&self, name: &str) -> impl Future<Output = GcloudResult<()>> + Send;

    // Managed instance groups

    fn create_instance_group(
        &self,
        group: &InstanceGroup,
    ) -> impl Future<Output = GcloudResult<()>> + Send;

    fn set_named_ports(&self, group: &InstanceGroup)
        -> impl Future<Output = GcloudResult<()>> + Send;

    fn set_autoscaling(&self, group: &InstanceGroup)
        -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_instance_group(
        &self,
        name: &str,
        region: &str,
    ) -> impl Future<Output = GcloudResult<()>> + Send;

    fn describe_instance_group(
        &self,
        name: &str,
        region: &str,
    ) -> impl Future<Output = GcloudResult<GroupInfo>> + Send;

    fn list_group_instances(
        &self,
        name: &str,
        region: &str,
    ) -> impl Future<Output = GcloudResult<Vec<ManagedInstance>>> + Send;

    // Backend service

    fn create_backend_service(
        &self,
        service: &BackendService,
    ) -> impl Future<Output = GcloudResult<()>> + Send;

    fn add_backend(
        &self,
        service: &str,
        backend: &Backend,
    ) -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_backend_service(&self, name: &str)
        -> impl Future<Output = GcloudResult<()>> + Send;

    fn describe_backend_service(
        &self,
        name: &str,
    ) -> impl Future<Output = GcloudResult<BackendServiceInfo>> + Send;

    fn backend_health(
        &self,
        service: &str,
    ) -> impl Future<Output = GcloudResult<Vec<BackendHealth>>> + Send;

    // Frontend

    fn create_url_map(&self, frontend: &Frontend) -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_url_map(&self, name: &str) -> impl Future<Output = GcloudResult<()>> + Send;

    fn create_target_proxy(&self, frontend: &Frontend)
        -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_target_proxy(&self, name: &str) -> impl Future<Output = GcloudResult<()>> + Send;

    fn create_forwarding_rule(
        &self,
        rule: &ForwardingRule,
        target_proxy: &str,
    ) -> impl Future<Output = GcloudResult<()>> + Send;

    fn delete_forwarding_rule(&self, name: &str)
        -> impl Future<Output = GcloudResult<()>> + Send;

    /// Address assigned to a forwarding rule, `None` if the rule is missing
    fn forwarding_rule_address(
        &self,
        name: &str,
    ) -> impl Future<Output = GcloudResult<Option<String>>> + Send;

    fn list_forwarding_rules(
        &self,
        names: &[String],
    ) -> impl Future<Output = GcloudResult<Vec<ForwardingRuleInfo>>> + Send;

    // Sweep

    /// Instances whose names start with any of the prefixes
    fn list_instances_matching(
        &self,
        prefixes: &[&str],
    ) -> impl Future<Output = GcloudResult<Vec<ZonalResource>>> + Send;

    /// Disks whose names start with any of the prefixes
    fn list_disks_matching(
        &self,
        prefixes: &[&str],
    ) -> impl Future<Output = GcloudResult<Vec<ZonalResource>>> + Send;

    fn delete_disk(&self, name: &str, zone: &str) -> impl Future<Output = GcloudResult<()>> + Send;
}
