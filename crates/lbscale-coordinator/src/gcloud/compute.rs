//! `ComputeApi` backed by the gcloud CLI
//!
//! Each operation builds the argv for one `gcloud compute` invocation.
//! Queries whose output is parsed request `--format=json` (or a single
//! `value(...)` field) instead of scraping the default table output.

use super::error::{ignore_not_found, GcloudError, GcloudResult};
use super::models::{
    BackendHealth, BackendServiceInfo, ForwardingRuleInfo, GroupInfo, ManagedInstance,
    ZonalResource,
};
use super::operations::ComputeApi;
use super::runner::CommandRunner;
use crate::plan::{
    Backend, BackendService, BalancingMode, FirewallRule, ForwardingRule, Frontend,
    HealthCheck, ImageSource, InstanceGroup, InstanceSpec, InstanceTemplate, RouterNat,
    SourceImage,
};
use lbscale_common::InstanceStatus;
use serde::de::DeserializeOwned;

/// Build an argv from fixed leading words
fn argv<const N: usize>(words: [&str; N]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// gcloud regex filter matching names that start with any prefix
fn name_prefix_filter(prefixes: &[&str]) -> String {
    format!("--filter=name~^({})", prefixes.join("|"))
}

/// Compute client that shells out to gcloud
#[derive(Debug, Clone)]
pub struct Gcloud<R> {
    runner: R,
}

impl<R: CommandRunner> Gcloud<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn exec(&self, args: Vec<String>) -> GcloudResult<()> {
        self.runner.run(&args).await.map(|_| ())
    }

    async fn query(&self, args: Vec<String>) -> GcloudResult<String> {
        self.runner.run(&args).await
    }

    async fn query_json<T: DeserializeOwned>(&self, args: Vec<String>) -> GcloudResult<T> {
        let output = self.runner.run(&args).await?;
        Ok(serde_json::from_str(&output)?)
    }
}

impl<R: CommandRunner> ComputeApi for Gcloud<R> {
    async fn create_firewall_rule(&self, rule: &FirewallRule) -> GcloudResult<()> {
        let mut args = argv(["compute", "firewall-rules", "create", &rule.name]);
        args.extend([
            format!("--network={}", rule.network),
            "--action=ALLOW".to_string(),
            "--direction=INGRESS".to_string(),
            format!("--source-ranges={}", rule.source_ranges.join(",")),
            format!("--target-tags={}", rule.target_tag),
            format!("--rules={}", rule.allowed.join(",")),
        ]);
        self.exec(args).await
    }

    async fn delete_firewall_rule(&self, name: &str) -> GcloudResult<()> {
        self.exec(argv(["compute", "firewall-rules", "delete", name]))
            .await
    }

    async fn create_router(&self, router: &RouterNat) -> GcloudResult<()> {
        let mut args = argv(["compute", "routers", "create", &router.router]);
        args.push(format!("--network={}", router.network));
        args.push(format!("--region={}", router.region));
        self.exec(args).await
    }

    async fn create_nat(&self, router: &RouterNat) -> GcloudResult<()> {
        let mut args = argv(["compute", "routers", "nats", "create", &router.nat]);
        args.extend([
            format!("--router={}", router.router),
            format!("--region={}", router.region),
            "--auto-allocate-nat-external-ips".to_string(),
            "--nat-all-subnet-ip-ranges".to_string(),
        ]);
        self.exec(args).await
    }

    async fn delete_nat(&self, router: &RouterNat) -> GcloudResult<()> {
        let mut args = argv(["compute", "routers", "nats", "delete", &router.nat]);
        args.push(format!("--router={}", router.router));
        args.push(format!("--region={}", router.region));
        self.exec(args).await
    }

    async fn delete_router(&self, router: &RouterNat) -> GcloudResult<()> {
        let mut args = argv(["compute", "routers", "delete", &router.router]);
        args.push(format!("--region={}", router.region));
        self.exec(args).await
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> GcloudResult<()> {
        let mut args = argv(["compute", "instances", "create", &spec.name]);
        args.push(format!("--zone={}", spec.zone));
        args.push(format!("--machine-type={}", spec.machine_type));
        args.push(format!("--network={}", spec.network));
        match &spec.image {
            ImageSource::Family { family, project } => {
                args.push(format!("--image-family={family}"));
                args.push(format!("--image-project={project}"));
            }
            ImageSource::Custom(image) => args.push(format!("--image={image}")),
        }
        if !spec.tags.is_empty() {
            args.push(format!("--tags={}", spec.tags.join(",")));
        }
        if !spec.external_address {
            args.push("--no-address".to_string());
        }
        if spec.keep_boot_disk {
            args.push("--no-boot-disk-auto-delete".to_string());
        }
        if let Some(script) = &spec.startup_script {
            args.push(format!("--metadata=startup-script={script}"));
        }
        self.exec(args).await
    }

    async fn stop_instance(&self, name: &str, zone: &str) -> GcloudResult<()> {
        let mut args = argv(["compute", "instances", "stop", name]);
        args.push(format!("--zone={zone}"));
        self.exec(args).await
    }

    async fn delete_instance(&self, name: &str, zone: &str) -> GcloudResult<()> {
        let mut args = argv(["compute", "instances", "delete", name]);
        args.push(format!("--zone={zone}"));
        self.exec(args).await
    }

    async fn instance_status(&self, name: &str, zone: &str) -> GcloudResult<InstanceStatus> {
        let mut args = argv(["compute", "instances", "describe", name]);
        args.push(format!("--zone={zone}"));
        args.push("--format=value(status)".to_string());
        let output = self.query(args).await?;
        InstanceStatus::parse(&output).ok_or_else(|| GcloudError::Command {
            status: None,
            message: format!("unrecognised status '{}' for instance {name}", output.trim()),
        })
    }

    async fn serial_output(&self, name: &str, zone: &str) -> GcloudResult<String> {
        let mut args = argv(["compute", "instances", "get-serial-port-output", name]);
        args.push(format!("--zone={zone}"));
        self.query(args).await
    }

    async fn ssh(&self, name: &str, zone: &str, command: &str) -> GcloudResult<String> {
        let mut args = argv(["compute", "ssh", name]);
        args.push(format!("--zone={zone}"));
        args.push(format!("--command={command}"));
        self.query(args).await
    }

    async fn image_exists(&self, name: &str) -> GcloudResult<bool> {
        let args = argv(["compute", "images", "describe", name, "--format=value(name)"]);
        Ok(ignore_not_found(self.query(args).await)?.is_some())
    }

    async fn create_image(&self, image: &SourceImage) -> GcloudResult<()> {
        let mut args = argv(["compute", "images", "create", &image.name]);
        args.push(format!("--source-disk={}", image.source_disk()));
        args.push(format!("--source-disk-zone={}", image.source_disk_zone()));
        self.exec(args).await
    }

    async fn delete_image(&self, name: &str) -> GcloudResult<()> {
        self.exec(argv(["compute", "images", "delete", name])).await
    }

    async fn create_instance_template(&self, template: &InstanceTemplate) -> GcloudResult<()> {
        let mut args = argv(["compute", "instance-templates", "create", &template.name]);
        args.extend([
            format!("--machine-type={}", template.machine_type),
            format!("--image={}", template.image),
            format!("--network={}", template.network),
            format!("--tags={}", template.tags.join(",")),
            "--no-address".to_string(),
        ]);
        self.exec(args).await
    }

    async fn delete_instance_template(&self, name: &str) -> GcloudResult<()> {
        self.exec(argv(["compute", "instance-templates", "delete", name]))
            .await
    }

    async fn create_health_check(&self, check: &HealthCheck) -> GcloudResult<()> {
        let mut args = argv(["compute", "health-checks", "create", check.protocol.as_ref()]);
        args.push(check.name.clone());
        args.push(format!("--port={}", check.port));
        self.exec(args).await
    }

    async fn delete_health_check(&self, name: &str) -> GcloudResult<()> {
        self.exec(argv(["compute", "health-checks", "delete", name]))
            .await
    }

    async fn create_instance_group(&self, group: &InstanceGroup) -> GcloudResult<()> {
        let mut args = argv(["compute", "instance-groups", "managed", "create", &group.name]);
        args.extend([
            format!("--region={}", group.region),
            format!("--template={}", group.template),
            format!("--size={}", group.autoscaling.min_replicas),
            format!("--health-check={}", group.health_check),
            format!("--initial-delay={}s", group.initial_delay.as_secs()),
        ]);
        self.exec(args).await
    }

    async fn set_named_ports(&self, group: &InstanceGroup) -> GcloudResult<()> {
        let (port_name, port) = &group.named_port;
        let mut args = argv([
            "compute",
            "instance-groups",
            "managed",
            "set-named-ports",
            &group.name,
        ]);
        args.push(format!("--region={}", group.region));
        args.push(format!("--named-ports={port_name}:{port}"));
        self.exec(args).await
    }

    async fn set_autoscaling(&self, group: &InstanceGroup) -> GcloudResult<()> {
        let policy = &group.autoscaling;
        let mut args = argv([
            "compute",
            "instance-groups",
            "managed",
            "set-autoscaling",
            &group.name,
        ]);
        args.extend([
            format!("--region={}", group.region),
            format!("--min-num-replicas={}", policy.min_replicas),
            format!("--max-num-replicas={}", policy.max_replicas),
            format!(
                "--target-load-balancing-utilization={}",
                policy.target_utilization
            ),
            format!("--cool-down-period={}s", policy.cool_down.as_secs()),
        ]);
        self.exec(args).await
    }

    async fn delete_instance_group(&self, name: &str, region: &str) -> GcloudResult<()> {
        let mut args = argv(["compute", "instance-groups", "managed", "delete", name]);
        args.push(format!("--region={region}"));
        self.exec(args).await
    }

    async fn describe_instance_group(&self, name: &str, region: &str) -> GcloudResult<GroupInfo> {
        let mut args = argv(["compute", "instance-groups", "managed", "describe", name]);
        args.push(format!("--region={region}"));
        args.push("--format=json".to_string());
        self.query_json(args).await
    }

    async fn list_group_instances(
        &self,
        name: &str,
        region: &str,
    ) -> GcloudResult<Vec<ManagedInstance>> {
        let mut args = argv(["compute", "instance-groups", "managed", "list-instances", name]);
        args.push(format!("--region={region}"));
        args.push("--format=json".to_string());
        self.query_json(args).await
    }

    async fn create_backend_service(&self, service: &BackendService) -> GcloudResult<()> {
        let mut args = argv(["compute", "backend-services", "create", &service.name]);
        args.extend([
            format!("--protocol={}", service.protocol),
            format!("--port-name={}", service.port_name),
            format!("--health-checks={}", service.health_check),
            "--global".to_string(),
        ]);
        if service.logging.enable {
            args.push("--enable-logging".to_string());
            args.push(format!(
                "--logging-sample-rate={}",
                service.logging.sample_rate
            ));
        }
        self.exec(args).await
    }

    async fn add_backend(&self, service: &str, backend: &Backend) -> GcloudResult<()> {
        let mut args = argv(["compute", "backend-services", "add-backend", service]);
        args.extend([
            "--global".to_string(),
            format!("--instance-group={}", backend.group),
            format!("--instance-group-region={}", backend.region),
            format!("--balancing-mode={}", backend.mode.as_str()),
        ]);
        match backend.mode {
            BalancingMode::Rate {
                max_rate_per_instance,
            } => args.push(format!("--max-rate-per-instance={max_rate_per_instance}")),
            BalancingMode::Utilization { max_utilization } => {
                args.push(format!("--max-utilization={max_utilization}"))
            }
        }
        args.push(format!("--capacity-scaler={}", backend.capacity_scaler));
        self.exec(args).await
    }

    async fn delete_backend_service(&self, name: &str) -> GcloudResult<()> {
        self.exec(argv(["compute", "backend-services", "delete", name, "--global"]))
            .await
    }

    async fn describe_backend_service(&self, name: &str) -> GcloudResult<BackendServiceInfo> {
        self.query_json(argv([
            "compute",
            "backend-services",
            "describe",
            name,
            "--global",
            "--format=json",
        ]))
        .await
    }

    async fn backend_health(&self, service: &str) -> GcloudResult<Vec<BackendHealth>> {
        self.query_json(argv([
            "compute",
            "backend-services",
            "get-health",
            service,
            "--global",
            "--format=json",
        ]))
        .await
    }

    async fn create_url_map(&self, frontend: &Frontend) -> GcloudResult<()> {
        let mut args = argv(["compute", "url-maps", "create", &frontend.url_map]);
        args.push(format!("--default-service={}", frontend.default_service));
        self.exec(args).await
    }

    async fn delete_url_map(&self, name: &str) -> GcloudResult<()> {
        self.exec(argv(["compute", "url-maps", "delete", name])).await
    }

    async fn create_target_proxy(&self, frontend: &Frontend) -> GcloudResult<()> {
        let mut args = argv([
            "compute",
            "target-http-proxies",
            "create",
            &frontend.target_proxy,
        ]);
        args.push(format!("--url-map={}", frontend.url_map));
        self.exec(args).await
    }

    async fn delete_target_proxy(&self, name: &str) -> GcloudResult<()> {
        self.exec(argv(["compute", "target-http-proxies", "delete", name]))
            .await
    }

    async fn create_forwarding_rule(
        &self,
        rule: &ForwardingRule,
        target_proxy: &str,
    ) -> GcloudResult<()> {
        let mut args = argv(["compute", "forwarding-rules", "create", &rule.name]);
        args.extend([
            "--global".to_string(),
            format!("--target-http-proxy={target_proxy}"),
            format!("--ports={}", rule.port),
            format!("--ip-version={}", rule.ip_version),
        ]);
        self.exec(args).await
    }

    async fn delete_forwarding_rule(&self, name: &str) -> GcloudResult<()> {
        self.exec(argv(["compute", "forwarding-rules", "delete", name, "--global"]))
            .await
    }

    async fn forwarding_rule_address(&self, name: &str) -> GcloudResult<Option<String>> {
        let args = argv([
            "compute",
            "forwarding-rules",
            "describe",
            name,
            "--global",
            "--format=value(IPAddress)",
        ]);
        let address = ignore_not_found(self.query(args).await)?
            .map(|out| out.trim().to_string())
            .filter(|addr| !addr.is_empty());
        Ok(address)
    }

    async fn list_forwarding_rules(&self, names: &[String]) -> GcloudResult<Vec<ForwardingRuleInfo>> {
        let mut args = argv(["compute", "forwarding-rules", "list", "--global"]);
        args.push(format!("--filter=name=({})", names.join(" ")));
        args.push("--format=json".to_string());
        self.query_json(args).await
    }

    async fn list_instances_matching(&self, prefixes: &[&str]) -> GcloudResult<Vec<ZonalResource>> {
        let mut args = argv(["compute", "instances", "list"]);
        args.push(name_prefix_filter(prefixes));
        args.push("--format=json".to_string());
        self.query_json(args).await
    }

    async fn list_disks_matching(&self, prefixes: &[&str]) -> GcloudResult<Vec<ZonalResource>> {
        let mut args = argv(["compute", "disks", "list"]);
        args.push(name_prefix_filter(prefixes));
        args.push("--format=json".to_string());
        self.query_json(args).await
    }

    async fn delete_disk(&self, name: &str, zone: &str) -> GcloudResult<()> {
        let mut args = argv(["compute", "disks", "delete", name]);
        args.push(format!("--zone={zone}"));
        self.exec(args).await
    }
}
