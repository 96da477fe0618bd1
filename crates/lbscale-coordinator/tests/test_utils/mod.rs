//! Shared test utilities for integration tests
//!
//! `FakeCompute` keeps an in-memory model of the project: which resources
//! exist and which resources reference which. Creating a resource whose
//! dependency is missing fails with "not found", and deleting a resource
//! that is still referenced fails with "in use", like the real API does.

#![allow(dead_code)]

use lbscale_coordinator::config::DeploymentConfig;
use lbscale_coordinator::gcloud::models::{
    AutoscalerInfo, AutoscalingPolicyInfo, BackendHealth, BackendHealthStatus, BackendInfo, BackendServiceInfo, ForwardingRuleInfo,
    GroupInfo, GroupStatusInfo, ManagedInstance, ZonalResource,
};
use lbscale_coordinator::gcloud::{ComputeApi, GcloudError, GcloudResult};
use lbscale_coordinator::orchestrator::{Confirm, ProvisionTiming, RetryPolicy, STARTUP_COMPLETE_MARKER};
use lbscale_coordinator::plan::{
    Backend, BackendService, FirewallRule, ForwardingRule, Frontend, HealthCheck, ImageSource,
    InstanceGroup, InstanceSpec, InstanceTemplate, ResourcePlan, RouterNat, SourceImage,
};
use lbscale_coordinator::wait::PollConfig;
use lbscale_common::InstanceStatus;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Address handed out for every forwarding rule
pub const TEST_ADDRESS: &str = "34.117.1.2";

pub fn test_plan() -> ResourcePlan {
    ResourcePlan::from_config(&DeploymentConfig::with_project("lbscale-test"))
}

/// Millisecond-scale polling so tests do not sit in waits
pub fn fast_timing() -> ProvisionTiming {
    ProvisionTiming {
        startup_script: PollConfig::bounded(5, Duration::from_millis(10)),
        builder_stopped: PollConfig::bounded(5, Duration::from_millis(10)),
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        min_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_times: 2,
    }
}

fn not_found(what: &str) -> GcloudError {
    GcloudError::NotFound {
        message: format!("The resource '{what}' was not found"),
    }
}

fn in_use(what: &str, by: &str) -> GcloudError {
    GcloudError::ResourceInUse {
        message: format!("The {what} resource is already being used by '{by}'"),
    }
}

fn already_exists(what: &str) -> GcloudError {
    GcloudError::AlreadyExists {
        message: format!("The resource '{what}' already exists"),
    }
}

#[derive(Debug, Default)]
struct FakeState {
    /// Every call, as `operation name`
    calls: Vec<String>,
    /// Existing resources keyed `kind/name`, with the keys they reference
    resources: BTreeMap<String, Vec<String>>,
    instance_status: HashMap<String, InstanceStatus>,
    /// Instances whose boot disk is deleted along with them
    auto_delete_disk: HashMap<String, bool>,
    /// Injected failures keyed `operation name`, consumed in order
    failures: HashMap<String, VecDeque<GcloudError>>,
    /// Serial-output reads before the startup marker appears
    serial_pending: Option<u32>,
    /// SSH probes (`true`) that fail before the host accepts connections
    ssh_pending: u32,
    ab_output: String,
    address: String,
    /// `(min, max)` of each group's autoscaler
    autoscalers: HashMap<String, (u32, u32)>,
}

/// In-memory stand-in for the compute API
#[derive(Debug)]
pub struct FakeCompute {
    state: Mutex<FakeState>,
}

impl Default for FakeCompute {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCompute {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                serial_pending: Some(0),
                address: TEST_ADDRESS.to_string(),
                ..FakeState::default()
            }),
        }
    }

    /// Fake whose forwarding rules resolve to `address` (e.g. a mock server)
    pub fn with_address(address: impl Into<String>) -> Self {
        let fake = Self::new();
        fake.state.lock().unwrap().address = address.into();
        fake
    }

    /// Fail the next call of `operation` on `name` with `error`
    pub fn fail_next(&self, operation: &str, name: &str, error: GcloudError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(format!("{operation} {name}"))
            .or_default()
            .push_back(error);
    }

    /// Startup marker shows up after `reads` serial-output reads; `None` never
    pub fn set_serial_pending(&self, reads: Option<u32>) {
        self.state.lock().unwrap().serial_pending = reads;
    }

    pub fn set_ssh_pending(&self, probes: u32) {
        self.state.lock().unwrap().ssh_pending = probes;
    }

    /// Change a group's autoscaler behind the tool's back
    pub fn set_autoscaler(&self, group: &str, min: u32, max: u32) {
        self.state
            .lock()
            .unwrap()
            .autoscalers
            .insert(group.to_string(), (min, max));
    }

    pub fn set_ab_output(&self, output: &str) {
        self.state.lock().unwrap().ab_output = output.to_string();
    }

    /// Seed a resource that exists before the test starts
    pub fn seed(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .resources
            .insert(key.to_string(), Vec::new());
    }

    pub fn exists(&self, key: &str) -> bool {
        self.state.lock().unwrap().resources.contains_key(key)
    }

    pub fn resource_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().resources.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Position of the first occurrence of `call`
    pub fn position(&self, call: &str) -> usize {
        let calls = self.calls();
        calls
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("{call} was never called; calls: {calls:#?}"))
    }

    /// Calls starting with `prefix`
    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn enter(&self, operation: &str, name: &str) -> GcloudResult<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.state.lock().unwrap();
        let call = format!("{operation} {name}");
        state.calls.push(call.clone());
        if let Some(error) = state.failures.get_mut(&call).and_then(|q| q.pop_front()) {
            return Err(error);
        }
        Ok(state)
    }

    fn create(&self, operation: &str, key: String, refs: Vec<String>) -> GcloudResult<()> {
        let name = key.split_once('/').map_or(key.as_str(), |(_, n)| n).to_string();
        let mut state = self.enter(operation, &name)?;
        if state.resources.contains_key(&key) {
            return Err(already_exists(&key));
        }
        if let Some(missing) = refs.iter().find(|r| !state.resources.contains_key(*r)) {
            return Err(not_found(missing));
        }
        state.resources.insert(key, refs);
        Ok(())
    }

    fn delete(&self, operation: &str, key: String) -> GcloudResult<()> {
        let name = key.split_once('/').map_or(key.as_str(), |(_, n)| n).to_string();
        let mut state = self.enter(operation, &name)?;
        if !state.resources.contains_key(&key) {
            return Err(not_found(&key));
        }
        if let Some((user, _)) = state.resources.iter().find(|(_, refs)| refs.contains(&key)) {
            return Err(in_use(&key, user));
        }
        state.resources.remove(&key);
        Ok(())
    }

    fn describe<T>(&self, operation: &str, key: String, f: impl FnOnce(&FakeState) -> T) -> GcloudResult<T> {
        let name = key.split_once('/').map_or(key.as_str(), |(_, n)| n).to_string();
        let state = self.enter(operation, &name)?;
        if !state.resources.contains_key(&key) {
            return Err(not_found(&key));
        }
        Ok(f(&state))
    }
}

impl ComputeApi for FakeCompute {
    async fn create_firewall_rule(&self, rule: &FirewallRule) -> GcloudResult<()> {
        self.create("create_firewall_rule", format!("firewall/{}", rule.name), vec![])
    }

    async fn delete_firewall_rule(&self, name: &str) -> GcloudResult<()> {
        self.delete("delete_firewall_rule", format!("firewall/{name}"))
    }

    async fn create_router(&self, router: &RouterNat) -> GcloudResult<()> {
        self.create("create_router", format!("router/{}", router.router), vec![])
    }

    async fn create_nat(&self, router: &RouterNat) -> GcloudResult<()> {
        self.create(
            "create_nat",
            format!("nat/{}", router.nat),
            vec![format!("router/{}", router.router)],
        )
    }

    async fn delete_nat(&self, router: &RouterNat) -> GcloudResult<()> {
        self.delete("delete_nat", format!("nat/{}", router.nat))
    }

    async fn delete_router(&self, router: &RouterNat) -> GcloudResult<()> {
        self.delete("delete_router", format!("router/{}", router.router))
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> GcloudResult<()> {
        let refs = match &spec.image {
            ImageSource::Custom(image) => vec![format!("image/{image}")],
            ImageSource::Family { .. } => vec![],
        };
        self.create("create_instance", format!("instance/{}", spec.name), refs)?;
        let mut state = self.state.lock().unwrap();
        state
            .resources
            .insert(format!("disk/{}", spec.name), Vec::new());
        state
            .instance_status
            .insert(spec.name.clone(), InstanceStatus::Running);
        state
            .auto_delete_disk
            .insert(spec.name.clone(), !spec.keep_boot_disk);
        // A running VM holds its boot disk
        if let Some(refs) = state.resources.get_mut(&format!("instance/{}", spec.name)) {
            refs.push(format!("disk/{}", spec.name));
        }
        Ok(())
    }

    async fn stop_instance(&self, name: &str, _zone: &str) -> GcloudResult<()> {
        let mut state = self.enter("stop_instance", name)?;
        if !state.resources.contains_key(&format!("instance/{name}")) {
            return Err(not_found(name));
        }
        state
            .instance_status
            .insert(name.to_string(), InstanceStatus::Terminated);
        Ok(())
    }

    async fn delete_instance(&self, name: &str, _zone: &str) -> GcloudResult<()> {
        let key = format!("instance/{name}");
        let mut state = self.enter("delete_instance", name)?;
        if state.resources.remove(&key).is_none() {
            return Err(not_found(&key));
        }
        state.instance_status.remove(name);
        if state.auto_delete_disk.remove(name).unwrap_or(false) {
            state.resources.remove(&format!("disk/{name}"));
        }
        Ok(())
    }

    async fn instance_status(&self, name: &str, _zone: &str) -> GcloudResult<InstanceStatus> {
        let state = self.enter("instance_status", name)?;
        state
            .instance_status
            .get(name)
            .copied()
            .ok_or_else(|| not_found(name))
    }

    async fn serial_output(&self, name: &str, _zone: &str) -> GcloudResult<String> {
        let mut state = self.enter("serial_output", name)?;
        if !state.resources.contains_key(&format!("instance/{name}")) {
            return Err(not_found(name));
        }
        let booted = "Started Apache web server\n";
        match state.serial_pending {
            Some(0) => Ok(format!("{booted}google_metadata_script_runner: {STARTUP_COMPLETE_MARKER}\n")),
            Some(n) => {
                state.serial_pending = Some(n - 1);
                Ok(booted.to_string())
            }
            None => Ok(booted.to_string()),
        }
    }

    async fn ssh(&self, name: &str, _zone: &str, command: &str) -> GcloudResult<String> {
        let mut state = self.enter("ssh", name)?;
        if !state.resources.contains_key(&format!("instance/{name}")) {
            return Err(not_found(name));
        }
        if command == "true" && state.ssh_pending > 0 {
            state.ssh_pending -= 1;
            return Err(GcloudError::Command {
                status: Some(255),
                message: "ssh: connect to host port 22: Connection refused".to_string(),
            });
        }
        if command.starts_with("ab ") {
            return Ok(state.ab_output.clone());
        }
        Ok(String::new())
    }

    async fn image_exists(&self, name: &str) -> GcloudResult<bool> {
        let state = self.enter("image_exists", name)?;
        Ok(state.resources.contains_key(&format!("image/{name}")))
    }

    async fn create_image(&self, image: &SourceImage) -> GcloudResult<()> {
        let mut state = self.enter("create_image", &image.name)?;
        let builder = &image.builder.name;
        if state.instance_status.get(builder) == Some(&InstanceStatus::Running) {
            return Err(GcloudError::Command {
                status: Some(1),
                message: format!("The disk resource '{builder}' is already being used in read-write mode"),
            });
        }
        let key = format!("image/{}", image.name);
        if state.resources.contains_key(&key) {
            return Err(already_exists(&key));
        }
        let disk = format!("disk/{}", image.source_disk());
        if !state.resources.contains_key(&disk) {
            return Err(not_found(&disk));
        }
        // The image is a copy; it does not keep the disk alive
        state.resources.insert(key, Vec::new());
        Ok(())
    }

    async fn delete_image(&self, name: &str) -> GcloudResult<()> {
        self.delete("delete_image", format!("image/{name}"))
    }

    async fn create_instance_template(&self, template: &InstanceTemplate) -> GcloudResult<()> {
        self.create(
            "create_instance_template",
            format!("template/{}", template.name),
            vec![format!("image/{}", template.image)],
        )
    }

    async fn delete_instance_template(&self, name: &str) -> GcloudResult<()> {
        self.delete("delete_instance_template", format!("template/{name}"))
    }

    async fn create_health_check(&self, check: &HealthCheck) -> GcloudResult<()> {
        self.create("create_health_check", format!("health-check/{}", check.name), vec![])
    }

    async fn delete_health_check(&self, name: &str) -> GcloudResult<()> {
        self.delete("delete_health_check", format!("health-check/{name}"))
    }

    async fn create_instance_group(&self, group: &InstanceGroup) -> GcloudResult<()> {
        self.create(
            "create_instance_group",
            format!("group/{}", group.name),
            vec![
                format!("template/{}", group.template),
                format!("health-check/{}", group.health_check),
            ],
        )
    }

    async fn set_named_ports(&self, group: &InstanceGroup) -> GcloudResult<()> {
        let state = self.enter("set_named_ports", &group.name)?;
        if !state.resources.contains_key(&format!("group/{}", group.name)) {
            return Err(not_found(&group.name));
        }
        Ok(())
    }

    async fn set_autoscaling(&self, group: &InstanceGroup) -> GcloudResult<()> {
        let mut state = self.enter("set_autoscaling", &group.name)?;
        if !state.resources.contains_key(&format!("group/{}", group.name)) {
            return Err(not_found(&group.name));
        }
        let bounds = (group.autoscaling.min_replicas, group.autoscaling.max_replicas);
        state.autoscalers.insert(group.name.clone(), bounds);
        Ok(())
    }

    async fn delete_instance_group(&self, name: &str, _region: &str) -> GcloudResult<()> {
        self.delete("delete_instance_group", format!("group/{name}"))
    }

    async fn describe_instance_group(&self, name: &str, _region: &str) -> GcloudResult<GroupInfo> {
        self.describe("describe_instance_group", format!("group/{name}"), |state| GroupInfo {
            name: name.to_string(),
            target_size: Some(1),
            status: Some(GroupStatusInfo { is_stable: true }),
            autoscaler: state.autoscalers.get(name).map(|&(min, max)| AutoscalerInfo {
                autoscaling_policy: Some(AutoscalingPolicyInfo {
                    min_num_replicas: Some(min),
                    max_num_replicas: Some(max),
                }),
            }),
        })
    }

    async fn list_group_instances(&self, name: &str, region: &str) -> GcloudResult<Vec<ManagedInstance>> {
        self.describe("list_group_instances", format!("group/{name}"), |_| {
            vec![ManagedInstance {
                instance: format!("https://x/zones/{region}-b/instances/{name}-x1z2"),
                instance_status: Some("RUNNING".to_string()),
                current_action: Some("NONE".to_string()),
            }]
        })
    }

    async fn create_backend_service(&self, service: &BackendService) -> GcloudResult<()> {
        self.create(
            "create_backend_service",
            format!("backend-service/{}", service.name),
            vec![format!("health-check/{}", service.health_check)],
        )
    }

    async fn add_backend(&self, service: &str, backend: &Backend) -> GcloudResult<()> {
        let mut state = self.enter("add_backend", &backend.group)?;
        let group = format!("group/{}", backend.group);
        if !state.resources.contains_key(&group) {
            return Err(not_found(&group));
        }
        let refs = state
            .resources
            .get_mut(&format!("backend-service/{service}"))
            .ok_or_else(|| not_found(service))?;
        if refs.contains(&group) {
            return Err(already_exists(&group));
        }
        refs.push(group);
        Ok(())
    }

    async fn delete_backend_service(&self, name: &str) -> GcloudResult<()> {
        self.delete("delete_backend_service", format!("backend-service/{name}"))
    }

    async fn describe_backend_service(&self, name: &str) -> GcloudResult<BackendServiceInfo> {
        self.describe("describe_backend_service", format!("backend-service/{name}"), |state| {
            let refs = &state.resources[&format!("backend-service/{name}")];
            BackendServiceInfo {
                name: name.to_string(),
                backends: refs
                    .iter()
                    .filter_map(|r| r.strip_prefix("group/"))
                    .map(|group| BackendInfo {
                        group: format!("https://x/regions/r/instanceGroups/{group}"),
                        balancing_mode: Some("UTILIZATION".to_string()),
                        max_rate_per_instance: None,
                        max_utilization: Some(0.8),
                        capacity_scaler: Some(1.0),
                    })
                    .collect(),
                health_checks: vec![],
                log_config: None,
            }
        })
    }

    async fn backend_health(&self, service: &str) -> GcloudResult<Vec<BackendHealth>> {
        self.describe("backend_health", format!("backend-service/{service}"), |state| {
            state.resources[&format!("backend-service/{service}")]
                .iter()
                .filter_map(|r| r.strip_prefix("group/"))
                .map(|group| BackendHealth {
                    backend: format!("https://x/regions/r/instanceGroups/{group}"),
                    status: BackendHealthStatus::default(),
                })
                .collect()
        })
    }

    async fn create_url_map(&self, frontend: &Frontend) -> GcloudResult<()> {
        self.create(
            "create_url_map",
            format!("url-map/{}", frontend.url_map),
            vec![format!("backend-service/{}", frontend.default_service)],
        )
    }

    async fn delete_url_map(&self, name: &str) -> GcloudResult<()> {
        self.delete("delete_url_map", format!("url-map/{name}"))
    }

    async fn create_target_proxy(&self, frontend: &Frontend) -> GcloudResult<()> {
        self.create(
            "create_target_proxy",
            format!("proxy/{}", frontend.target_proxy),
            vec![format!("url-map/{}", frontend.url_map)],
        )
    }

    async fn delete_target_proxy(&self, name: &str) -> GcloudResult<()> {
        self.delete("delete_target_proxy", format!("proxy/{name}"))
    }

    async fn create_forwarding_rule(&self, rule: &ForwardingRule, target_proxy: &str) -> GcloudResult<()> {
        self.create(
            "create_forwarding_rule",
            format!("rule/{}", rule.name),
            vec![format!("proxy/{target_proxy}")],
        )
    }

    async fn delete_forwarding_rule(&self, name: &str) -> GcloudResult<()> {
        self.delete("delete_forwarding_rule", format!("rule/{name}"))
    }

    async fn forwarding_rule_address(&self, name: &str) -> GcloudResult<Option<String>> {
        let state = self.enter("forwarding_rule_address", name)?;
        Ok(state
            .resources
            .contains_key(&format!("rule/{name}"))
            .then(|| state.address.clone()))
    }

    async fn list_forwarding_rules(&self, names: &[String]) -> GcloudResult<Vec<ForwardingRuleInfo>> {
        let state = self.enter("list_forwarding_rules", &names.join(","))?;
        Ok(names
            .iter()
            .filter(|n| state.resources.contains_key(&format!("rule/{n}")))
            .map(|n| ForwardingRuleInfo {
                name: n.clone(),
                ip_address: Some(state.address.clone()),
                ip_version: Some("IPV4".to_string()),
                port_range: Some("80-80".to_string()),
                target: None,
            })
            .collect())
    }

    async fn list_instances_matching(&self, prefixes: &[&str]) -> GcloudResult<Vec<ZonalResource>> {
        let state = self.enter("list_instances_matching", &prefixes.join(","))?;
        Ok(matching(&state, "instance/", prefixes))
    }

    async fn list_disks_matching(&self, prefixes: &[&str]) -> GcloudResult<Vec<ZonalResource>> {
        let state = self.enter("list_disks_matching", &prefixes.join(","))?;
        Ok(matching(&state, "disk/", prefixes))
    }

    async fn delete_disk(&self, name: &str, _zone: &str) -> GcloudResult<()> {
        self.delete("delete_disk", format!("disk/{name}"))
    }
}

fn matching(state: &FakeState, kind: &str, prefixes: &[&str]) -> Vec<ZonalResource> {
    state
        .resources
        .keys()
        .filter_map(|k| k.strip_prefix(kind))
        .filter(|name| prefixes.iter().any(|p| name.starts_with(p)))
        .map(|name| ZonalResource {
            name: name.to_string(),
            zone: "https://x/projects/lbscale-test/zones/us-central1-c".to_string(),
            status: None,
        })
        .collect()
}

/// Answers confirmation prompts from a script and records them
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            prompts: Mutex::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.answers.lock().unwrap().pop_front() {
            Some(answer) => Ok(answer),
            None => anyhow::bail!("unexpected prompt: {prompt}"),
        }
    }
}

/// Output of a completed `ab` run against the demo frontend
pub const AB_OUTPUT: &str = "This is ApacheBench, Version 2.3 <$Revision: 1903618 $>
Benchmarking 34.117.1.2 (be patient)
Completed 50000 requests
Finished 500000 requests


Server Software:        Apache/2.4.57
Server Hostname:        34.117.1.2
Server Port:            80

Document Path:          /
Document Length:        10701 bytes

Concurrency Level:      1000
Time taken for tests:   151.123 seconds
Complete requests:      500000
Failed requests:        37
   (Connect: 0, Receive: 0, Length: 37, Exceptions: 0)
Non-2xx responses:      12
Total transferred:      5487000000 bytes
HTML transferred:       5350500000 bytes
Requests per second:    3308.56 [#/sec] (mean)
Time per request:       302.245 [ms] (mean)
Time per request:       0.302 [ms] (mean, across all concurrent requests)
Transfer rate:          35457.89 [Kbytes/sec] received

Percentage of the requests served within a certain time (ms)
  50%    180
  66%    220
  75%    260
  80%    290
  90%    410
  95%    620
  98%   1040
  99%   1400
 100%   7021 (longest request)
";
