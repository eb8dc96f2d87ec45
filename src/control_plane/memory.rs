//! In-memory control plane.
//!
//! Faithful local model of the provider's management API: duplicate
//! statement rejection, policy version quota, function lifecycle
//! transitions driven by polling. Backs the test suite and the binary's
//! dry-run mode. Failure knobs simulate the administrative environments
//! the orchestrator must tolerate (role creation denied, policy attach
//! denied, credentials absent).

use super::{
    CodeArtifact, ControlPlane, FunctionDescription, FunctionSpec, FunctionState,
    NotificationBinding, NotificationConfiguration, PolicyHandle, PolicyVersion, RoleHandle,
};
use crate::config::MAX_POLICY_VERSIONS;
use crate::error::{ImgpipeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct StoreRecord {
    location_constraint: Option<String>,
    versioning: bool,
    notifications: NotificationConfiguration,
}

#[derive(Debug, Clone)]
struct RoleRecord {
    arn: String,
    attached_policies: Vec<String>,
}

#[derive(Debug, Clone)]
struct PolicyRecord {
    arn: String,
    versions: Vec<PolicyVersion>,
    next_version: u64,
}

#[derive(Debug, Clone)]
struct FunctionRecord {
    description: FunctionDescription,
    code_size: usize,
    polls_until_ready: u32,
    statement_ids: HashSet<String>,
}

#[derive(Debug, Default)]
struct Inner {
    stores: HashMap<String, StoreRecord>,
    roles: HashMap<String, RoleRecord>,
    policies: HashMap<String, PolicyRecord>,
    functions: HashMap<String, FunctionRecord>,
    mutations: Vec<String>,
    clock_seq: i64,
    // failure knobs
    fail_account: bool,
    deny_role_creation: bool,
    fail_role_creation: bool,
    deny_policy_attach: bool,
    fail_activation: bool,
    activation_polls: u32,
    hide_roles_once: bool,
}

/// In-memory [`ControlPlane`] implementation.
pub struct MemoryControlPlane {
    account_id: String,
    inner: Mutex<Inner>,
}

impl Default for MemoryControlPlane {
    fn default() -> Self {
        Self::with_account("000000000000")
    }
}

impl MemoryControlPlane {
    /// Create a plane for the given account identifier.
    pub fn with_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            inner: Mutex::new(Inner {
                activation_polls: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Monotonic timestamps so version ordering never ties.
    fn tick(inner: &mut Inner) -> DateTime<Utc> {
        inner.clock_seq += 1;
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
            + ChronoDuration::seconds(inner.clock_seq)
    }

    fn role_arn(&self, name: &str) -> String {
        format!("arn:cloud:iam::{}:role/{}", self.account_id, name)
    }

    fn policy_arn(&self, name: &str) -> String {
        format!("arn:cloud:iam::{}:policy/{}", self.account_id, name)
    }

    fn function_arn(&self, name: &str) -> String {
        format!("arn:cloud:compute::{}:function/{}", self.account_id, name)
    }

    // ── Failure knobs ────────────────────────────────────────────────

    /// Make `resolve_account_id` fail, simulating absent credentials.
    pub fn fail_account_resolution(&self) {
        self.lock().fail_account = true;
    }

    /// Refuse role creation with AccessDenied.
    pub fn deny_role_creation(&self) {
        self.lock().deny_role_creation = true;
    }

    /// Fail role creation with a generic provider error (not AccessDenied).
    pub fn fail_role_creation(&self) {
        self.lock().fail_role_creation = true;
    }

    /// Refuse policy attachment with AccessDenied.
    pub fn deny_policy_attach(&self) {
        self.lock().deny_policy_attach = true;
    }

    /// Drive newly created or updated functions to Failed instead of Active.
    pub fn fail_function_activation(&self) {
        self.lock().fail_activation = true;
    }

    /// Number of `get_function` polls before a pending function reports
    /// Active.
    pub fn set_activation_polls(&self, polls: u32) {
        self.lock().activation_polls = polls;
    }

    /// Make the next role probe miss, modeling a role created by a
    /// concurrent run between the probe and the create call.
    pub fn hide_roles_once(&self) {
        self.lock().hide_roles_once = true;
    }

    // ── Seeding and inspection (test support) ────────────────────────

    /// Pre-create a store, as if provisioned by an earlier run.
    pub fn seed_store(&self, name: &str) {
        self.lock().stores.insert(
            name.to_string(),
            StoreRecord {
                location_constraint: None,
                versioning: true,
                notifications: NotificationConfiguration::default(),
            },
        );
    }

    /// Pre-create a role, as if provisioned out of band.
    pub fn seed_role(&self, name: &str) -> RoleHandle {
        let arn = self.role_arn(name);
        self.lock().roles.insert(
            name.to_string(),
            RoleRecord {
                arn: arn.clone(),
                attached_policies: Vec::new(),
            },
        );
        RoleHandle {
            name: name.to_string(),
            arn,
        }
    }

    /// Delete a role out of band, as an administrator would between runs.
    pub fn remove_role(&self, name: &str) {
        self.lock().roles.remove(name);
    }

    /// Install a binding on a store without going through the replace call.
    pub fn seed_notification(&self, store: &str, binding: NotificationBinding) {
        let mut inner = self.lock();
        if let Some(record) = inner.stores.get_mut(store) {
            record.notifications.bindings.push(binding);
        }
    }

    /// Current notification bindings on a store.
    pub fn notification_bindings(&self, store: &str) -> Vec<NotificationBinding> {
        self.lock()
            .stores
            .get(store)
            .map(|r| r.notifications.bindings.clone())
            .unwrap_or_default()
    }

    /// Location constraint recorded at store creation.
    pub fn store_location_constraint(&self, name: &str) -> Option<Option<String>> {
        self.lock()
            .stores
            .get(name)
            .map(|r| r.location_constraint.clone())
    }

    /// Whether versioning is enabled on a store.
    pub fn store_versioning(&self, name: &str) -> bool {
        self.lock().stores.get(name).map(|r| r.versioning).unwrap_or(false)
    }

    /// Retained versions of a policy, by name.
    pub fn policy_versions_by_name(&self, name: &str) -> Vec<PolicyVersion> {
        self.lock()
            .policies
            .get(name)
            .map(|p| p.versions.clone())
            .unwrap_or_default()
    }

    /// Policies attached to a role.
    pub fn attached_policies(&self, role: &str) -> Vec<String> {
        self.lock()
            .roles
            .get(role)
            .map(|r| r.attached_policies.clone())
            .unwrap_or_default()
    }

    /// Size of the code package last pushed to a function.
    pub fn function_code_size(&self, name: &str) -> Option<usize> {
        self.lock().functions.get(name).map(|f| f.code_size)
    }

    /// All mutating calls recorded so far, in order.
    pub fn mutations(&self) -> Vec<String> {
        self.lock().mutations.clone()
    }

    /// Number of mutating calls recorded so far.
    pub fn mutation_count(&self) -> usize {
        self.lock().mutations.len()
    }

    /// Forget recorded mutations, typically between orchestrator runs.
    pub fn clear_mutations(&self) {
        self.lock().mutations.clear();
    }

    fn record(inner: &mut Inner, call: String) {
        inner.mutations.push(call);
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn resolve_account_id(&self) -> Result<String> {
        if self.lock().fail_account {
            return Err(ImgpipeError::Provider(
                "unable to resolve caller identity".to_string(),
            ));
        }
        Ok(self.account_id.clone())
    }

    async fn store_exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock().stores.contains_key(name))
    }

    async fn create_store(&self, name: &str, location_constraint: Option<&str>) -> Result<()> {
        let mut inner = self.lock();
        if inner.stores.contains_key(name) {
            return Err(ImgpipeError::AlreadyExists(format!("store {name}")));
        }
        inner.stores.insert(
            name.to_string(),
            StoreRecord {
                location_constraint: location_constraint.map(str::to_string),
                versioning: false,
                notifications: NotificationConfiguration::default(),
            },
        );
        Self::record(&mut inner, format!("create_store:{name}"));
        Ok(())
    }

    async fn enable_versioning(&self, name: &str) -> Result<()> {
        let mut inner = self.lock();
        let record = inner
            .stores
            .get_mut(name)
            .ok_or_else(|| ImgpipeError::NotFound(format!("store {name}")))?;
        record.versioning = true;
        Self::record(&mut inner, format!("enable_versioning:{name}"));
        Ok(())
    }

    async fn put_notification_configuration(
        &self,
        store: &str,
        config: &NotificationConfiguration,
    ) -> Result<()> {
        let mut inner = self.lock();
        let record = inner
            .stores
            .get_mut(store)
            .ok_or_else(|| ImgpipeError::NotFound(format!("store {store}")))?;
        // Replace semantics: prior bindings are discarded wholesale.
        record.notifications = config.clone();
        Self::record(&mut inner, format!("put_notification:{store}"));
        Ok(())
    }

    async fn get_role(&self, name: &str) -> Result<Option<RoleHandle>> {
        let mut inner = self.lock();
        if inner.hide_roles_once {
            inner.hide_roles_once = false;
            return Ok(None);
        }
        Ok(inner.roles.get(name).map(|r| RoleHandle {
            name: name.to_string(),
            arn: r.arn.clone(),
        }))
    }

    async fn create_role(
        &self,
        name: &str,
        _trust_policy: &serde_json::Value,
    ) -> Result<RoleHandle> {
        let mut inner = self.lock();
        if inner.deny_role_creation {
            return Err(ImgpipeError::AccessDenied(format!(
                "not authorized to create role {name}"
            )));
        }
        if inner.fail_role_creation {
            return Err(ImgpipeError::Provider(format!(
                "internal error creating role {name}"
            )));
        }
        if inner.roles.contains_key(name) {
            return Err(ImgpipeError::AlreadyExists(format!("role {name}")));
        }
        let arn = self.role_arn(name);
        inner.roles.insert(
            name.to_string(),
            RoleRecord {
                arn: arn.clone(),
                attached_policies: Vec::new(),
            },
        );
        Self::record(&mut inner, format!("create_role:{name}"));
        Ok(RoleHandle {
            name: name.to_string(),
            arn,
        })
    }

    async fn find_policy(&self, name: &str) -> Result<Option<PolicyHandle>> {
        Ok(self.lock().policies.get(name).map(|p| PolicyHandle {
            name: name.to_string(),
            arn: p.arn.clone(),
        }))
    }

    async fn create_policy(
        &self,
        name: &str,
        _document: &serde_json::Value,
    ) -> Result<PolicyHandle> {
        let mut inner = self.lock();
        if inner.policies.contains_key(name) {
            return Err(ImgpipeError::AlreadyExists(format!("policy {name}")));
        }
        let arn = self.policy_arn(name);
        let created_at = Self::tick(&mut inner);
        inner.policies.insert(
            name.to_string(),
            PolicyRecord {
                arn: arn.clone(),
                versions: vec![PolicyVersion {
                    version_id: "v1".to_string(),
                    is_default: true,
                    created_at,
                }],
                next_version: 2,
            },
        );
        Self::record(&mut inner, format!("create_policy:{name}"));
        Ok(PolicyHandle {
            name: name.to_string(),
            arn,
        })
    }

    async fn list_policy_versions(&self, policy_arn: &str) -> Result<Vec<PolicyVersion>> {
        let inner = self.lock();
        let policy = inner
            .policies
            .values()
            .find(|p| p.arn == policy_arn)
            .ok_or_else(|| ImgpipeError::NotFound(format!("policy {policy_arn}")))?;
        Ok(policy.versions.clone())
    }

    async fn create_policy_version(
        &self,
        policy_arn: &str,
        _document: &serde_json::Value,
        set_default: bool,
    ) -> Result<()> {
        let mut inner = self.lock();
        let created_at = Self::tick(&mut inner);
        let policy = inner
            .policies
            .values_mut()
            .find(|p| p.arn == policy_arn)
            .ok_or_else(|| ImgpipeError::NotFound(format!("policy {policy_arn}")))?;
        if policy.versions.len() >= MAX_POLICY_VERSIONS {
            return Err(ImgpipeError::Provider(format!(
                "version quota exceeded for {policy_arn} ({MAX_POLICY_VERSIONS} max)"
            )));
        }
        let version_id = format!("v{}", policy.next_version);
        policy.next_version += 1;
        if set_default {
            for version in &mut policy.versions {
                version.is_default = false;
            }
        }
        policy.versions.push(PolicyVersion {
            version_id,
            is_default: set_default,
            created_at,
        });
        Self::record(&mut inner, format!("create_policy_version:{policy_arn}"));
        Ok(())
    }

    async fn delete_policy_version(&self, policy_arn: &str, version_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let policy = inner
            .policies
            .values_mut()
            .find(|p| p.arn == policy_arn)
            .ok_or_else(|| ImgpipeError::NotFound(format!("policy {policy_arn}")))?;
        let index = policy
            .versions
            .iter()
            .position(|v| v.version_id == version_id)
            .ok_or_else(|| {
                ImgpipeError::NotFound(format!("policy version {version_id} of {policy_arn}"))
            })?;
        if policy.versions[index].is_default {
            return Err(ImgpipeError::Provider(format!(
                "cannot delete default version {version_id} of {policy_arn}"
            )));
        }
        policy.versions.remove(index);
        Self::record(
            &mut inner,
            format!("delete_policy_version:{policy_arn}:{version_id}"),
        );
        Ok(())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.deny_policy_attach {
            return Err(ImgpipeError::AccessDenied(format!(
                "not authorized to attach policy to role {role_name}"
            )));
        }
        let role = inner
            .roles
            .get_mut(role_name)
            .ok_or_else(|| ImgpipeError::NotFound(format!("role {role_name}")))?;
        if !role.attached_policies.iter().any(|p| p == policy_arn) {
            role.attached_policies.push(policy_arn.to_string());
        }
        Self::record(&mut inner, format!("attach_role_policy:{role_name}"));
        Ok(())
    }

    async fn get_function(&self, name: &str) -> Result<Option<FunctionDescription>> {
        let mut inner = self.lock();
        let fail = inner.fail_activation;
        let Some(record) = inner.functions.get_mut(name) else {
            return Ok(None);
        };
        // Pending functions become Active (or Failed, when scripted) after
        // a fixed number of polls.
        if matches!(
            record.description.state,
            FunctionState::Creating | FunctionState::Updating
        ) {
            if record.polls_until_ready > 0 {
                record.polls_until_ready -= 1;
            }
            if record.polls_until_ready == 0 {
                record.description.state = if fail {
                    FunctionState::Failed
                } else {
                    FunctionState::Active
                };
            }
        }
        Ok(Some(record.description.clone()))
    }

    async fn create_function(
        &self,
        spec: &FunctionSpec,
        code: &CodeArtifact,
    ) -> Result<FunctionDescription> {
        let mut inner = self.lock();
        if inner.functions.contains_key(&spec.name) {
            return Err(ImgpipeError::AlreadyExists(format!(
                "function {}",
                spec.name
            )));
        }
        let description = FunctionDescription {
            arn: self.function_arn(&spec.name),
            state: FunctionState::Creating,
            spec: spec.clone(),
        };
        let polls = inner.activation_polls;
        inner.functions.insert(
            spec.name.clone(),
            FunctionRecord {
                description: description.clone(),
                code_size: code.bytes.len(),
                polls_until_ready: polls,
                statement_ids: HashSet::new(),
            },
        );
        Self::record(&mut inner, format!("create_function:{}", spec.name));
        Ok(description)
    }

    async fn update_function_code(&self, name: &str, code: &CodeArtifact) -> Result<()> {
        let mut inner = self.lock();
        let polls = inner.activation_polls;
        let record = inner
            .functions
            .get_mut(name)
            .ok_or_else(|| ImgpipeError::NotFound(format!("function {name}")))?;
        record.code_size = code.bytes.len();
        record.description.state = FunctionState::Updating;
        record.polls_until_ready = polls;
        Self::record(&mut inner, format!("update_function_code:{name}"));
        Ok(())
    }

    async fn update_function_configuration(&self, spec: &FunctionSpec) -> Result<()> {
        let mut inner = self.lock();
        let polls = inner.activation_polls;
        let record = inner
            .functions
            .get_mut(&spec.name)
            .ok_or_else(|| ImgpipeError::NotFound(format!("function {}", spec.name)))?;
        record.description.spec = spec.clone();
        record.description.state = FunctionState::Updating;
        record.polls_until_ready = polls;
        Self::record(&mut inner, format!("update_function_config:{}", spec.name));
        Ok(())
    }

    async fn add_invoke_permission(
        &self,
        function: &str,
        statement_id: &str,
        _source_arn: &str,
    ) -> Result<()> {
        let mut inner = self.lock();
        let record = inner
            .functions
            .get_mut(function)
            .ok_or_else(|| ImgpipeError::NotFound(format!("function {function}")))?;
        if !record.statement_ids.insert(statement_id.to_string()) {
            return Err(ImgpipeError::AlreadyExists(format!(
                "permission statement {statement_id}"
            )));
        }
        Self::record(
            &mut inner,
            format!("add_permission:{function}:{statement_id}"),
        );
        Ok(())
    }
}
