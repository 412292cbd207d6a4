//! Create/read/update/delete of a single entity against the remote service

use crate::builder::{build, project, translate};
use crate::client::{GetOptions, RemoteClient, RemoteEntity, SystemHandle};
use crate::error::{Error, Result};
use crate::interface::{self, DiffPolicy, Interface, diff};
use crate::schema::{Behaviors, EntityKind, KindBehavior, MissingPolicy};
use crate::sync::ExclusiveSection;
use crate::types::{Action, Outcome, ResourceData, Target};

/// What a read found
enum Observed {
    /// Current remote state, translated in full
    Present(ResourceData),
    /// Gone remotely, and the kind treats that as an external delete
    Missing,
    /// The kind has no reconciling read
    Unreadable,
}

/// Reconciles one entity at a time against a [`RemoteClient`].
///
/// Shareable across threads. System mutations serialize on the injected
/// [`ExclusiveSection`]; every other kind runs unguarded.
pub struct Reconciler<'a> {
    client: &'a dyn RemoteClient,
    section: &'a dyn ExclusiveSection,
    behaviors: Behaviors,
    policy: DiffPolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a dyn RemoteClient, section: &'a dyn ExclusiveSection) -> Self {
        Self {
            client,
            section,
            behaviors: Behaviors::default(),
            policy: DiffPolicy::default(),
        }
    }

    pub fn with_behaviors(mut self, behaviors: Behaviors) -> Self {
        self.behaviors = behaviors;
        self
    }

    pub fn with_policy(mut self, policy: DiffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn behavior(&self, kind: EntityKind) -> KindBehavior {
        self.behaviors.get(kind)
    }

    pub fn policy(&self) -> DiffPolicy {
        self.policy
    }

    /// Bring the remote entity in line with `desired`.
    ///
    /// `prior` is the record returned by the previous reconciliation, or
    /// `None` if the entity is not managed yet.
    pub fn reconcile(&self, desired: &ResourceData, prior: Option<&ResourceData>) -> Result<Outcome> {
        check_prior(desired, prior)?;
        let Some(prior) = prior else {
            return self.create(desired);
        };

        match self.observe(desired.kind, &desired.name)? {
            Observed::Missing => {
                log::warn!(
                    "{} was deleted outside this tool, creating it again",
                    desired.target()
                );
                self.create(desired)
            }
            Observed::Unreadable => {
                if has_drift(desired, prior) {
                    self.update(desired, prior)
                } else {
                    Ok(unchanged(prior.clone()))
                }
            }
            Observed::Present(full) => {
                let current = project(&full, desired);
                if !has_drift(desired, &current) {
                    log::debug!("{} is up to date", desired.target());
                    return Ok(unchanged(current));
                }
                // Diff interfaces against what the server has now, masked
                // to the declared settings
                let mut base = prior.clone();
                base.interfaces = current.interfaces;
                self.update(desired, &base)
            }
        }
    }

    /// Decide what [`Reconciler::reconcile`] would do, without mutating.
    pub fn plan(&self, desired: &ResourceData, prior: Option<&ResourceData>) -> Result<Action> {
        check_prior(desired, prior)?;
        build(desired, prior)?;

        let Some(prior) = prior else {
            self.ensure_absent(&desired.target())?;
            return Ok(Action::Created);
        };

        let drift = match self.observe(desired.kind, &desired.name)? {
            Observed::Missing => return Ok(Action::Created),
            Observed::Unreadable => has_drift(desired, prior),
            Observed::Present(full) => has_drift(desired, &project(&full, desired)),
        };
        Ok(if drift {
            Action::Updated
        } else {
            Action::Unchanged
        })
    }

    /// Create the entity. Fails with [`Error::Conflict`] if it already exists.
    pub fn create(&self, desired: &ResourceData) -> Result<Outcome> {
        let target = desired.target();
        let behavior = self.behavior(desired.kind);

        self.mutate(&target, behavior, || {
            let entity = build(desired, None)?;
            self.ensure_absent(&target)?;

            log::info!("creating {target}");
            self.client
                .create(&entity)
                .map_err(|e| Error::from_client(target.clone(), "create", e))?;

            if behavior.has_interfaces && !desired.interfaces.is_empty() {
                let handle = self.handle(&target)?;
                diff(&[], &desired.interfaces, self.policy).apply(self.client, &handle, &target)?;
            }
            Ok(())
        })?;

        Ok(Outcome {
            action: Action::Created,
            state: Some(self.settle(desired)?),
        })
    }

    /// Read the entity, shaped like `record`.
    ///
    /// Returns `None` when a kind that tolerates external deletes (systems)
    /// is gone. Every other kind reports [`Error::NotFound`].
    pub fn read(&self, record: &ResourceData) -> Result<Option<ResourceData>> {
        match self.observe(record.kind, &record.name)? {
            Observed::Present(full) => Ok(Some(project(&full, record))),
            Observed::Missing => {
                log::warn!(
                    "{} no longer exists remotely, dropping its record",
                    record.target()
                );
                Ok(None)
            }
            Observed::Unreadable => Ok(Some(record.clone())),
        }
    }

    /// Resubmit the full field set of an existing entity.
    ///
    /// Interfaces are diffed from `prior.interfaces` to `desired.interfaces`.
    pub fn update(&self, desired: &ResourceData, prior: &ResourceData) -> Result<Outcome> {
        check_prior(desired, Some(prior))?;
        let target = desired.target();
        let behavior = self.behavior(desired.kind);

        self.mutate(&target, behavior, || {
            let entity = build(desired, Some(prior))?;

            log::info!("updating {target}");
            self.client
                .update(&entity)
                .map_err(|e| Error::from_client(target.clone(), "update", e))?;

            if behavior.has_interfaces {
                let changes = diff(&prior.interfaces, &desired.interfaces, self.policy);
                if !changes.is_empty() {
                    let handle = self.handle(&target)?;
                    changes.apply(self.client, &handle, &target)?;
                }
            }
            Ok(())
        })?;

        Ok(Outcome {
            action: Action::Updated,
            state: Some(self.settle(desired)?),
        })
    }

    /// Delete the entity.
    ///
    /// An entity that is already gone yields [`Error::NotFound`]; callers
    /// tearing things down treat that as success.
    pub fn delete(&self, kind: EntityKind, name: &str) -> Result<Outcome> {
        let target = Target::new(kind, name);
        log::info!("deleting {target}");
        self.client
            .delete(kind, name)
            .map_err(|e| Error::from_client(target, "delete", e))?;
        Ok(Outcome {
            action: Action::Deleted,
            state: None,
        })
    }

    /// Fetch the entity in remote shape, with its interfaces.
    pub fn inspect(
        &self,
        kind: EntityKind,
        name: &str,
        options: GetOptions,
    ) -> Result<(RemoteEntity, Vec<Interface>)> {
        let target = Target::new(kind, name);
        log::debug!("get {target} ({options:?})");
        let entity = self
            .client
            .get(kind, name, options)
            .map_err(|e| Error::from_client(target.clone(), "get", e))?;

        let interfaces = if self.behavior(kind).has_interfaces {
            let handle = self.handle(&target)?;
            self.client
                .get_interfaces(&handle)
                .map_err(|e| Error::from_client(target.clone(), "get interfaces", e))?
                .into_values()
                .collect()
        } else {
            Vec::new()
        };
        Ok((entity, interfaces))
    }

    fn observe(&self, kind: EntityKind, name: &str) -> Result<Observed> {
        let behavior = self.behavior(kind);
        if !behavior.reads_back {
            return Ok(Observed::Unreadable);
        }
        match self.inspect(kind, name, GetOptions::default()) {
            Ok((entity, interfaces)) => Ok(Observed::Present(translate(entity, interfaces))),
            Err(e) if e.is_not_found() && behavior.missing_on_read == MissingPolicy::Drop => {
                Ok(Observed::Missing)
            }
            Err(e) => Err(e),
        }
    }

    /// State to record after a successful write.
    fn settle(&self, desired: &ResourceData) -> Result<ResourceData> {
        if !self.behavior(desired.kind).reads_back {
            return Ok(desired.clone());
        }
        let (entity, interfaces) = self.inspect(desired.kind, &desired.name, GetOptions::default())?;
        Ok(project(&translate(entity, interfaces), desired))
    }

    /// Run `body`, under the sync lock and followed by a sync when the kind
    /// requires it.
    fn mutate(
        &self,
        target: &Target,
        behavior: KindBehavior,
        body: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        if !behavior.syncs {
            return body();
        }
        let _guard = self.section.acquire();
        body()?;
        log::info!("syncing after changes to {target}");
        self.client
            .sync()
            .map_err(|e| Error::from_client(target.clone(), "sync", e))
    }

    fn ensure_absent(&self, target: &Target) -> Result<()> {
        if !self.behavior(target.kind).reads_back {
            return Ok(());
        }
        match self
            .client
            .get(target.kind, &target.name, GetOptions::default())
        {
            Ok(_) => Err(Error::Conflict {
                target: target.clone(),
            }),
            Err(e) => match Error::from_client(target.clone(), "get", e) {
                Error::NotFound { .. } => Ok(()),
                other => Err(other),
            },
        }
    }

    fn handle(&self, target: &Target) -> Result<SystemHandle> {
        self.client
            .system_handle(&target.name)
            .map_err(|e| Error::from_client(target.clone(), "get handle", e))
    }
}

fn unchanged(state: ResourceData) -> Outcome {
    Outcome {
        action: Action::Unchanged,
        state: Some(state),
    }
}

fn has_drift(desired: &ResourceData, current: &ResourceData) -> bool {
    desired.attributes != current.attributes
        || !interface::same_interfaces(&desired.interfaces, &current.interfaces)
}

fn check_prior(desired: &ResourceData, prior: Option<&ResourceData>) -> Result<()> {
    match prior {
        Some(p) if p.kind != desired.kind || p.name != desired.name => Err(Error::validation(
            desired.target(),
            format!("prior record belongs to {}", p.target()),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inherit::Inheritable;
    use crate::sync::NoLock;
    use crate::testing::{Call, FakeClient, InstrumentedLock};
    use crate::types::AttrValue;
    use std::thread;

    fn distro() -> ResourceData {
        ResourceData::new(EntityKind::Distro, "ubuntu")
            .with("kernel", "/boot/vmlinuz")
            .with("initrd", "/boot/initrd")
            .with("arch", "x86_64")
            .with("boot_loaders", AttrValue::str_list(["grub", "ipxe"]))
    }

    fn system_foo(eth0_ip: &str) -> ResourceData {
        ResourceData::new(EntityKind::System, "foo")
            .with("profile", "web")
            .with("hostname", "foo.lab")
            .with_interface(Interface::new("eth0").with_static_ip(eth0_ip))
            .with_interface(Interface::new("eth1").with_static_ip("1.2.3.5"))
    }

    fn is_upsert_of(call: &Call, name: &str) -> bool {
        matches!(call, Call::CreateInterface(_, n) if n == name)
    }

    #[test]
    fn test_create_then_reconcile_is_noop() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock);

        let desired = distro();
        let first = reconciler.reconcile(&desired, None).unwrap();
        assert_eq!(first.action, Action::Created);
        let state = first.state.unwrap();
        assert_eq!(state, desired);

        client.clear_calls();
        let second = reconciler.reconcile(&desired, Some(&state)).unwrap();
        assert_eq!(second.action, Action::Unchanged);
        assert_eq!(second.state.as_ref(), Some(&state));
        assert_eq!(client.count(|c| matches!(c, Call::Update(..))), 0);
    }

    #[test]
    fn test_system_round_trip_is_noop() {
        let client = FakeClient::new();
        let lock = InstrumentedLock::new();
        let reconciler = Reconciler::new(&client, &lock);

        let desired = system_foo("1.2.3.4");
        let state = reconciler.reconcile(&desired, None).unwrap().state.unwrap();
        assert_eq!(state, desired);

        client.clear_calls();
        let again = reconciler.reconcile(&desired, Some(&state)).unwrap();
        assert_eq!(again.action, Action::Unchanged);
        assert_eq!(client.count(|c| *c == Call::Sync), 0);
        assert!(client.interface_calls().is_empty());
    }

    #[test]
    fn test_server_filled_interface_settings_are_not_drift() {
        let client = FakeClient::new();
        client.default_virt_bridge("xenbr0");
        let lock = InstrumentedLock::new();
        let reconciler = Reconciler::new(&client, &lock);

        let desired = system_foo("1.2.3.4");
        let mut state = reconciler.reconcile(&desired, None).unwrap().state.unwrap();
        assert_eq!(state, desired);
        assert_eq!(client.interfaces_of("foo")["eth0"].virt_bridge, "xenbr0");

        for _ in 0..3 {
            let outcome = reconciler.reconcile(&desired, Some(&state)).unwrap();
            assert_eq!(outcome.action, Action::Unchanged);
            state = outcome.state.unwrap();
        }
        assert_eq!(client.count(|c| *c == Call::Sync), 1);
        assert_eq!(client.count(|c| matches!(c, Call::CreateInterface(..))), 2);
    }

    #[test]
    fn test_declared_interface_setting_still_drifts() {
        let client = FakeClient::new();
        client.default_virt_bridge("xenbr0");
        let reconciler = Reconciler::new(&client, &NoLock).with_policy(DiffPolicy::ByName);

        let state = reconciler
            .reconcile(&system_foo("1.2.3.4"), None)
            .unwrap()
            .state
            .unwrap();
        client.clear_calls();

        let mut desired = system_foo("1.2.3.4");
        desired.interfaces[0].virt_bridge = "br0".to_string();
        let outcome = reconciler.reconcile(&desired, Some(&state)).unwrap();

        assert_eq!(outcome.action, Action::Updated);
        assert_eq!(client.interface_calls(), vec![Call::CreateInterface(
            "foo".to_string(),
            "eth0".to_string()
        )]);
        assert_eq!(client.interfaces_of("foo")["eth0"].virt_bridge, "br0");
    }

    #[test]
    fn test_create_existing_is_conflict() {
        let client = FakeClient::new();
        client.insert(RemoteEntity::new(EntityKind::Distro, "ubuntu"));
        let reconciler = Reconciler::new(&client, &NoLock);

        let err = reconciler.reconcile(&distro(), None).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }), "{err}");
        assert_eq!(client.count(|c| matches!(c, Call::Create(..))), 0);

        // plan sees the same conflict
        assert!(matches!(
            reconciler.plan(&distro(), None),
            Err(Error::Conflict { .. })
        ));
    }

    #[test]
    fn test_inherit_flag_is_stable() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock);

        let desired = distro().with("kernel_options_inherit", true);
        let state = reconciler.reconcile(&desired, None).unwrap().state.unwrap();
        assert_eq!(state.inherit_flag("kernel_options"), Some(true));
        assert_eq!(state.get("kernel_options"), None);

        // The server resolved a concrete value from the parent
        let mut remote = client.entity(EntityKind::Distro, "ubuntu").unwrap();
        remote.fields.insert(
            "kernel_options".to_string(),
            Inheritable::Inherited {
                resolved: Some(AttrValue::str_map([("console", "ttyS0")])),
            },
        );
        client.insert(remote);

        let shape = desired
            .clone()
            .with("kernel_options", AttrValue::Map(Default::default()));
        let read = reconciler.read(&shape).unwrap().unwrap();
        assert_eq!(read.inherit_flag("kernel_options"), Some(true));
        assert_eq!(
            read.get("kernel_options"),
            Some(&AttrValue::Map(Default::default()))
        );

        let again = reconciler.reconcile(&desired, Some(&state)).unwrap();
        assert_eq!(again.action, Action::Unchanged);
    }

    #[test]
    fn test_override_inherited_field() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock);

        let state = reconciler
            .reconcile(&distro().with("owners_inherit", true), None)
            .unwrap()
            .state
            .unwrap();

        let desired = distro().with("owners", AttrValue::str_list(["admin"]));
        let outcome = reconciler.reconcile(&desired, Some(&state)).unwrap();
        assert_eq!(outcome.action, Action::Updated);
        assert_eq!(
            client
                .entity(EntityKind::Distro, "ubuntu")
                .unwrap()
                .field("owners"),
            Some(&Inheritable::Explicit(AttrValue::str_list(["admin"])))
        );
    }

    #[test]
    fn test_scenario_one_upsert_then_sync_under_lock() {
        let lock = InstrumentedLock::new();
        let client = FakeClient::observing(&lock);
        let reconciler = Reconciler::new(&client, &lock).with_policy(DiffPolicy::ByName);

        let state = reconciler
            .reconcile(&system_foo("1.2.3.4"), None)
            .unwrap()
            .state
            .unwrap();
        client.clear_calls();

        let desired = system_foo("1.2.3.6");
        let outcome = reconciler.reconcile(&desired, Some(&state)).unwrap();
        assert_eq!(outcome.action, Action::Updated);
        assert_eq!(outcome.state.unwrap(), desired);

        let calls = client.calls_with_lock_state();
        let upserts: Vec<_> = calls
            .iter()
            .filter(|(c, _)| matches!(c, Call::CreateInterface(..)))
            .collect();
        assert_eq!(upserts.len(), 1, "{calls:?}");
        assert!(is_upsert_of(&upserts[0].0, "eth0"));
        assert!(
            !calls
                .iter()
                .any(|(c, _)| matches!(c, Call::DeleteInterface(_, n) | Call::CreateInterface(_, n) if n == "eth1"))
        );

        let syncs: Vec<_> = calls
            .iter()
            .enumerate()
            .filter(|(_, (c, _))| *c == Call::Sync)
            .collect();
        assert_eq!(syncs.len(), 1);
        let upsert_at = calls
            .iter()
            .position(|(c, _)| is_upsert_of(c, "eth0"))
            .unwrap();
        assert!(upsert_at < syncs[0].0);

        // Update, interface write and sync all ran inside the section
        for (call, held) in &calls {
            if matches!(call, Call::Update(..) | Call::CreateInterface(..) | Call::Sync) {
                assert!(*held, "{call:?} ran outside the lock");
            }
        }
        assert!(!lock.is_held());
    }

    #[test]
    fn test_compatible_policy_rewrites_whole_set() {
        let client = FakeClient::new();
        let lock = InstrumentedLock::new();
        let reconciler = Reconciler::new(&client, &lock);

        let state = reconciler
            .reconcile(&system_foo("1.2.3.4"), None)
            .unwrap()
            .state
            .unwrap();
        client.clear_calls();

        reconciler
            .reconcile(&system_foo("1.2.3.6"), Some(&state))
            .unwrap();
        assert_eq!(client.count(|c| is_upsert_of(c, "eth0")), 1);
        assert_eq!(client.count(|c| is_upsert_of(c, "eth1")), 1);
        assert_eq!(client.count(|c| *c == Call::Sync), 1);
    }

    #[test]
    fn test_create_syncs_once() {
        let lock = InstrumentedLock::new();
        let client = FakeClient::observing(&lock);
        let reconciler = Reconciler::new(&client, &lock);

        reconciler.reconcile(&system_foo("1.2.3.4"), None).unwrap();
        assert_eq!(client.count(|c| *c == Call::Sync), 1);
        assert_eq!(lock.acquisitions(), 1);
        assert_eq!(client.interfaces_of("foo").len(), 2);
    }

    #[test]
    fn test_removed_interface_is_deleted() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock).with_policy(DiffPolicy::ByName);

        let state = reconciler
            .reconcile(&system_foo("1.2.3.4"), None)
            .unwrap()
            .state
            .unwrap();

        let mut desired = system_foo("1.2.3.4");
        desired.interfaces.retain(|i| i.name == "eth0");
        reconciler.reconcile(&desired, Some(&state)).unwrap();

        assert_eq!(
            client.interface_calls(),
            vec![
                Call::CreateInterface("foo".into(), "eth0".into()),
                Call::CreateInterface("foo".into(), "eth1".into()),
                Call::DeleteInterface("foo".into(), "eth1".into()),
            ]
        );
        assert!(!client.interfaces_of("foo").contains_key("eth1"));
    }

    #[test]
    fn test_not_found_policy_divergence() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock);

        let system = system_foo("1.2.3.4");
        assert_eq!(reconciler.read(&system).unwrap(), None);

        let err = reconciler.read(&distro()).unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn test_externally_deleted_system_is_recreated() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock);

        let desired = system_foo("1.2.3.4");
        let state = reconciler.reconcile(&desired, None).unwrap().state.unwrap();
        client.remove(EntityKind::System, "foo");

        assert_eq!(
            reconciler.plan(&desired, Some(&state)).unwrap(),
            Action::Created
        );
        let outcome = reconciler.reconcile(&desired, Some(&state)).unwrap();
        assert_eq!(outcome.action, Action::Created);
        assert!(client.entity(EntityKind::System, "foo").is_some());

        // A distro that vanished is an error instead
        let distro_state = reconciler.reconcile(&distro(), None).unwrap().state.unwrap();
        client.remove(EntityKind::Distro, "ubuntu");
        assert!(
            reconciler
                .reconcile(&distro(), Some(&distro_state))
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_snippet_is_not_read_back() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock);

        let desired = ResourceData::new(EntityKind::Snippet, "partition").with("body", "clearpart --all");
        let state = reconciler.reconcile(&desired, None).unwrap().state.unwrap();
        assert_eq!(state, desired);
        assert_eq!(client.count(|c| matches!(c, Call::Get(..))), 0);

        let changed = ResourceData::new(EntityKind::Snippet, "partition").with("body", "autopart");
        assert_eq!(
            reconciler.plan(&changed, Some(&state)).unwrap(),
            Action::Updated
        );
        let outcome = reconciler.reconcile(&changed, Some(&state)).unwrap();
        assert_eq!(outcome.action, Action::Updated);
        assert_eq!(outcome.state.unwrap(), changed);
        assert_eq!(client.count(|c| matches!(c, Call::Get(..))), 0);
    }

    #[test]
    fn test_template_read_back_is_configurable() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock)
            .with_behaviors(Behaviors::default().with_template_read_back(true));

        let desired = ResourceData::new(EntityKind::TemplateFile, "default.ks").with("body", "install");
        reconciler.reconcile(&desired, None).unwrap();
        assert!(client.count(|c| matches!(c, Call::Get(EntityKind::TemplateFile, _))) > 0);
    }

    #[test]
    fn test_delete_missing_reports_not_found() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock);
        let err = reconciler.delete(EntityKind::Repo, "epel").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_prior_for_other_entity_is_rejected() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock);
        let prior = ResourceData::new(EntityKind::Distro, "debian");
        let err = reconciler.reconcile(&distro(), Some(&prior)).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_validation_happens_before_any_call() {
        let client = FakeClient::new();
        let reconciler = Reconciler::new(&client, &NoLock);
        let desired = ResourceData::new(EntityKind::Repo, "epel");
        assert!(matches!(
            reconciler.reconcile(&desired, None),
            Err(Error::Validation { .. })
        ));
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_concurrent_systems_serialize_on_lock() {
        let lock = InstrumentedLock::serializing();
        let client = FakeClient::observing(&lock);
        let reconciler = Reconciler::new(&client, &lock);

        thread::scope(|s| {
            for n in 0..6 {
                let reconciler = &reconciler;
                s.spawn(move || {
                    let desired = ResourceData::new(EntityKind::System, format!("node{n}"))
                        .with("profile", "web")
                        .with_interface(
                            Interface::new("eth0").with_static_ip(format!("10.0.0.{n}")),
                        );
                    let outcome = reconciler.reconcile(&desired, None).unwrap();
                    assert_eq!(outcome.action, Action::Created);
                });
            }
        });

        assert_eq!(lock.acquisitions(), 6);
        let calls = client.calls_with_lock_state();
        assert_eq!(calls.iter().filter(|(c, _)| *c == Call::Sync).count(), 6);
        assert!(
            calls
                .iter()
                .filter(|(c, _)| matches!(c, Call::Create(..) | Call::Sync))
                .all(|(_, held)| *held)
        );
    }
}
