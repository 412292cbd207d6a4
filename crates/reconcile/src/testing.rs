//! In-memory remote service and instrumented lock for tests
//!
//! Built for this crate's tests and, with the `testing` feature, for
//! downstream crates that drive a [`crate::Reconciler`].

use crate::client::{ClientResult, GetOptions, RemoteClient, RemoteEntity, SystemHandle};
use crate::error::ClientError;
use crate::interface::Interface;
use crate::schema::EntityKind;
use crate::sync::{ExclusiveSection, NoLock, ProcessLock, SectionGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const HANDLE_PREFIX: &str = "handle::";

/// A call observed by [`FakeClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(EntityKind, String),
    Get(EntityKind, String),
    Update(EntityKind, String),
    Delete(EntityKind, String),
    Handle(String),
    /// System name, interface name
    CreateInterface(String, String),
    DeleteInterface(String, String),
    GetInterfaces(String),
    Sync,
}

#[derive(Default)]
struct Remote {
    entities: BTreeMap<(EntityKind, String), RemoteEntity>,
    interfaces: BTreeMap<String, BTreeMap<String, Interface>>,
    /// Every call with whether the section was held at the time
    calls: Vec<(Call, bool)>,
    fail_interface_writes: Option<String>,
    /// Bridge the server assigns to interfaces written without one
    default_virt_bridge: Option<String>,
    /// Entity names whose create, update and delete fail
    failing: BTreeSet<String>,
}

impl Remote {
    fn check(&self, name: &str) -> ClientResult<()> {
        if self.failing.contains(name) {
            return Err(ClientError::Call("internal server error".to_string()));
        }
        Ok(())
    }
}

/// Recording fake of the remote service.
#[derive(Default)]
pub struct FakeClient {
    remote: Mutex<Remote>,
    section: Option<Arc<AtomicBool>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record whether `lock` is held at each call.
    pub fn observing<L: ExclusiveSection>(lock: &InstrumentedLock<L>) -> Self {
        Self {
            remote: Mutex::default(),
            section: Some(Arc::clone(&lock.held)),
        }
    }

    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, Remote> {
        let held = self
            .section
            .as_ref()
            .is_some_and(|h| h.load(Ordering::SeqCst));
        let mut remote = self.remote.lock().unwrap();
        remote.calls.push((call, held));
        remote
    }

    pub fn calls(&self) -> Vec<Call> {
        let remote = self.remote.lock().unwrap();
        remote.calls.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn calls_with_lock_state(&self) -> Vec<(Call, bool)> {
        self.remote.lock().unwrap().calls.clone()
    }

    pub fn interface_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CreateInterface(..) | Call::DeleteInterface(..)))
            .collect()
    }

    /// Calls that change remote state, reads left out
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Get(..) | Call::Handle(_) | Call::GetInterfaces(_)))
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.remote.lock().unwrap().calls.clear();
    }

    pub fn fail_interface_writes(&self, message: &str) {
        self.remote.lock().unwrap().fail_interface_writes = Some(message.to_string());
    }

    /// Make every create, update and delete of `name` fail.
    pub fn fail_entity(&self, name: &str) {
        self.remote.lock().unwrap().failing.insert(name.to_string());
    }

    /// Fill in `bridge` for every interface written without a virt bridge,
    /// the way the server applies its own default.
    pub fn default_virt_bridge(&self, bridge: &str) {
        self.remote.lock().unwrap().default_virt_bridge = Some(bridge.to_string());
    }

    /// Seed an entity as if created outside the reconciler.
    pub fn insert(&self, entity: RemoteEntity) {
        let mut remote = self.remote.lock().unwrap();
        if entity.kind == EntityKind::System {
            remote.interfaces.entry(entity.name.clone()).or_default();
        }
        remote
            .entities
            .insert((entity.kind, entity.name.clone()), entity);
    }

    /// Delete an entity behind the reconciler's back.
    pub fn remove(&self, kind: EntityKind, name: &str) {
        let mut remote = self.remote.lock().unwrap();
        remote.entities.remove(&(kind, name.to_string()));
        remote.interfaces.remove(name);
    }

    pub fn entity(&self, kind: EntityKind, name: &str) -> Option<RemoteEntity> {
        let remote = self.remote.lock().unwrap();
        remote.entities.get(&(kind, name.to_string())).cloned()
    }

    pub fn interfaces_of(&self, system: &str) -> BTreeMap<String, Interface> {
        let remote = self.remote.lock().unwrap();
        remote.interfaces.get(system).cloned().unwrap_or_default()
    }
}

fn system_of(handle: &SystemHandle) -> String {
    handle
        .as_str()
        .strip_prefix(HANDLE_PREFIX)
        .unwrap_or(handle.as_str())
        .to_string()
}

impl RemoteClient for FakeClient {
    fn create(&self, entity: &RemoteEntity) -> ClientResult<RemoteEntity> {
        let mut remote = self.record(Call::Create(entity.kind, entity.name.clone()));
        remote.check(&entity.name)?;
        let key = (entity.kind, entity.name.clone());
        if remote.entities.contains_key(&key) {
            return Err(ClientError::AlreadyExists);
        }
        if entity.kind == EntityKind::System {
            remote.interfaces.insert(entity.name.clone(), BTreeMap::new());
        }
        remote.entities.insert(key, entity.clone());
        Ok(entity.clone())
    }

    fn get(&self, kind: EntityKind, name: &str, _options: GetOptions) -> ClientResult<RemoteEntity> {
        let remote = self.record(Call::Get(kind, name.to_string()));
        remote
            .entities
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or(ClientError::NotFound)
    }

    fn update(&self, entity: &RemoteEntity) -> ClientResult<()> {
        let mut remote = self.record(Call::Update(entity.kind, entity.name.clone()));
        remote.check(&entity.name)?;
        match remote.entities.get_mut(&(entity.kind, entity.name.clone())) {
            Some(stored) => {
                stored.fields.clone_from(&entity.fields);
                Ok(())
            }
            None => Err(ClientError::NotFound),
        }
    }

    fn delete(&self, kind: EntityKind, name: &str) -> ClientResult<()> {
        let mut remote = self.record(Call::Delete(kind, name.to_string()));
        remote.check(name)?;
        remote
            .entities
            .remove(&(kind, name.to_string()))
            .map(|_| ())
            .ok_or(ClientError::NotFound)?;
        remote.interfaces.remove(name);
        Ok(())
    }

    fn system_handle(&self, name: &str) -> ClientResult<SystemHandle> {
        let remote = self.record(Call::Handle(name.to_string()));
        if remote
            .entities
            .contains_key(&(EntityKind::System, name.to_string()))
        {
            Ok(SystemHandle::new(format!("{HANDLE_PREFIX}{name}")))
        } else {
            Err(ClientError::NotFound)
        }
    }

    fn create_interface(&self, handle: &SystemHandle, interface: &Interface) -> ClientResult<()> {
        let system = system_of(handle);
        let mut remote = self.record(Call::CreateInterface(
            system.clone(),
            interface.name.clone(),
        ));
        if let Some(message) = &remote.fail_interface_writes {
            return Err(ClientError::Call(message.clone()));
        }
        let mut stored = interface.clone();
        if let Some(bridge) = &remote.default_virt_bridge
            && stored.virt_bridge.is_empty()
        {
            stored.virt_bridge.clone_from(bridge);
        }
        remote
            .interfaces
            .entry(system)
            .or_default()
            .insert(stored.name.clone(), stored);
        Ok(())
    }

    fn delete_interface(&self, handle: &SystemHandle, name: &str) -> ClientResult<()> {
        let system = system_of(handle);
        let mut remote = self.record(Call::DeleteInterface(system.clone(), name.to_string()));
        if let Some(set) = remote.interfaces.get_mut(&system) {
            set.remove(name);
        }
        Ok(())
    }

    fn get_interfaces(&self, handle: &SystemHandle) -> ClientResult<BTreeMap<String, Interface>> {
        let system = system_of(handle);
        let remote = self.record(Call::GetInterfaces(system.clone()));
        remote
            .interfaces
            .get(&system)
            .cloned()
            .ok_or(ClientError::NotFound)
    }

    fn sync(&self) -> ClientResult<()> {
        drop(self.record(Call::Sync));
        Ok(())
    }
}

/// Exclusive section that panics when entered while already held.
pub struct InstrumentedLock<L = NoLock> {
    inner: L,
    held: Arc<AtomicBool>,
    acquisitions: AtomicUsize,
}

impl Default for InstrumentedLock<NoLock> {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentedLock<NoLock> {
    /// Detects overlap without preventing it.
    pub fn new() -> Self {
        Self::wrapping(NoLock)
    }
}

impl InstrumentedLock<ProcessLock> {
    /// Serializes through a real process lock and checks that it holds.
    pub fn serializing() -> Self {
        Self::wrapping(ProcessLock::new())
    }
}

impl<L: ExclusiveSection> InstrumentedLock<L> {
    fn wrapping(inner: L) -> Self {
        Self {
            inner,
            held: Arc::new(AtomicBool::new(false)),
            acquisitions: AtomicUsize::new(0),
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl<L: ExclusiveSection> ExclusiveSection for InstrumentedLock<L> {
    fn acquire(&self) -> SectionGuard<'_> {
        let inner = self.inner.acquire();
        assert!(
            !self.held.swap(true, Ordering::SeqCst),
            "exclusive section re-entered concurrently"
        );
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        SectionGuard::with_release(move || {
            self.held.store(false, Ordering::SeqCst);
            drop(inner);
        })
    }
}
