//! The remote provisioning client seam
//!
//! The reconciler never talks to the network itself. Everything it needs
//! from the remote service goes through [`RemoteClient`], which owns
//! transport, authentication and wire encoding.

use crate::error::ClientError;
use crate::inherit::Inheritable;
use crate::interface::Interface;
use crate::schema::EntityKind;
use crate::types::AttrValue;
use std::collections::BTreeMap;
use std::fmt;

/// Result type for [`RemoteClient`] calls.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Fields of an entity in remote shape
pub type RemoteFields = BTreeMap<String, Inheritable<AttrValue>>;

/// An entity as the remote service sees it.
///
/// Fields absent from `fields` are left to the server default on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntity {
    pub kind: EntityKind,
    pub name: String,
    pub fields: RemoteFields,
}

impl RemoteEntity {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            fields: RemoteFields::new(),
        }
    }

    /// Set an explicit field value.
    pub fn with(mut self, field: &str, value: impl Into<AttrValue>) -> Self {
        self.fields
            .insert(field.to_string(), Inheritable::Explicit(value.into()));
        self
    }

    /// Mark a field as inherited.
    pub fn with_inherited(mut self, field: &str) -> Self {
        self.fields
            .insert(field.to_string(), Inheritable::inherited());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Inheritable<AttrValue>> {
        self.fields.get(name)
    }
}

/// Server-side handle of a system, needed for interface calls
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SystemHandle(String);

impl SystemHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options for [`RemoteClient::get`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Also fetch the values the server resolves for inherited fields.
    /// They end up in [`Inheritable::Inherited`]'s `resolved` slot.
    pub resolved: bool,
}

impl GetOptions {
    pub fn resolved() -> Self {
        Self { resolved: true }
    }
}

/// Blocking client for the remote provisioning service.
///
/// Implementations must report a missing entity as
/// [`ClientError::NotFound`] and a duplicate on create as
/// [`ClientError::AlreadyExists`], never as a generic call failure.
pub trait RemoteClient: Send + Sync {
    /// Create an entity and return it as stored.
    fn create(&self, entity: &RemoteEntity) -> ClientResult<RemoteEntity>;

    /// Fetch an entity by name.
    fn get(&self, kind: EntityKind, name: &str, options: GetOptions) -> ClientResult<RemoteEntity>;

    /// Resubmit the full field set of an existing entity.
    fn update(&self, entity: &RemoteEntity) -> ClientResult<()>;

    fn delete(&self, kind: EntityKind, name: &str) -> ClientResult<()>;

    /// Look up the handle of an existing system.
    fn system_handle(&self, name: &str) -> ClientResult<SystemHandle>;

    /// Create or overwrite the interface named `interface.name`.
    fn create_interface(&self, handle: &SystemHandle, interface: &Interface) -> ClientResult<()>;

    fn delete_interface(&self, handle: &SystemHandle, name: &str) -> ClientResult<()>;

    /// All interfaces of a system, keyed by name.
    fn get_interfaces(&self, handle: &SystemHandle) -> ClientResult<BTreeMap<String, Interface>>;

    /// Regenerate network boot configuration from the entity graph.
    fn sync(&self) -> ClientResult<()>;
}
