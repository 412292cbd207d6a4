//! Reconciliation of declared provisioning entities
//!
//! This crate brings distros, profiles, repos, snippets, template files and
//! systems on a remote provisioning service in line with a declared desired
//! state. It does no I/O itself: every remote call goes through an injected
//! [`RemoteClient`].
//!
//! # Pieces
//!
//! - [`Inheritable`]: a field that is either explicit or deferred to the
//!   parent entity
//! - [`build`]: desired state to remote entity, applying the inherit rules
//! - [`Reconciler`]: create/read/update/delete of one entity
//! - [`interface::diff`]: breaks an interface set change into per-interface
//!   calls, removals first
//! - [`ExclusiveSection`]: serializes system mutations and the sync that
//!   follows them
//!
//! # Example
//!
//! ```ignore
//! use reconcile::{EntityKind, ProcessLock, Reconciler, ResourceData};
//!
//! let lock = ProcessLock::new();
//! let reconciler = Reconciler::new(&client, &lock);
//!
//! let desired = ResourceData::new(EntityKind::Distro, "ubuntu-24.04")
//!     .with("kernel", "/srv/ubuntu/vmlinuz")
//!     .with("initrd", "/srv/ubuntu/initrd.gz")
//!     .with("kernel_options_inherit", true);
//!
//! let outcome = reconciler.reconcile(&desired, None)?;
//! println!("{}", outcome.action);
//! ```

pub mod builder;
pub mod client;
pub mod error;
pub mod inherit;
pub mod interface;
pub mod reconciler;
pub mod schema;
pub mod sync;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use builder::{build, project, translate};
pub use client::{ClientResult, GetOptions, RemoteClient, RemoteEntity, RemoteFields, SystemHandle};
pub use error::{ClientError, Error, Result};
pub use inherit::{Inheritable, is_option_inherited};
pub use interface::{DiffPolicy, Interface, InterfaceDiff, InterfaceType};
pub use reconciler::Reconciler;
pub use schema::{Behaviors, EntityKind, FieldKind, FieldSpec, KindBehavior, MissingPolicy};
pub use sync::{ExclusiveSection, NoLock, ProcessLock, SectionGuard};
pub use types::{
    Action, AttrValue, Attributes, INHERIT_SUFFIX, Outcome, ResourceData, Summary, Target,
    inherit_key,
};
