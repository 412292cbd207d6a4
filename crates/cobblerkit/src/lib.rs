//! # cobblerkit
//!
//! Blocking client for the Cobbler XML-RPC API.
//!
//! This crate provides:
//! - XML-RPC encoding and decoding on top of `quick-xml`
//! - Login and token handling
//! - Create/read/update/delete of distros, profiles, repos and systems,
//!   plus autoinstall snippets and templates
//! - Per-interface edits of systems and the `sync` call
//! - Retry with exponential backoff for transient transport errors
//!
//! [`Client`] implements [`reconcile::RemoteClient`], so it can be handed
//! straight to a [`reconcile::Reconciler`].
//!
//! ## Example
//!
//! ```no_run
//! use cobblerkit::{Client, ConnectOptions};
//! use reconcile::{EntityKind, GetOptions, RemoteClient};
//!
//! let options = ConnectOptions::new("https://cobbler.lab/cobbler_api", "cobbler", "secret");
//! let client = Client::connect(&options).expect("login failed");
//!
//! let distro = client
//!     .get(EntityKind::Distro, "ubuntu-24.04", GetOptions::default())
//!     .expect("lookup failed");
//! println!("{} fields", distro.fields.len());
//! ```

pub mod codec;
pub mod error;
pub mod retry;
pub mod transport;
pub mod types;
pub mod xmlrpc;

pub use error::{Error, ErrorCategory, Result};
pub use transport::{HttpTransport, TlsOptions, Transport};
pub use types::{ConnectOptions, RetryConfig};

use reconcile::{
    ClientResult, EntityKind, GetOptions, Inheritable, Interface, RemoteClient, RemoteEntity,
    SystemHandle,
};
use retry::LogCallback;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use xmlrpc::Value;

/// Cobbler's "no such item" reply to `get_<kind>`
const NOT_FOUND: &str = "~";

/// How an entity kind is stored on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    /// A collection item, edited through handles (`distro`, `system`, ...)
    Item(&'static str),
    /// A file under the autoinstall tree (`snippet` or `template`)
    File(&'static str),
}

impl Storage {
    fn of(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Distro => Self::Item("distro"),
            EntityKind::Repo => Self::Item("repo"),
            EntityKind::Profile => Self::Item("profile"),
            EntityKind::System => Self::Item("system"),
            EntityKind::Snippet => Self::File("snippet"),
            EntityKind::TemplateFile => Self::File("template"),
        }
    }
}

/// Cobbler API client.
///
/// Calls are made with the session token obtained at login. Handles
/// returned by [`RemoteClient::system_handle`] are remembered so interfaces
/// can be read back by handle.
pub struct Client<T: Transport = HttpTransport> {
    transport: T,
    retry: RetryConfig,
    token: String,
    /// System handle to system name
    handles: Mutex<BTreeMap<String, String>>,
}

impl Client<HttpTransport> {
    /// Connect over HTTP(S) and log in.
    pub fn connect(options: &ConnectOptions) -> Result<Self> {
        let tls = TlsOptions {
            insecure: options.insecure,
            ca_cert_pem: options.ca_cert_pem.clone(),
        };
        let transport = HttpTransport::new(&options.url, &tls)?;
        let mut client = Self::with_transport(transport, options.retry.clone());
        client.login(&options.username, &options.password)?;
        log::debug!("Logged in to {} as {}", options.url, options.username);
        Ok(client)
    }
}

impl<T: Transport> Client<T> {
    /// Create a client over an arbitrary transport. Call [`Client::login`]
    /// before anything else.
    pub fn with_transport(transport: T, retry: RetryConfig) -> Self {
        Self {
            transport,
            retry,
            token: String::new(),
            handles: Mutex::new(BTreeMap::new()),
        }
    }

    /// Log in and keep the session token.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let reply = self.call("login", &[username.into(), password.into()])?;
        self.token = string_reply(reply, "login")?;
        Ok(())
    }

    /// Send one call, retrying transient transport failures.
    fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        log::debug!("XML-RPC {method}");
        let body = xmlrpc::encode_call(method, params);
        let callback = LogCallback { operation: method };
        retry::with_retry(&self.retry, Some(&callback), || {
            let response = self.transport.post(&body)?;
            xmlrpc::parse_response(&response)
        })
    }

    /// Send a call with the session token appended.
    fn authed(&self, method: &str, mut params: Vec<Value>) -> Result<Value> {
        params.push(Value::from(self.token.as_str()));
        self.call(method, &params)
    }

    /// Fetch the raw item struct, `None` when the item does not exist.
    fn fetch_item(
        &self,
        what: &str,
        name: &str,
        resolved: bool,
    ) -> Result<Option<BTreeMap<String, Value>>> {
        let reply = self.authed(
            &format!("get_{what}"),
            vec![name.into(), Value::Bool(false), Value::Bool(resolved)],
        )?;
        match reply {
            Value::Str(s) if s == NOT_FOUND => Ok(None),
            Value::Struct(members) => Ok(Some(members)),
            other => Err(Error::decode(format!(
                "get_{what} returned a {}",
                other.type_name()
            ))),
        }
    }

    fn get_entity(&self, kind: EntityKind, name: &str, options: GetOptions) -> Result<RemoteEntity> {
        match Storage::of(kind) {
            Storage::Item(what) => {
                let members = self
                    .fetch_item(what, name, false)?
                    .ok_or_else(|| not_found(kind, name))?;
                let mut entity = codec::decode_entity(kind, name, &members)?;

                if options.resolved && entity.fields.values().any(Inheritable::is_inherited) {
                    let resolved = self
                        .fetch_item(what, name, true)?
                        .ok_or_else(|| not_found(kind, name))?;
                    fill_resolved(&mut entity, &resolved)?;
                }
                Ok(entity)
            }
            Storage::File(what) => {
                let reply = self
                    .authed(&format!("read_autoinstall_{what}"), vec![name.into()])
                    .map_err(|e| missing_as_not_found(e, kind, name))?;
                let body = string_reply(reply, "read_autoinstall")?;
                Ok(RemoteEntity::new(kind, name).with("body", body))
            }
        }
    }

    /// Write every field of `entity` onto the item behind `handle`.
    fn modify_fields(&self, what: &str, handle: &str, entity: &RemoteEntity) -> Result<()> {
        let method = format!("modify_{what}");
        for (field, value) in &entity.fields {
            self.authed(
                &method,
                vec![handle.into(), field.as_str().into(), codec::encode_field(value)],
            )?;
        }
        Ok(())
    }

    fn write_file(&self, what: &str, entity: &RemoteEntity) -> Result<()> {
        let body = entity
            .field("body")
            .and_then(Inheritable::explicit)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::Other(format!("{} '{}' has no body", entity.kind, entity.name))
            })?;
        self.authed(
            &format!("write_autoinstall_{what}"),
            vec![entity.name.as_str().into(), body.into()],
        )?;
        Ok(())
    }

    fn create_entity(&self, entity: &RemoteEntity) -> Result<RemoteEntity> {
        let (kind, name) = (entity.kind, entity.name.as_str());
        match Storage::of(kind) {
            Storage::Item(what) => {
                if self.fetch_item(what, name, false)?.is_some() {
                    return Err(Error::AlreadyExists {
                        kind: kind.to_string(),
                        name: name.to_string(),
                    });
                }

                let handle = string_reply(self.authed(&format!("new_{what}"), Vec::new())?, "new")?;
                self.authed(
                    &format!("modify_{what}"),
                    vec![handle.as_str().into(), "name".into(), name.into()],
                )?;
                self.modify_fields(what, &handle, entity)?;
                self.authed(&format!("save_{what}"), vec![handle.into()])?;
                log::info!("Created {kind} '{name}'");

                self.get_entity(kind, name, GetOptions::default())
            }
            Storage::File(what) => {
                self.write_file(what, entity)?;
                log::info!("Wrote {kind} '{name}'");
                Ok(entity.clone())
            }
        }
    }

    fn update_entity(&self, entity: &RemoteEntity) -> Result<()> {
        let (kind, name) = (entity.kind, entity.name.as_str());
        match Storage::of(kind) {
            Storage::Item(what) => {
                let handle = self.item_handle(kind, what, name)?;
                self.modify_fields(what, &handle, entity)?;
                self.authed(&format!("save_{what}"), vec![handle.into()])?;
            }
            Storage::File(what) => self.write_file(what, entity)?,
        }
        log::info!("Updated {kind} '{name}'");
        Ok(())
    }

    fn delete_entity(&self, kind: EntityKind, name: &str) -> Result<()> {
        let method = match Storage::of(kind) {
            Storage::Item(what) => format!("remove_{what}"),
            Storage::File(what) => format!("remove_autoinstall_{what}"),
        };
        self.authed(&method, vec![name.into()])
            .map_err(|e| missing_as_not_found(e, kind, name))?;
        log::info!("Removed {kind} '{name}'");
        Ok(())
    }

    fn item_handle(&self, kind: EntityKind, what: &str, name: &str) -> Result<String> {
        let reply = self
            .authed(&format!("get_{what}_handle"), vec![name.into()])
            .map_err(|e| missing_as_not_found(e, kind, name))?;
        string_reply(reply, "get_handle")
    }

    /// Edit one interface through `modify_system` and save the system.
    fn modify_interface(&self, handle: &SystemHandle, action: &str, argument: Value) -> Result<()> {
        self.authed(
            "modify_system",
            vec![handle.as_str().into(), action.into(), argument],
        )?;
        self.authed("save_system", vec![handle.as_str().into()])?;
        Ok(())
    }

    fn system_name(&self, handle: &SystemHandle) -> Result<String> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle.as_str())
            .cloned()
            .ok_or_else(|| Error::Other(format!("unknown system handle '{handle}'")))
    }
}

impl<T: Transport> RemoteClient for Client<T> {
    fn create(&self, entity: &RemoteEntity) -> ClientResult<RemoteEntity> {
        Ok(self.create_entity(entity)?)
    }

    fn get(&self, kind: EntityKind, name: &str, options: GetOptions) -> ClientResult<RemoteEntity> {
        Ok(self.get_entity(kind, name, options)?)
    }

    fn update(&self, entity: &RemoteEntity) -> ClientResult<()> {
        Ok(self.update_entity(entity)?)
    }

    fn delete(&self, kind: EntityKind, name: &str) -> ClientResult<()> {
        Ok(self.delete_entity(kind, name)?)
    }

    fn system_handle(&self, name: &str) -> ClientResult<SystemHandle> {
        let handle = self.item_handle(EntityKind::System, "system", name)?;
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.clone(), name.to_string());
        Ok(SystemHandle::new(handle))
    }

    fn create_interface(&self, handle: &SystemHandle, interface: &Interface) -> ClientResult<()> {
        log::debug!("Writing interface {} on {handle}", interface.name);
        Ok(self.modify_interface(
            handle,
            "modify_interface",
            codec::encode_interface(interface),
        )?)
    }

    fn delete_interface(&self, handle: &SystemHandle, name: &str) -> ClientResult<()> {
        log::debug!("Deleting interface {name} on {handle}");
        Ok(self.modify_interface(handle, "delete_interface", name.into())?)
    }

    fn get_interfaces(&self, handle: &SystemHandle) -> ClientResult<BTreeMap<String, Interface>> {
        let name = self.system_name(handle)?;
        let members = self
            .fetch_item("system", &name, false)?
            .ok_or_else(|| not_found(EntityKind::System, &name))?;
        match members.get("interfaces") {
            Some(value) => Ok(codec::decode_interfaces(value)?),
            None => Ok(BTreeMap::new()),
        }
    }

    fn sync(&self) -> ClientResult<()> {
        log::info!("Running Cobbler sync");
        self.authed("sync", Vec::new())?;
        Ok(())
    }
}

fn not_found(kind: EntityKind, name: &str) -> Error {
    Error::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

/// Turn a "no such item" fault into [`Error::NotFound`].
fn missing_as_not_found(err: Error, kind: EntityKind, name: &str) -> Error {
    if err.is_missing_fault() {
        not_found(kind, name)
    } else {
        err
    }
}

fn string_reply(value: Value, method: &str) -> Result<String> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(Error::decode(format!(
            "{method} returned a {}, expected a string",
            other.type_name()
        ))),
    }
}

/// Record the server-resolved values of inherited fields.
fn fill_resolved(entity: &mut RemoteEntity, resolved: &BTreeMap<String, Value>) -> Result<()> {
    let kind = entity.kind;
    for (field, slot) in &mut entity.fields {
        let Inheritable::Inherited { resolved: slot } = slot else {
            continue;
        };
        let (Some(spec), Some(value)) = (kind.field(field), resolved.get(field)) else {
            continue;
        };
        if let Inheritable::Explicit(value) = codec::decode_field(spec.kind, value)? {
            *slot = Some(value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{AttrValue, ClientError};
    use std::time::Duration;
    use transport::scripted::ScriptedTransport;

    fn string(s: &str) -> String {
        format!("<value><string>{s}</string></value>")
    }

    fn structure(members: &[(&str, String)]) -> String {
        let members: String = members
            .iter()
            .map(|(name, value)| format!("<member><name>{name}</name>{value}</member>"))
            .collect();
        format!("<value><struct>{members}</struct></value>")
    }

    fn array(items: &[&str]) -> String {
        let items: String = items.iter().map(|i| string(i)).collect();
        format!("<value><array><data>{items}</data></array></value>")
    }

    /// Client logged in with token "tok"
    fn client(script: ScriptedTransport) -> Client<ScriptedTransport> {
        let mut client =
            Client::with_transport(script.reply_string("tok"), RetryConfig::no_retry());
        client.login("cobbler", "secret").unwrap();
        client
    }

    fn distro_struct() -> String {
        structure(&[
            ("name", string("ubuntu")),
            ("kernel", string("/srv/vmlinuz")),
            ("initrd", string("/srv/initrd.gz")),
            ("owners", string("&lt;&lt;inherit&gt;&gt;")),
            ("mtime", "<value><double>1700000000.5</double></value>".to_string()),
        ])
    }

    #[test]
    fn test_login_token_is_sent() {
        let client = client(ScriptedTransport::new().reply_ok());
        client.sync().unwrap();

        let requests = client.transport.requests();
        assert!(requests[0].contains("<string>secret</string>"));
        assert!(requests[1].contains("<methodName>sync</methodName>"));
        assert!(requests[1].contains("<string>tok</string>"));
    }

    #[test]
    fn test_login_failure_is_auth_error() {
        let mut client = Client::with_transport(
            ScriptedTransport::new().fault("login failed (cobbler)"),
            RetryConfig::no_retry(),
        );
        let err = client.login("cobbler", "wrong").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let client = client(ScriptedTransport::new().reply_string("~"));
        let err = client
            .get(EntityKind::Profile, "ghost", GetOptions::default())
            .unwrap_err();
        assert_eq!(err, ClientError::NotFound);
    }

    #[test]
    fn test_get_decodes_fields() {
        let client = client(ScriptedTransport::new().reply(&distro_struct()));
        let distro = client
            .get(EntityKind::Distro, "ubuntu", GetOptions::default())
            .unwrap();

        assert_eq!(
            distro.field("kernel"),
            Some(&Inheritable::Explicit(AttrValue::from("/srv/vmlinuz")))
        );
        assert_eq!(distro.field("owners"), Some(&Inheritable::inherited()));
        assert!(distro.field("mtime").is_none());
        assert_eq!(client.transport.methods(), vec!["login", "get_distro"]);
    }

    #[test]
    fn test_get_resolved_fills_inherited_values() {
        let resolved = structure(&[
            ("kernel", string("/srv/vmlinuz")),
            ("owners", array(&["admin"])),
        ]);
        let client = client(
            ScriptedTransport::new()
                .reply(&distro_struct())
                .reply(&resolved),
        );
        let distro = client
            .get(EntityKind::Distro, "ubuntu", GetOptions::resolved())
            .unwrap();

        assert_eq!(
            distro.field("owners"),
            Some(&Inheritable::Inherited {
                resolved: Some(AttrValue::str_list(["admin"]))
            })
        );
        let requests = client.transport.requests();
        assert!(requests[2].contains("<boolean>1</boolean>"));
    }

    #[test]
    fn test_create_writes_every_field_then_saves() {
        let client = client(
            ScriptedTransport::new()
                .reply_string("~")
                .reply_string("distro::abc")
                .reply_ok()
                .reply_ok()
                .reply_ok()
                .reply_ok()
                .reply_ok()
                .reply(&distro_struct()),
        );
        let entity = RemoteEntity::new(EntityKind::Distro, "ubuntu")
            .with("kernel", "/srv/vmlinuz")
            .with("initrd", "/srv/initrd.gz")
            .with_inherited("owners");

        let created = client.create(&entity).unwrap();
        assert_eq!(created.name, "ubuntu");
        assert_eq!(
            client.transport.methods(),
            vec![
                "login",
                "get_distro",
                "new_distro",
                "modify_distro",
                "modify_distro",
                "modify_distro",
                "modify_distro",
                "save_distro",
                "get_distro",
            ]
        );

        let requests = client.transport.requests();
        assert!(requests[3].contains(
            "<param><value><string>name</string></value></param>\
             <param><value><string>ubuntu</string></value></param>"
        ));
        assert!(requests[6].contains("<string>owners</string>"));
        assert!(requests[6].contains("&lt;&lt;inherit&gt;&gt;"));
    }

    #[test]
    fn test_create_existing_is_already_exists() {
        let client = client(ScriptedTransport::new().reply(&distro_struct()));
        let entity = RemoteEntity::new(EntityKind::Distro, "ubuntu").with("kernel", "/k");

        let err = client.create(&entity).unwrap_err();
        assert_eq!(err, ClientError::AlreadyExists);
        assert_eq!(client.transport.methods(), vec!["login", "get_distro"]);
    }

    #[test]
    fn test_update_uses_handle() {
        let client = client(
            ScriptedTransport::new()
                .reply_string("repo::1")
                .reply_ok()
                .reply_ok(),
        );
        let entity = RemoteEntity::new(EntityKind::Repo, "epel").with("mirror", "http://m/");

        client.update(&entity).unwrap();
        assert_eq!(
            client.transport.methods(),
            vec!["login", "get_repo_handle", "modify_repo", "save_repo"]
        );
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let client = client(
            ScriptedTransport::new().fault("internal error, unknown repo name epel"),
        );
        let entity = RemoteEntity::new(EntityKind::Repo, "epel");
        assert_eq!(client.update(&entity).unwrap_err(), ClientError::NotFound);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let client = client(
            ScriptedTransport::new().fault("internal error, unknown system name foo"),
        );
        assert_eq!(
            client.delete(EntityKind::System, "foo").unwrap_err(),
            ClientError::NotFound
        );
    }

    #[test]
    fn test_other_fault_is_call_error() {
        let client = client(ScriptedTransport::new().fault("invalid kernel path"));
        let err = client.delete(EntityKind::Distro, "ubuntu").unwrap_err();
        assert!(matches!(err, ClientError::Call(ref m) if m.contains("invalid kernel")), "{err:?}");
    }

    #[test]
    fn test_snippet_round_trip() {
        let client = client(
            ScriptedTransport::new()
                .reply_ok()
                .reply_string("echo hi")
                .reply_ok(),
        );
        let snippet = RemoteEntity::new(EntityKind::Snippet, "post").with("body", "echo hi");

        let created = client.create(&snippet).unwrap();
        assert_eq!(created, snippet);
        let read = client
            .get(EntityKind::Snippet, "post", GetOptions::default())
            .unwrap();
        assert_eq!(read.field("body"), snippet.field("body"));
        client.delete(EntityKind::Snippet, "post").unwrap();

        assert_eq!(
            client.transport.methods(),
            vec![
                "login",
                "write_autoinstall_snippet",
                "read_autoinstall_snippet",
                "remove_autoinstall_snippet",
            ]
        );
    }

    #[test]
    fn test_template_read_missing_is_not_found() {
        let client = client(ScriptedTransport::new().fault("[Errno 2] No such file or directory"));
        let err = client
            .get(EntityKind::TemplateFile, "sample.ks", GetOptions::default())
            .unwrap_err();
        assert_eq!(err, ClientError::NotFound);
    }

    #[test]
    fn test_interface_calls() {
        let eth0 = structure(&[
            ("mac_address", string("aa:bb:cc:dd:ee:ff")),
            ("ip_address", string("10.0.0.5")),
            ("static", "<value><boolean>1</boolean></value>".to_string()),
        ]);
        let system = structure(&[
            ("name", string("foo")),
            ("interfaces", structure(&[("eth0", eth0)])),
        ]);
        let client = client(
            ScriptedTransport::new()
                .reply_string("system::7")
                .reply_ok()
                .reply_ok()
                .reply_ok()
                .reply_ok()
                .reply(&system),
        );

        let handle = client.system_handle("foo").unwrap();
        assert_eq!(handle.as_str(), "system::7");

        let eth0 = Interface::new("eth0")
            .with_mac("aa:bb:cc:dd:ee:ff")
            .with_static_ip("10.0.0.5");
        client.create_interface(&handle, &eth0).unwrap();
        client.delete_interface(&handle, "eth1").unwrap();
        let interfaces = client.get_interfaces(&handle).unwrap();

        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces["eth0"].ip_address, "10.0.0.5");
        assert!(interfaces["eth0"].is_static);

        assert_eq!(
            client.transport.methods(),
            vec![
                "login",
                "get_system_handle",
                "modify_system",
                "save_system",
                "modify_system",
                "save_system",
                "get_system",
            ]
        );
        let requests = client.transport.requests();
        assert!(requests[2].contains("<string>modify_interface</string>"));
        assert!(requests[2].contains("<name>macaddress-eth0</name>"));
        assert!(requests[4].contains("<string>delete_interface</string>"));
        assert!(requests[4].contains("<string>eth1</string>"));
    }

    #[test]
    fn test_unknown_handle_is_rejected() {
        let client = client(ScriptedTransport::new());
        let err = client
            .get_interfaces(&SystemHandle::new("system::99"))
            .unwrap_err();
        assert!(matches!(err, ClientError::Call(ref m) if m.contains("system::99")));
    }

    #[test]
    fn test_network_errors_are_retried() {
        let script = ScriptedTransport::new()
            .reply_string("tok")
            .fail(Error::Network {
                message: "connection reset".into(),
            })
            .reply_ok();
        let mut client = Client::with_transport(
            script,
            RetryConfig::new(2, Duration::from_millis(1), 1.0),
        );
        client.login("cobbler", "secret").unwrap();

        client.sync().unwrap();
        assert_eq!(client.transport.methods(), vec!["login", "sync", "sync"]);
    }

    #[test]
    fn test_faults_are_not_retried() {
        let script = ScriptedTransport::new()
            .reply_string("tok")
            .fault("sync failed: dhcpd.conf");
        let mut client = Client::with_transport(
            script,
            RetryConfig::new(3, Duration::from_millis(1), 1.0),
        );
        client.login("cobbler", "secret").unwrap();

        assert!(client.sync().is_err());
        assert_eq!(client.transport.methods(), vec!["login", "sync"]);
    }
}
