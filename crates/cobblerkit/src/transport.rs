//! Transport abstraction for XML-RPC requests.
//!
//! The [`Transport`] trait carries one request body to the server and
//! returns the response body, so the client can be driven by canned
//! responses in tests.

use crate::error::{Error, Result};
use ureq::tls::{Certificate, RootCerts, TlsConfig};

/// Sends an encoded XML-RPC request and returns the raw response.
pub trait Transport: Send + Sync {
    fn post(&self, body: &str) -> Result<String>;
}

/// TLS settings for [`HttpTransport`]
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Skip certificate verification
    pub insecure: bool,
    /// PEM-encoded CA certificate to trust instead of the system roots
    pub ca_cert_pem: Option<String>,
}

/// XML-RPC over HTTP(S), using a blocking `ureq` agent.
pub struct HttpTransport {
    agent: ureq::Agent,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, tls: &TlsOptions) -> Result<Self> {
        let mut config = TlsConfig::builder();
        if tls.insecure {
            log::warn!("TLS certificate verification is disabled");
            config = config.disable_verification(true);
        }
        if let Some(pem) = &tls.ca_cert_pem {
            let cert = Certificate::from_pem(pem.as_bytes()).map_err(|e| Error::Tls {
                message: format!("cannot parse CA certificate: {e}"),
            })?;
            config = config.root_certs(RootCerts::new_with_certs(&[cert]));
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .tls_config(config.build())
            .build()
            .into();

        Ok(Self {
            agent,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn post(&self, body: &str) -> Result<String> {
        let text = self
            .agent
            .post(&self.url)
            .header("Content-Type", "text/xml")
            .header("User-Agent", "cobblerkit-rs")
            .send(body)?
            .body_mut()
            .read_to_string()?;
        Ok(text)
    }
}
