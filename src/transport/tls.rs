use crate::config::TlsOptions;
use crate::error::{MqttError, Result};
use crate::transport::{TcpConfig, Transport, TransportReader, TransportWriter};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{client::TlsStream, TlsConnector};

/// Accepts any server certificate while still checking handshake signatures
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// TLS transport configuration
#[derive(Debug)]
pub struct TlsConfig {
    pub tcp: TcpConfig,
    /// Name presented for SNI and checked against the server certificate
    pub server_name: String,
    pub client_cert: Option<Vec<CertificateDer<'static>>>,
    pub client_key: Option<PrivateKeyDer<'static>>,
    pub root_certs: Vec<CertificateDer<'static>>,
    pub use_system_roots: bool,
    pub verify_server_cert: bool,
}

impl TlsConfig {
    #[must_use]
    pub fn new(tcp: TcpConfig) -> Self {
        let server_name = tcp.host.clone();
        Self {
            tcp,
            server_name,
            client_cert: None,
            client_key: None,
            root_certs: Vec::new(),
            use_system_roots: true,
            verify_server_cert: true,
        }
    }

    /// Builds a configuration and loads the PEM files named in `options`
    ///
    /// # Errors
    ///
    /// Returns `Tls` if a file cannot be read or holds no usable PEM item
    pub fn from_options(tcp: TcpConfig, options: &TlsOptions) -> Result<Self> {
        let mut config = Self::new(tcp)
            .with_system_roots(options.use_system_roots)
            .with_verify_server_cert(!options.insecure_skip_verify);

        if let Some(ca) = &options.ca_cert {
            config.root_certs = load_certs(ca)?;
        }
        if let (Some(cert), Some(key)) = (&options.client_cert, &options.client_key) {
            config.client_cert = Some(load_certs(cert)?);
            config.client_key = Some(load_private_key(key)?);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_system_roots(mut self, use_system: bool) -> Self {
        self.use_system_roots = use_system;
        self
    }

    #[must_use]
    pub fn with_verify_server_cert(mut self, verify: bool) -> Self {
        self.verify_server_cert = verify;
        self
    }

    #[must_use]
    pub fn with_root_certs(mut self, certs: Vec<CertificateDer<'static>>) -> Self {
        self.root_certs = certs;
        self
    }

    fn build_client_config(&mut self) -> Result<ClientConfig> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| MqttError::Tls(format!("Unsupported protocol versions: {e}")))?;

        let builder = if self.verify_server_cert {
            let mut root_store = RootCertStore::empty();
            if self.use_system_roots {
                root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
            for cert in self.root_certs.drain(..) {
                root_store
                    .add(cert)
                    .map_err(|e| MqttError::Tls(format!("Failed to add root cert: {e}")))?;
            }
            if root_store.is_empty() {
                return Err(MqttError::Tls(
                    "No trusted root certificates configured".to_string(),
                ));
            }
            builder.with_root_certificates(root_store)
        } else {
            tracing::warn!(server = %self.server_name, "TLS certificate verification disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
        };

        match (self.client_cert.take(), self.client_key.take()) {
            (Some(cert), Some(key)) => builder
                .with_client_auth_cert(cert, key)
                .map_err(|e| MqttError::Tls(format!("Failed to configure client auth: {e}"))),
            _ => Ok(builder.with_no_client_auth()),
        }
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = std::fs::read(path)
        .map_err(|e| MqttError::Tls(format!("Failed to read {}: {e}", path.display())))?;
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| MqttError::Tls(format!("Invalid PEM in {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(MqttError::Tls(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem = std::fs::read(path)
        .map_err(|e| MqttError::Tls(format!("Failed to read {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| MqttError::Tls(format!("Invalid PEM in {}: {e}", path.display())))?
        .ok_or_else(|| MqttError::Tls(format!("No private key found in {}", path.display())))
}

/// TLS over TCP transport
#[derive(Debug)]
pub struct TlsTransport {
    config: TlsConfig,
    stream: Option<TlsStream<TcpStream>>,
}

impl TlsTransport {
    #[must_use]
    pub fn new(config: TlsConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Transport for TlsTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(MqttError::AlreadyConnected);
        }

        let connector = TlsConnector::from(Arc::new(self.config.build_client_config()?));
        let domain = ServerName::try_from(self.config.server_name.clone())
            .map_err(|_| MqttError::Tls(format!("Invalid server name: {}", self.config.server_name)))?;

        let tcp_stream = self.config.tcp.open().await?;
        let tls_stream = timeout(
            self.config.tcp.connect_timeout,
            connector.connect(domain, tcp_stream),
        )
        .await
        .map_err(|_| MqttError::Timeout)?
        .map_err(|e| MqttError::Tls(format!("TLS handshake failed: {e}")))?;

        tracing::debug!(server = %self.config.server_name, "TLS handshake complete");
        self.stream = Some(tls_stream);
        Ok(())
    }

    fn into_split(self) -> Result<(TransportReader, TransportWriter)> {
        let stream = self.stream.ok_or(MqttError::NotConnected)?;
        let (reader, writer) = tokio::io::split(stream);
        Ok((Box::new(reader), Box::new(writer)))
    }
}
