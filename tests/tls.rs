mod common;

use common::{next_event, FakeBroker, TEST_TOPIC};
use mqtt_session::{MqttError, Packet, Session, SessionConfig, SessionEvent, TlsOptions};
use rcgen::{BasicConstraints, Certificate, CertificateParams, IsCa, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_rustls::TlsAcceptor;

struct TestCa {
    cert: Certificate,
    key: KeyPair,
}

impl TestCa {
    fn generate(name: &str) -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, name);
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    /// Writes the CA certificate as PEM and returns its path
    fn write_pem(&self, dir: &TempDir, file: &str) -> PathBuf {
        let path = dir.path().join(file);
        std::fs::write(&path, self.cert.pem()).unwrap();
        path
    }

    /// Server certificate for the loopback address, signed by this CA
    fn acceptor(&self) -> TlsAcceptor {
        let params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
                .unwrap();
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();

        let chain: Vec<CertificateDer<'static>> = vec![cert.der().clone()];
        let private_key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(chain, private_key)
            .unwrap();
        TlsAcceptor::from(Arc::new(config))
    }
}

fn tls_config(broker: &FakeBroker, tls: TlsOptions) -> SessionConfig {
    SessionConfig::new("127.0.0.1", broker.addr.port(), TEST_TOPIC, "gateway", "s3cret")
        .with_tls(true)
        .with_tls_options(tls)
        .with_connect_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_tls_connect_subscribe_and_publish() {
    let dir = TempDir::new().unwrap();
    let ca = TestCa::generate("mqtt-session test CA");
    let mut broker = FakeBroker::with_tls(ca.acceptor()).await;

    let config = tls_config(
        &broker,
        TlsOptions {
            ca_cert: Some(ca.write_pem(&dir, "ca.pem")),
            use_system_roots: false,
            ..TlsOptions::default()
        },
    );
    let session = Session::new(config).unwrap();
    let mut events = session.events();

    session.connect().await.unwrap();
    assert!(session.is_connected());
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);
    broker.skip_handshake().await;

    session.publish("21.5").await.unwrap();
    match broker.next_packet().await {
        Packet::Publish(publish) => {
            assert_eq!(publish.topic_name, TEST_TOPIC);
            assert_eq!(publish.payload, b"21.5");
        }
        other => panic!("Expected PUBLISH, got {other:?}"),
    }

    session.disconnect().await.unwrap();
    loop {
        if matches!(broker.next_packet().await, Packet::Disconnect) {
            break;
        }
    }
}

#[tokio::test]
async fn test_tls_untrusted_ca_fails() {
    let dir = TempDir::new().unwrap();
    let server_ca = TestCa::generate("server CA");
    let other_ca = TestCa::generate("unrelated CA");
    let mut broker = FakeBroker::with_tls(server_ca.acceptor()).await;

    let config = tls_config(
        &broker,
        TlsOptions {
            ca_cert: Some(other_ca.write_pem(&dir, "other.pem")),
            use_system_roots: false,
            ..TlsOptions::default()
        },
    );
    let session = Session::new(config).unwrap();

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, MqttError::ConnectionFailed(_)));
    assert!(
        matches!(err.cause(), Some(MqttError::Tls(_) | MqttError::Io(_))),
        "unexpected cause: {err:?}"
    );
    assert!(!session.is_connected());
    broker.assert_no_packet(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_tls_insecure_skips_verification() {
    let ca = TestCa::generate("self-managed CA");
    let mut broker = FakeBroker::with_tls(ca.acceptor()).await;

    let config = tls_config(
        &broker,
        TlsOptions {
            use_system_roots: false,
            insecure_skip_verify: true,
            ..TlsOptions::default()
        },
    );
    let session = Session::connect_with(config).await.unwrap();

    assert!(session.is_connected());
    broker.skip_handshake().await;
}
