//! TLS and mutual TLS handshakes against the default HTTP handler.

use std::net::SocketAddr;
use std::sync::Arc;

use chaincode_harness::config::ServerConfig;
use chaincode_harness::handler::{Handler, RunningListener};
use chaincode_harness::http::{ContractInfo, HttpHandler};
use chaincode_harness::net::tls::TlsBundle;

mod common;

struct Pem {
    cert: String,
    key: String,
}

fn self_signed(name: &str) -> Pem {
    let rcgen::CertifiedKey { cert, signing_key } =
        rcgen::generate_simple_self_signed(vec![name.to_string()]).unwrap();
    Pem {
        cert: cert.pem(),
        key: signing_key.serialize_pem(),
    }
}

fn bundle(server: &Pem, client_ca: Option<&Pem>) -> TlsBundle {
    TlsBundle {
        enabled: true,
        key_bytes: server.key.clone().into_bytes(),
        cert_bytes: server.cert.clone().into_bytes(),
        client_ca_cert_bytes: client_ca.map(|ca| ca.cert.clone().into_bytes()),
    }
}

async fn start(tls: &TlsBundle) -> RunningListener {
    let handler = HttpHandler::new(
        ServerConfig {
            service_id: "nft:1a2b".into(),
            network_address: "127.0.0.1:0".into(),
        },
        ContractInfo::erc721(),
    );
    handler.start("127.0.0.1:0", tls).await.unwrap()
}

fn client(trusted: &Pem, identity: Option<&Pem>, addr: SocketAddr) -> reqwest::Client {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut trusted.cert.as_bytes()) {
        roots.add(cert.unwrap()).unwrap();
    }

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots);
    let config = match identity {
        Some(pem) => {
            let chain = rustls_pemfile::certs(&mut pem.cert.as_bytes())
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            let key = rustls_pemfile::private_key(&mut pem.key.as_bytes())
                .unwrap()
                .unwrap();
            builder.with_client_auth_cert(chain, key).unwrap()
        }
        None => builder.with_no_client_auth(),
    };

    reqwest::Client::builder()
        .use_preconfigured_tls(config)
        .resolve("localhost", addr)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_tls_handshake() {
    let server = self_signed("localhost");
    let mut listener = start(&bundle(&server, None)).await;
    let addr = listener.local_addr().unwrap();
    let url = format!("https://localhost:{}/healthz", addr.port());

    let response = client(&server, None, addr).get(&url).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    // Plain HTTP is not served on a TLS listener.
    let plain = common::http_client()
        .get(format!("http://{addr}/healthz"))
        .send()
        .await;
    assert!(plain.map(|r| !r.status().is_success()).unwrap_or(true));

    listener.stop();
    listener.wait().await.unwrap();
}

#[tokio::test]
async fn test_untrusted_server_is_rejected() {
    let server = self_signed("localhost");
    let other = self_signed("localhost");
    let mut listener = start(&bundle(&server, None)).await;
    let addr = listener.local_addr().unwrap();
    let url = format!("https://localhost:{}/healthz", addr.port());

    assert!(client(&other, None, addr).get(&url).send().await.is_err());

    listener.stop();
    listener.wait().await.unwrap();
}

#[tokio::test]
async fn test_mutual_tls_requires_client_certificate() {
    let server = self_signed("localhost");
    let peer = self_signed("peer");
    let mut listener = start(&bundle(&server, Some(&peer))).await;
    let addr = listener.local_addr().unwrap();
    let url = format!("https://localhost:{}/metadata", addr.port());

    let anonymous = client(&server, None, addr).get(&url).send().await;
    assert!(anonymous.is_err());

    let stranger = self_signed("stranger");
    let rejected = client(&server, Some(&stranger), addr).get(&url).send().await;
    assert!(rejected.is_err());

    let response = client(&server, Some(&peer), addr).get(&url).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["service_id"], "nft:1a2b");

    listener.stop();
    listener.wait().await.unwrap();
}
