use servicemock::tls_certs::TestCertificates;
use servicemock::{
    ActivationError, CertificateHandle, CertificateNotFoundError, RestMock, ServiceMock, Times,
};

fn client_trusting(certificates: &TestCertificates) -> reqwest::Client {
    let root = reqwest::Certificate::from_der(certificates.root_cert_der())
        .expect("Failed to parse the root certificate");
    reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(root)
        .build()
        .expect("Failed to build HTTP client")
}

#[async_std::test]
async fn https_endpoints_serve_with_the_given_certificate() {
    // Arrange
    let certificates = TestCertificates::random();
    let mut host = ServiceMock::new();
    let id = host
        .register(RestMock::https(0, certificates.certificate_handle()))
        .unwrap();
    host.rest_mock_mut(id)
        .unwrap()
        .setup_get("/alive", &[])
        .unwrap()
        .returns_text("Running");
    host.activate().unwrap();
    let endpoint = host.rest_mock(id);

    // Act
    let response = client_trusting(&certificates)
        .get(format!("{}/alive", endpoint.uri()))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(
        endpoint.uri(),
        format!("https://127.0.0.1:{}", endpoint.address().port())
    );
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "Running");
    endpoint.verify_get("/alive", &[], Times::once()).unwrap();
}

#[async_std::test]
async fn untrusted_clients_fail_the_handshake() {
    // Arrange
    let certificates = TestCertificates::random();
    let mut host = ServiceMock::new();
    let id = host
        .register(RestMock::https(0, certificates.certificate_handle()))
        .unwrap();
    host.activate().unwrap();

    // Act
    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .build()
        .expect("Failed to build HTTP client");
    let result = client.get(host.rest_mock(id).uri()).send().await;

    // Assert
    result.expect_err("Expected request to fail due to an untrusted TLS certificate");
    assert!(host.rest_mock(id).received_requests().is_empty());
}

#[async_std::test]
async fn invalid_certificates_fail_activation() {
    // Arrange
    let certificates = TestCertificates::random();
    let leaf = certificates.certificate_handle().chain()[0].to_vec();
    let plain_port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut host = ServiceMock::new();
    host.register(RestMock::http(plain_port)).unwrap();
    host.register(RestMock::https(
        0,
        CertificateHandle::from_der(leaf, b"not a key".to_vec()),
    ))
    .unwrap();

    // Act
    let error = host.activate().unwrap_err();

    // Assert
    assert!(matches!(error, ActivationError::CertificateBinding { .. }));
    // The plain endpoint was not left listening.
    assert!(std::net::TcpListener::bind(("127.0.0.1", plain_port)).is_ok());
}

#[async_std::test]
async fn certificates_can_be_loaded_from_pem() {
    // Arrange
    let certificates = TestCertificates::random();

    // Act
    let root_only = CertificateHandle::from_pem(certificates.root_cert_pem().as_bytes(), b"");

    // Assert
    assert!(root_only.is_err());
}

#[async_std::test]
async fn selectors_are_resolved_at_activation() {
    // Arrange
    let certificates = TestCertificates::random();
    let handle = certificates.certificate_handle();
    let mut host = ServiceMock::builder()
        .certificate_resolver(move |selector: &str| {
            if selector == "3a9f0c" {
                Ok(handle.clone())
            } else {
                Err(CertificateNotFoundError::new(selector))
            }
        })
        .build();
    let id = host.register(RestMock::https(0, "3a9f0c")).unwrap();
    host.activate().unwrap();

    // Act
    let response = client_trusting(&certificates)
        .get(host.rest_mock(id).uri())
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), 404);
}

#[async_std::test]
async fn unknown_selectors_fail_activation() {
    // Arrange
    let mut host = ServiceMock::builder()
        .certificate_resolver(
            |selector: &str| -> Result<CertificateHandle, CertificateNotFoundError> {
                Err(CertificateNotFoundError::new(selector))
            },
        )
        .build();
    host.register(RestMock::https(0, "missing")).unwrap();

    // Act
    let error = host.activate().unwrap_err();

    // Assert
    assert!(matches!(
        error,
        ActivationError::CertificateNotFound { ref source, .. } if source.selector == "missing"
    ));
}
