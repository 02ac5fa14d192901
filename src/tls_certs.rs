//! Throwaway certificates for HTTPS endpoints in tests.
//!
//! [`TestCertificates`] generates a root CA and a server certificate signed by it. Hand
//! [`TestCertificates::certificate_handle`] to an HTTPS [`RestMock`](crate::RestMock) and add
//! [`TestCertificates::root_cert_der`] to the trust store of your HTTP client.
use std::{
    convert::TryInto,
    fmt::Display,
    net::IpAddr,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, IsCa, KeyPair,
    KeyUsagePurpose, SanType, SerialNumber, SignatureAlgorithm, PKCS_ECDSA_P256_SHA256,
};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::CertificateHandle;

pub const DEFAULT_ALGORITHM: &SignatureAlgorithm = &PKCS_ECDSA_P256_SHA256;

const ISSUER_KEY_USAGES: &[KeyUsagePurpose; 3] = &[
    KeyUsagePurpose::CrlSign,
    KeyUsagePurpose::KeyCertSign,
    KeyUsagePurpose::DigitalSignature,
];

const SERVER_KEY_USAGES: &[KeyUsagePurpose; 2] = &[
    KeyUsagePurpose::DigitalSignature,
    KeyUsagePurpose::KeyEncipherment,
];

static SERIAL_NUMBER: AtomicU64 = AtomicU64::new(1);

/// A root CA certificate and a server certificate signed by it.
pub struct TestCertificates {
    root_cert: Certificate,
    server_cert: Certificate,
    server_keypair: KeyPair,
}

impl TestCertificates {
    /// Generate certificates valid for "localhost" and "127.0.0.1".
    pub fn random() -> Self {
        Self::random_with_hostnames(default_hostnames())
    }

    /// Generate certificates valid for custom hostnames and IPs.
    pub fn random_with_hostnames(hostnames: impl Into<Vec<SanType>>) -> Self {
        let (root_cert, root_keypair) = gen_root_cert(DEFAULT_ALGORITHM);
        // No intermediate certificate: CAs only use them for flexibility.
        let (server_cert, server_keypair) = gen_server_cert(
            &root_cert,
            &root_keypair,
            DEFAULT_ALGORITHM,
            hostnames.into(),
        );

        Self {
            root_cert,
            server_cert,
            server_keypair,
        }
    }

    /// The root CA certificate, in DER format. Clients must trust it.
    pub fn root_cert_der(&self) -> &CertificateDer<'static> {
        self.root_cert.der()
    }

    pub fn root_cert_pem(&self) -> String {
        self.root_cert.pem()
    }

    /// The server certificate chain and key, ready to be bound to an HTTPS endpoint.
    pub fn certificate_handle(&self) -> CertificateHandle {
        let key: PrivateKeyDer<'static> = self
            .server_keypair
            .serialize_der()
            .try_into()
            .expect("Failed to deserialize a serialized key");
        CertificateHandle::new(vec![self.server_cert.der().clone()], key)
    }
}

// The methods are not const, so we use a function.
fn default_hostnames() -> Vec<SanType> {
    vec![
        SanType::DnsName(
            "localhost"
                .to_string()
                .try_into()
                .expect("`localhost` is a valid DNS name"),
        ),
        SanType::IpAddress(IpAddr::from_str("127.0.0.1").expect("A valid IP address")),
    ]
}

fn gen_root_cert(alg: &'static SignatureAlgorithm) -> (Certificate, KeyPair) {
    let keypair = KeyPair::generate_for(alg).expect("Failed to generate the root CA keypair");
    let serial = SERIAL_NUMBER.fetch_add(1, Ordering::SeqCst);

    let mut params = CertificateParams::default();
    params.distinguished_name = common_name(format!("Test-only temporary root CA #{serial}"));
    params.serial_number = Some(SerialNumber::from_slice(&serial.to_be_bytes()[..]));
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = ISSUER_KEY_USAGES.to_vec();

    let cert = params
        .self_signed(&keypair)
        .expect("Failed to self-sign the root CA certificate");
    (cert, keypair)
}

fn gen_server_cert(
    signer_cert: &Certificate,
    signer_keypair: &KeyPair,
    alg: &'static SignatureAlgorithm,
    hostnames: Vec<SanType>,
) -> (Certificate, KeyPair) {
    let keypair = KeyPair::generate_for(alg).expect("Failed to generate the server keypair");
    let serial = SERIAL_NUMBER.fetch_add(1, Ordering::SeqCst);

    let mut params = CertificateParams::default();
    params.distinguished_name = common_name(format!("Test-only temporary server #{serial}"));
    params.use_authority_key_identifier_extension = true;
    params.serial_number = Some(SerialNumber::from_slice(&serial.to_be_bytes()[..]));
    params.is_ca = IsCa::NoCa;
    params.key_usages = SERVER_KEY_USAGES.to_vec();
    params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ServerAuth];
    params.subject_alt_names = hostnames;

    let cert = params
        .signed_by(&keypair, signer_cert, signer_keypair)
        .expect("Failed to sign the server certificate");
    (cert, keypair)
}

fn common_name(name: impl Display) -> DistinguishedName {
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(rcgen::DnType::CommonName, name.to_string());
    distinguished_name
}
