//! Performance benchmarks for certificate verification.
//!
//! Measures Common Name extraction and policy evaluation over peer chains.

use std::net::SocketAddr;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::CertificateDer;

use authenticator_core::auth::{
    CertificateAuthenticator, CommonNameAuthenticator, ConnectionContext, TlsConnectionState,
};

fn cert_with_cn(cn: &str) -> CertificateDer<'static> {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params.self_signed(&key).unwrap().der().clone()
}

fn chain(len: usize) -> Vec<CertificateDer<'static>> {
    (0..len).map(|i| cert_with_cn(&format!("svc-{i}-dev"))).collect()
}

/// Benchmark Common Name extraction from a peer chain.
fn bench_common_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("common_names");

    for len in [1, 3, 8] {
        let certs = chain(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("chain", len), &certs, |b, certs| {
            b.iter(|| black_box(TlsConnectionState::new(certs).common_names()));
        });
    }

    group.finish();
}

/// Benchmark a full verification that scans every certificate and pattern.
fn bench_verify_certificate(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_certificate");
    let addr: SocketAddr = "127.0.0.1:3306".parse().unwrap();
    let conn = ConnectionContext::new(addr, "bench");
    let certs = chain(3);

    let exact = CommonNameAuthenticator::with_common_name("svc-2-prod");
    group.bench_function("exact_miss", |b| {
        b.iter(|| {
            black_box(
                exact
                    .verify_certificate(&conn, &TlsConnectionState::new(&certs))
                    .unwrap(),
            )
        });
    });

    for pattern_count in [1, 10, 50] {
        let patterns: Vec<String> = (0..pattern_count)
            .map(|i| format!("^svc-{i}-prod$"))
            .collect();
        let authenticator = CommonNameAuthenticator::with_common_name_patterns(&patterns).unwrap();

        group.bench_with_input(
            BenchmarkId::new("patterns_miss", pattern_count),
            &authenticator,
            |b, authenticator| {
                b.iter(|| {
                    black_box(
                        authenticator
                            .verify_certificate(&conn, &TlsConnectionState::new(&certs))
                            .unwrap(),
                    )
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_common_names, bench_verify_certificate);
criterion_main!(benches);
