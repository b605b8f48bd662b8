//! Integration tests for volume identity resolution.

mod common;

use common::{device_line, CountingControlPlane, Node};
use ondat_metrics_exporter::collectors::{CollectorError, ScrapeCycle};
use ondat_metrics_exporter::volumes::{IdentityResolver, Volume};
use std::sync::Arc;

#[tokio::test]
async fn test_local_state_wins() {
    let node = Node::new();
    node.write_state("aaaa", "local-pvc", "team-a");
    let api = Arc::new(CountingControlPlane::with_claims(&[("aaaa", "remote-pvc", "team-b")]));
    let claims = node.claims(api.clone());

    let mut vol = Volume::new(8, 16, "aaaa");
    let state_dir = node.state_dir();
    let mut resolver = IdentityResolver::new(&state_dir, &claims);
    resolver.resolve(&mut vol).await;

    assert_eq!(vol.claim_name, "local-pvc");
    assert_eq!(vol.claim_namespace, "team-a");
    assert!(!resolver.used_control_plane());
    assert_eq!(api.logins(), 0);
}

#[tokio::test]
async fn test_control_plane_is_queried_once_per_cycle() {
    let node = Node::new();
    let api = Arc::new(CountingControlPlane::with_claims(&[
        ("aaaa", "pvc-a", "team-a"),
        ("bbbb", "pvc-b", "team-b"),
    ]));
    let claims = node.claims(api.clone());

    let mut volumes = vec![
        Volume::new(8, 16, "aaaa"),
        Volume::new(8, 32, "bbbb"),
        Volume::new(8, 48, "cccc"),
    ];
    let state_dir = node.state_dir();
    let mut resolver = IdentityResolver::new(&state_dir, &claims);
    resolver.resolve_all(&mut volumes).await;
    // resolving again in the same cycle reuses the index
    resolver.resolve_all(&mut volumes).await;

    assert_eq!(api.logins(), 1);
    assert_eq!(api.namespace_listings(), 1);
    assert_eq!(volumes[0].claim_name, "pvc-a");
    assert_eq!(volumes[1].claim_namespace, "team-b");
    assert!(!volumes[2].is_resolved());
}

#[tokio::test]
async fn test_failed_fallback_is_not_retried_in_cycle() {
    let node = Node::new();
    let api = Arc::new(CountingControlPlane::failing());
    let claims = node.claims(api.clone());

    let mut volumes = vec![Volume::new(8, 16, "aaaa"), Volume::new(8, 32, "bbbb")];
    let state_dir = node.state_dir();
    let mut resolver = IdentityResolver::new(&state_dir, &claims);
    resolver.resolve_all(&mut volumes).await;

    assert_eq!(api.logins(), 1);
    assert_eq!(api.namespace_listings(), 0);
    assert!(volumes.iter().all(|v| !v.is_resolved()));
}

#[tokio::test]
async fn test_corrupt_state_does_not_fall_back() {
    let node = Node::new();
    node.write("state/v.aaaa", "{broken");
    let api = Arc::new(CountingControlPlane::with_claims(&[("aaaa", "pvc-a", "team-a")]));
    let claims = node.claims(api.clone());

    let mut vol = Volume::new(8, 16, "aaaa");
    let state_dir = node.state_dir();
    let mut resolver = IdentityResolver::new(&state_dir, &claims);
    resolver.resolve(&mut vol).await;

    assert!(!vol.is_resolved());
    assert_eq!(api.logins(), 0);
}

#[tokio::test]
async fn test_scrape_cycle_resolves_once() {
    let node = Node::new();
    let api = Arc::new(CountingControlPlane::with_claims(&[("aaaa", "pvc-a", "team-a")]));
    let discovery = node.discovery(&device_line(8, 16, "aaaa"), api.clone());

    let cycle = ScrapeCycle::new(Some(discovery.clone()));
    let (first, second) = tokio::join!(cycle.volumes(), cycle.volumes());
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first, second);
    assert_eq!(first[0].claim_name, "pvc-a");
    assert_eq!(api.logins(), 1);
    assert_eq!(api.namespace_listings(), 1);

    // a new scrape starts a new cycle
    let next = ScrapeCycle::new(Some(discovery));
    next.volumes().await.unwrap();
    assert_eq!(api.namespace_listings(), 2);
}

#[tokio::test]
async fn test_failed_discovery_is_shared_by_the_cycle() {
    let node = Node::new();
    std::fs::remove_dir(node.volumes_dir()).unwrap();
    let discovery = node.discovery(
        &device_line(8, 16, "aaaa"),
        Arc::new(CountingControlPlane::default()),
    );

    let cycle = ScrapeCycle::new(Some(discovery));
    let first = cycle.volumes().await.unwrap_err();
    let second = cycle.volumes().await.unwrap_err();
    match (first, second) {
        (CollectorError::Volumes(a), CollectorError::Volumes(b)) => assert!(Arc::ptr_eq(&a, &b)),
        other => panic!("unexpected errors: {:?}", other),
    }
}

#[tokio::test]
async fn test_discovery_requires_volumes_dir() {
    let node = Node::new();
    std::fs::remove_dir(node.volumes_dir()).unwrap();
    let api = Arc::new(CountingControlPlane::default());
    let discovery = node.discovery(&device_line(8, 16, "aaaa"), api);

    assert!(discovery.discover().await.is_err());
}
