//! Add Orchestrator Integration Tests
//!
//! Drives `add` end to end against the in-memory cluster: allocation,
//! metadata, root detection and replication verification.
//!
//! Run with: cargo test --test add_test

mod common;

use ccs_core::{AddedEntry, PeerPinStatus, Pin, PinState, META_ORG, META_SIZE};
use ccs_engine::{add, AddOptions, AddOutcome, AddResult};
use common::*;
use std::fs;
use tempfile::TempDir;

fn entry(name: &str, cid: &str, size: u64) -> AddedEntry {
    AddedEntry {
        name: name.to_string(),
        cid: cid.to_string(),
        size,
    }
}

fn pin_with(cid: &str, statuses: &[(&str, PinState)]) -> Pin {
    let mut pin = Pin {
        cid: cid.to_string(),
        allocations: ids(&[NAS, CHLL]),
        ..Default::default()
    };
    for (id, state) in statuses {
        let mut status = PeerPinStatus::new(*id, *state);
        if state.is_error() {
            status = status.with_error("disk quota exceeded");
        }
        pin.peer_map.insert(id.to_string(), status);
    }
    pin
}

/// Three-file directory: 10 + 20 + 30 bytes
fn three_file_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("survey");
    fs::create_dir_all(root.join("raw")).unwrap();
    fs::write(root.join("a.csv"), vec![b'a'; 10]).unwrap();
    fs::write(root.join("b.csv"), vec![b'b'; 20]).unwrap();
    fs::write(root.join("raw").join("c.bin"), vec![b'c'; 30]).unwrap();
    dir
}

async fn run_add(cluster: &FakeCluster, options: &AddOptions) -> AddResult {
    add(|host| cluster.connect(host), &test_policy(), options).await
}

#[tokio::test]
async fn test_directory_add_fully_replicated() {
    let dir = three_file_dir();
    let path = dir.path().join("survey");

    let cluster = FakeCluster::new()
        .with_add_response(vec![
            entry("survey/a.csv", "QmA", 10),
            entry("survey/b.csv", "QmB", 20),
            entry("survey/raw/c.bin", "QmC", 30),
            entry("survey", "QmDIR", 60),
        ])
        .with_pins(vec![pin_with(
            "QmDIR",
            &[
                (NAS, PinState::Pinned),
                (CHLL, PinState::Pinned),
                (MEER, PinState::Pinned),
                (PIHOST, PinState::Pinned),
            ],
        )]);

    let result = run_add(&cluster, &AddOptions::new(&path, "hrdag")).await;

    assert_eq!(result.outcome, AddOutcome::Success);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.root_cid, "QmDIR");
    assert_eq!(result.replica_count, Some(4));
    assert!(result.error.is_none());
    assert!(result.note.is_none());
    assert_eq!(result.allocations, ids(&[NAS, CHLL]));
    assert_eq!(result.cluster_host, "nas.local");

    // Sent to the profile's primary with metadata and explicit allocations
    assert_eq!(cluster.connected(), vec!["nas.local"]);
    let requests = cluster.add_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].allocations, ids(&[NAS, CHLL]));
    assert!(requests[0].local);
    assert_eq!(requests[0].name, "survey");
    assert_eq!(requests[0].metadata.get(META_ORG).map(String::as_str), Some("hrdag"));
    assert_eq!(requests[0].metadata.get(META_SIZE).map(String::as_str), Some("60"));

    // The walked files are what gets uploaded; the size tag is their total
    let names: Vec<_> = requests[0].files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["survey/a.csv", "survey/b.csv", "survey/raw/c.bin"]);

    println!("Directory add: OK");
}

#[tokio::test]
async fn test_root_is_last_entry() {
    let dir = three_file_dir();
    let cluster = FakeCluster::new()
        .with_add_response(vec![
            entry("a.csv", "QmA", 10),
            entry("b.csv", "QmB", 20),
            entry("root", "QmROOT", 30),
        ])
        .with_pins(vec![pin_with(
            "QmROOT",
            &[(NAS, PinState::Pinned), (CHLL, PinState::Pinned), (MEER, PinState::Pinned)],
        )]);

    let result = run_add(&cluster, &AddOptions::new(dir.path(), "hrdag")).await;

    assert_eq!(result.root_cid, "QmROOT");
    assert!(result.root_entry().unwrap().is_root);
    let children = result.child_entries();
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|e| !e.is_root && e.cid != "QmROOT"));
    assert_eq!(result.total_size(), 30);

    // Exactly the desired minimum: success with a note
    assert_eq!(result.outcome, AddOutcome::Success);
    assert_eq!(result.replica_count, Some(3));
    assert!(result.note.is_some());
}

#[tokio::test]
async fn test_only_primary_and_backup_is_partial() {
    let dir = three_file_dir();
    let cluster = FakeCluster::new()
        .with_add_response(vec![entry("survey", "QmDIR", 60)])
        .with_pins(vec![pin_with(
            "QmDIR",
            &[(NAS, PinState::Pinned), (CHLL, PinState::Pinned)],
        )]);

    let result = run_add(&cluster, &AddOptions::new(dir.path(), "hrdag")).await;

    assert_eq!(result.outcome, AddOutcome::Partial);
    assert_eq!(result.exit_code(), 1);
    assert_eq!(result.replica_count, Some(2));
    assert!(result.error.as_deref().unwrap().contains("below the desired minimum"));
}

#[tokio::test]
async fn test_pending_backup_is_partial() {
    let dir = three_file_dir();
    let cluster = FakeCluster::new()
        .with_add_response(vec![entry("survey", "QmDIR", 60)])
        .with_pins(vec![pin_with(
            "QmDIR",
            &[(NAS, PinState::Pinned), (CHLL, PinState::Pinning)],
        )]);

    let result = run_add(&cluster, &AddOptions::new(dir.path(), "hrdag")).await;

    assert_eq!(result.outcome, AddOutcome::Partial);
    assert_eq!(result.replica_count, None);
    let error = result.error.unwrap();
    assert!(error.contains("pending"));
    assert!(error.contains("chll"));
    assert!(!error.contains("nas"));
}

#[tokio::test]
async fn test_primary_error_fails() {
    let dir = three_file_dir();
    let cluster = FakeCluster::new()
        .with_add_response(vec![entry("survey", "QmDIR", 60)])
        .with_pins(vec![pin_with(
            "QmDIR",
            &[(NAS, PinState::PinError), (CHLL, PinState::Pinned)],
        )]);

    let result = run_add(&cluster, &AddOptions::new(dir.path(), "hrdag")).await;

    assert_eq!(result.outcome, AddOutcome::Failed);
    assert_eq!(result.replica_count, Some(0));
    assert!(result.error.unwrap().contains("disk quota exceeded"));
}

#[tokio::test]
async fn test_unverifiable_replication_is_partial() {
    let dir = three_file_dir();
    let cluster = FakeCluster::new()
        .with_add_response(vec![entry("survey", "QmDIR", 60)])
        .fail_pin_status();

    let result = run_add(&cluster, &AddOptions::new(dir.path(), "hrdag")).await;

    assert_eq!(result.outcome, AddOutcome::Partial);
    assert_eq!(result.root_cid, "QmDIR");
    assert!(result.error.unwrap().contains("could not be verified"));
}

#[tokio::test]
async fn test_empty_response_fails() {
    let dir = three_file_dir();
    let cluster = FakeCluster::new();

    let result = run_add(&cluster, &AddOptions::new(dir.path(), "hrdag")).await;

    assert_eq!(result.outcome, AddOutcome::Failed);
    assert!(result.entries.is_empty());
    assert!(result.error.unwrap().contains("No entries returned"));
}

#[tokio::test]
async fn test_missing_path_fails_before_allocation() {
    let cluster = FakeCluster::new();
    let result = run_add(&cluster, &AddOptions::new("/nonexistent/ccs/path", "hrdag")).await;

    assert_eq!(result.outcome, AddOutcome::Failed);
    assert!(result.allocations.is_empty());
    assert!(result.error.unwrap().starts_with("Path not found"));
    assert!(cluster.connected().is_empty());
}

#[tokio::test]
async fn test_non_recursive_directory_fails_before_upload() {
    let dir = three_file_dir();
    let cluster = FakeCluster::new();

    let mut options = AddOptions::new(dir.path().join("survey"), "hrdag");
    options.recursive = false;
    let result = run_add(&cluster, &options).await;

    assert_eq!(result.outcome, AddOutcome::Failed);
    assert!(result.error.as_deref().unwrap().contains("recursively"));
    assert!(cluster.connected().is_empty());
    assert!(cluster.add_requests().is_empty());

    println!("Non-recursive directory: OK");
}

#[tokio::test]
async fn test_unknown_profile_is_config_error() {
    let dir = three_file_dir();
    let cluster = FakeCluster::new();
    let result = run_add(&cluster, &AddOptions::new(dir.path(), "nobody")).await;

    assert_eq!(result.outcome, AddOutcome::ConfigError);
    assert_eq!(result.exit_code(), 3);
    assert!(cluster.add_requests().is_empty());
}

#[tokio::test]
async fn test_host_override() {
    let dir = three_file_dir();
    let cluster = FakeCluster::new().with_add_response(vec![entry("survey", "QmDIR", 60)]);
    let options = AddOptions::new(dir.path(), "hrdag").with_host(Some("pihost".to_string()));

    let result = run_add(&cluster, &options).await;

    assert_eq!(cluster.connected(), vec!["pihost.local"]);
    assert_eq!(result.cluster_host, "pihost.local");
}
