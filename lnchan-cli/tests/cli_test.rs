use std::path::Path;

use lnchan::balance::Side;
use lnchan::channel::ChannelPhase;
use lnchan::config::EngineConfig;
use lnchan::graph::ChannelGraph;
use lnchan::util::test_utils::*;
use lnchan_cli::commands::{run, Commands, DEFAULT_LOCAL_AMOUNT_SAT};
use lnchan_cli::snapshot::{Snapshot, SNAPSHOT_FILE};

async fn run_to_string(command: Commands, path: &Path) -> String {
    let mut out = Vec::new();
    run(&command, EngineConfig::default(), path, &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

fn write_snapshot(path: &Path) {
    let mut busy = ChannelBuilder::new(1).capacity_sat(300).local_msat(200_000).open().build();
    busy.add_htlc(Side::Local, make_htlc(0, 5_000)).unwrap();
    let graph = ChannelGraph::new();
    for n in 10..13 {
        graph.upsert_node(make_node_info(n, 100));
    }
    graph.upsert_channel(make_graph_channel(1, 10, 11, 100));
    // already a peer
    graph.upsert_node(make_node_info(2, 100));
    Snapshot {
        channels: vec![
            busy,
            ChannelBuilder::new(2).capacity_sat(500).open().build(),
            ChannelBuilder::new(3).build(),
        ],
        graph: graph.to_snapshot(),
    }
    .save(path)
    .unwrap();
}

#[tokio::test]
async fn list_and_status_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(SNAPSHOT_FILE);
    write_snapshot(&path);

    let out = run_to_string(Commands::List { json: false }, &path).await;
    let rows: Vec<&str> = out.lines().collect();
    assert_eq!(rows.len(), 3);
    let busy = rows.iter().find(|r| r.starts_with(&make_channel_id(1).to_string())).unwrap();
    assert!(busy.contains("195"));
    assert!(busy.contains("100 (+5)"));
    assert!(busy.ends_with("OPEN"));
    let pending = rows.iter().find(|r| r.starts_with(&make_channel_id(3).to_string())).unwrap();
    assert!(pending.ends_with("FUNDING_PENDING"));

    let out = run_to_string(Commands::List { json: true }, &path).await;
    let infos: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(infos.as_array().unwrap().len(), 3);

    let out = run_to_string(Commands::Status, &path).await;
    assert_eq!(out.trim(), "3 peers, 4 nodes, 1 channels");

    let out = run_to_string(Commands::Suggest, &path).await;
    let suggested = out.trim().to_string();
    let candidates: Vec<String> = (10..13).map(|n| make_node_id(n).to_string()).collect();
    assert!(candidates.contains(&suggested), "unexpected suggestion {}", suggested);
}

#[tokio::test]
async fn empty_installation_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(SNAPSHOT_FILE);
    assert_eq!(run_to_string(Commands::List { json: false }, &path).await, "");
    assert_eq!(run_to_string(Commands::Status, &path).await.trim(), "0 peers, 0 nodes, 0 channels");
    assert_eq!(run_to_string(Commands::Suggest, &path).await.trim(), "no suggestion");
    // read only commands do not create the snapshot
    assert!(!path.exists());
}

#[tokio::test]
async fn close_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(SNAPSHOT_FILE);
    write_snapshot(&path);

    // pending htlc
    let out = run_to_string(Commands::Close { channel_id: make_channel_id(1) }, &path).await;
    assert!(out.starts_with("InvalidTransition:"), "{}", out);
    let out = run_to_string(Commands::Close { channel_id: make_channel_id(9) }, &path).await;
    assert!(out.starts_with("NotFound:"), "{}", out);

    let out = run_to_string(Commands::Close { channel_id: make_channel_id(2) }, &path).await;
    assert_eq!(out.trim().len(), 64, "{}", out);
    let out = run_to_string(Commands::ForceClose { channel_id: make_channel_id(3) }, &path).await;
    assert_eq!(out.trim().len(), 64, "{}", out);

    let snapshot = Snapshot::load(&path).unwrap();
    let phase = |n: u8| {
        let chan = snapshot.channels.iter().find(|c| c.id == make_channel_id(n)).unwrap();
        chan.state().phase()
    };
    assert_eq!(phase(1), ChannelPhase::Open);
    assert_eq!(phase(2), ChannelPhase::ClosingCooperative);
    assert_eq!(phase(3), ChannelPhase::ClosingForce);

    let out = run_to_string(Commands::List { json: false }, &path).await;
    assert!(out.contains("CLOSING_COOPERATIVE (0/6 conf)"), "{}", out);
}

#[tokio::test]
async fn open_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(SNAPSHOT_FILE);
    write_snapshot(&path);

    let open = |node: Option<String>, local_amount: u64, push_amount: u64| Commands::Open {
        node,
        local_amount,
        push_amount,
    };
    let out = run_to_string(open(None, 300, 301), &path).await;
    assert!(out.starts_with("InsufficientBalance:"), "{}", out);
    assert_eq!(Snapshot::load(&path).unwrap().channels.len(), 3);

    let mut out = Vec::new();
    let bad = open(Some("zz@localhost:9735".to_string()), 300, 0);
    assert!(run(&bad, EngineConfig::default(), &path, &mut out).await.is_err());

    // no node id: a graph node we have no channel with
    let out = run_to_string(open(None, DEFAULT_LOCAL_AMOUNT_SAT, 50_000), &path).await;
    assert_eq!(out.trim().len(), 64, "{}", out);
    let snapshot = Snapshot::load(&path).unwrap();
    assert_eq!(snapshot.channels.len(), 4);
    let chan = snapshot.channels.iter().find(|c| c.id.to_string() == out.trim()).unwrap();
    assert!((10..13).any(|n| make_node_id(n) == chan.node_id));
    assert_eq!(chan.state().phase(), ChannelPhase::FundingPending);
    assert_eq!(chan.capacity_msat(), 200_000_000);
    assert_eq!(chan.ledgers().local.balance_msat, 150_000_000);
    assert_eq!(chan.ledgers().remote.balance_msat, 50_000_000);
    assert_eq!(chan.ledgers().local.reserve_msat, 2_000_000);

    let node = format!("{}@127.0.0.1:9735", make_node_id(2));
    let first = run_to_string(open(Some(node.clone()), 1_000, 0), &path).await;
    assert_eq!(first.trim().len(), 64, "{}", first);
    // same peer and amount in a later run gets a fresh funding outpoint
    let second = run_to_string(open(Some(node), 1_000, 0), &path).await;
    assert_eq!(second.trim().len(), 64, "{}", second);
    assert_ne!(first, second);
    assert_eq!(Snapshot::load(&path).unwrap().channels.len(), 6);
    let out = run_to_string(Commands::Status, &path).await;
    assert_eq!(out.trim(), "4 peers, 4 nodes, 1 channels");
}

#[tokio::test]
async fn open_without_graph_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(SNAPSHOT_FILE);
    let command = Commands::Open { node: None, local_amount: 1_000, push_amount: 0 };
    assert_eq!(run_to_string(command, &path).await.trim(), "no suggestion");
    assert!(!path.exists());
}
