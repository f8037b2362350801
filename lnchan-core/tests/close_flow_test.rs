use std::time::Duration;

use lnchan::balance::Side;
use lnchan::channel::{ChannelPhase, ChannelState};
use lnchan::config::EngineConfig;
use lnchan::events::ChannelEvent;
use lnchan::follower::ChainFollower;
use lnchan::registry::RegistryMonitor;
use lnchan::util::test_utils::*;
use lnchan::Arc;

use tokio::sync::broadcast::Receiver;
use tokio::time::timeout;

async fn wait_for_set_change(events: &mut Receiver<ChannelEvent>) {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out")
            .expect("event channel");
        if event == ChannelEvent::ChannelSetChanged {
            return;
        }
    }
}

// Fund, use, cooperatively close and forget a channel, with the follower
// doing the chain work in the background
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cooperative_lifecycle_test() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = EngineConfig { follower_interval_ms: 10, ..Default::default() };
    let (registry, chain, peer) = make_registry(config);
    let id = make_channel_id(1);
    let chan = ChannelBuilder::new(1).capacity_sat(300).local_msat(200_000).build();
    let funding = chan.setup.funding_outpoint.txid;
    registry.add(chan).unwrap();
    chain.add_to_mempool(funding);

    let mut events = registry.subscribe();
    let (trigger, listener) = triggered::trigger();
    let follower = ChainFollower::start(ChainFollower::new(Arc::clone(&registry)), listener);

    chain.mine_blocks(3);
    loop {
        let event = timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        if event == ChannelEvent::ChannelUpdated(id) && registry.get_state(&id).unwrap() == "OPEN"
        {
            break;
        }
    }

    registry.add_htlc(&id, Side::Local, make_htlc(0, 5_000)).unwrap();
    assert_eq!(registry.available_to_spend(&id, Side::Local), Ok(195_000));
    assert_eq!(registry.pending_in_favor(&id, Side::Remote), Ok(5_000));
    assert!(registry.close(&id).is_err());
    registry.settle_htlc(&id, Side::Local, 0).unwrap();

    let txid = registry.close(&id).unwrap().outcome().await.unwrap();
    assert_eq!(peer.negotiations(), 1);
    let closing = chain.broadcasts().into_iter().find(|tx| tx.compute_txid() == txid).unwrap();
    let values: Vec<u64> = closing.output.iter().map(|o| o.value.to_sat()).collect();
    assert_eq!(values, vec![195, 105]);

    chain.mine_blocks(6);
    wait_for_set_change(&mut events).await;
    assert!(registry.is_empty());
    assert_eq!(registry.channel_balance().closed_count, 0);

    trigger.trigger();
    follower.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_forces_close_test() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = EngineConfig { auto_prune: false, ..Default::default() };
    let (registry, chain, _) = make_registry(config);
    let id = make_channel_id(2);
    registry.add(ChannelBuilder::new(2).open().build()).unwrap();

    let handle = registry.fail_channel(&id, "peer sent bad revocation").unwrap().unwrap();
    let txid = handle.outcome().await.unwrap();
    let info = &registry.list_info()[0];
    assert_eq!(info.phase, ChannelPhase::ClosingForce);
    assert_eq!(info.timelock_remaining, Some(144));

    chain.mine_blocks(6);
    assert_eq!(registry.sync_chain().await, 1);
    assert_eq!(
        registry.read_channel(&id, |c| c.state().clone()).unwrap(),
        ChannelState::Closed { txid, cooperative: false }
    );
    // an error on a closed channel is only logged
    assert!(registry.fail_channel(&id, "late").unwrap().is_none());
    registry.remove(&id).unwrap();
}
