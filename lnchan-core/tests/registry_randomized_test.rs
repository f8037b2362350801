// Drive a registry from several threads with queues of random operations
use std::sync::{Arc, Mutex};
use std::thread;

use lnchan::balance::{CommitmentView, Side};
use lnchan::channel::{ChannelId, ChannelPhase};
use lnchan::config::EngineConfig;
use lnchan::error::ChannelError;
use lnchan::registry::{Registry, RegistryMonitor};
use lnchan::services::EngineServices;
use lnchan::util::loopback::{LoopbackChain, LoopbackPeer};
use lnchan::util::test_utils::{make_channel_id, make_htlc, ChannelBuilder};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Number of operations per thread
const OPS_PER_THREAD: usize = 200;
// Number of threads
const THREAD_COUNT: usize = 4;
// Channels 1..=CHANNEL_COUNT
const CHANNEL_COUNT: u8 = 6;
// Use a fixed seed for reproducibility
const SEED: u64 = 12345;
// Channel reserves, 1% and 0.5% of the capacity
const LOCAL_RESERVE_MSAT: u64 = 10_000_000;
const REMOTE_RESERVE_MSAT: u64 = 5_000_000;

#[derive(Clone, Debug)]
enum Operation {
    AddHtlc(u8, bool, u64),
    CommitHtlc(u8, bool),
    SettleHtlc(u8, bool),
    FailHtlc(u8, bool),
    Close(u8),
    ForceClose(u8),
    ListInfo,
    Balance,
}

struct TestState {
    next_htlc_id: Mutex<u64>,
    // (channel, offerer is local, htlc id)
    htlcs: Mutex<Vec<(u8, bool, u64)>>,
}

impl TestState {
    fn new() -> Self {
        TestState { next_htlc_id: Mutex::new(0), htlcs: Mutex::new(Vec::new()) }
    }

    fn next_id(&self) -> u64 {
        let mut id = self.next_htlc_id.lock().unwrap();
        *id += 1;
        *id
    }

    fn take_htlc(&self, chan: u8, local: bool) -> Option<u64> {
        let mut htlcs = self.htlcs.lock().unwrap();
        let pos = htlcs.iter().position(|(c, l, _)| *c == chan && *l == local)?;
        Some(htlcs.remove(pos).2)
    }

    fn peek_htlc(&self, chan: u8, local: bool) -> Option<u64> {
        let htlcs = self.htlcs.lock().unwrap();
        htlcs.iter().find(|(c, l, _)| *c == chan && *l == local).map(|h| h.2)
    }
}

fn side(local: bool) -> Side {
    if local {
        Side::Local
    } else {
        Side::Remote
    }
}

fn perform_operation(
    registry: &Registry,
    state: &TestState,
    op: &Operation,
) -> Result<(), ChannelError> {
    let id = |n: u8| -> ChannelId { make_channel_id(n) };
    match op {
        Operation::AddHtlc(n, local, amount) => {
            let htlc_id = state.next_id();
            registry.add_htlc(&id(*n), side(*local), make_htlc(htlc_id, *amount))?;
            state.htlcs.lock().unwrap().push((*n, *local, htlc_id));
        }
        Operation::CommitHtlc(n, local) => {
            if let Some(htlc_id) = state.peek_htlc(*n, *local) {
                let view = if *local { CommitmentView::Holder } else { CommitmentView::Counterparty };
                registry.commit_htlc(&id(*n), side(*local), htlc_id, view)?;
            }
        }
        Operation::SettleHtlc(n, local) => {
            if let Some(htlc_id) = state.take_htlc(*n, *local) {
                registry.settle_htlc(&id(*n), side(*local), htlc_id)?;
            }
        }
        Operation::FailHtlc(n, local) => {
            if let Some(htlc_id) = state.take_htlc(*n, *local) {
                registry.fail_htlc(&id(*n), side(*local), htlc_id)?;
            }
        }
        Operation::Close(n) => {
            registry.close(&id(*n))?;
        }
        Operation::ForceClose(n) => {
            registry.force_close(&id(*n))?;
        }
        Operation::ListInfo => {
            for info in registry.list_info() {
                if let (Some(local), Some(remote)) = (info.local, info.remote) {
                    assert_eq!(local.balance_msat + remote.balance_msat, info.capacity_msat);
                    for (side, reserve) in
                        [(local, LOCAL_RESERVE_MSAT), (remote, REMOTE_RESERVE_MSAT)]
                    {
                        assert!(side.balance_msat >= reserve, "{:?} below reserve", info);
                        if let Some(available) = side.available_msat {
                            assert!(available <= side.balance_msat - reserve, "{:?}", info);
                        }
                    }
                }
            }
        }
        Operation::Balance => {
            let _ = registry.channel_balance();
        }
    }
    Ok(())
}

#[test]
fn test_registry_with_random_operations() {
    let _ = env_logger::builder().is_test(true).try_init();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let chain = Arc::new(LoopbackChain::new());
    let peer = Arc::new(LoopbackPeer::new());
    let services = EngineServices { chain: chain.clone(), peer };
    let registry =
        Arc::new(Registry::new(EngineConfig::default(), services, runtime.handle().clone()));
    for n in 1..=CHANNEL_COUNT {
        let chan = ChannelBuilder::new(n)
            .capacity_sat(1_000_000)
            .local_msat(600_000_000)
            .reserves(LOCAL_RESERVE_MSAT, REMOTE_RESERVE_MSAT)
            .open();
        registry.add(chan.build()).unwrap();
    }

    let mut rng = StdRng::seed_from_u64(SEED);
    let thread_operations: Vec<Vec<Operation>> = (0..THREAD_COUNT)
        .map(|_| {
            (0..OPS_PER_THREAD)
                .map(|_| {
                    let n = rng.gen_range(1..=CHANNEL_COUNT);
                    let local = rng.gen_bool(0.5);
                    match rng.gen_range(0..40) {
                        0..=11 => Operation::AddHtlc(n, local, rng.gen_range(1..50_000_000)),
                        12..=17 => Operation::CommitHtlc(n, local),
                        18..=25 => Operation::SettleHtlc(n, local),
                        26..=31 => Operation::FailHtlc(n, local),
                        32 => Operation::Close(n),
                        33 => Operation::ForceClose(n),
                        34..=36 => Operation::ListInfo,
                        _ => Operation::Balance,
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let state = Arc::new(TestState::new());
    let handles: Vec<_> = thread_operations
        .into_iter()
        .map(|ops| {
            let registry = Arc::clone(&registry);
            let state = Arc::clone(&state);
            thread::spawn(move || {
                let mut failures = 0;
                for op in &ops {
                    if let Err(e) = perform_operation(&registry, &state, op) {
                        // racing operations can legitimately fail, broken
                        // accounting cannot
                        assert!(!e.is_fatal(), "{:?} failed with {:?}", op, e);
                        failures += 1;
                    }
                }
                failures
            })
        })
        .collect();
    for handle in handles {
        let failures = handle.join().expect("thread panicked");
        assert!(failures <= OPS_PER_THREAD);
    }

    let mut phases = Vec::new();
    for slot in registry.list() {
        let chan = slot.lock().unwrap();
        chan.check_invariants().unwrap();
        assert!(chan.ledgers().local.balance_msat >= LOCAL_RESERVE_MSAT);
        assert!(chan.ledgers().remote.balance_msat >= REMOTE_RESERVE_MSAT);
        phases.push(chan.state().phase());
    }
    assert_eq!(phases.len(), CHANNEL_COUNT as usize);
    assert!(phases.iter().all(|p| *p != ChannelPhase::FundingPending));
    drop(runtime);
}
