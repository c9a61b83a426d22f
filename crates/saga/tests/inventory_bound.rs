//! Property test: concurrent checkouts and returns conserve an item's copies.
//! After every round `available + active == total_copies`, and no committed
//! version of the item ever leaves `0..=total_copies`.

use std::sync::Arc;
use std::time::Duration;

use common::{AggregateId, MemberId};
use domain::ItemEvent;
use event_store::{EventStoreExt, InMemoryEventStore};
use projections::InMemoryReadModels;
use proptest::prelude::*;
use saga::{
    CirculationSaga, Deadline, InMemoryMembership, InventoryCapability, LocalInventory, SagaConfig,
};
use tokio::task::JoinSet;

type Inventory = Arc<LocalInventory<InMemoryEventStore, InMemoryReadModels>>;

#[derive(Debug, Clone, Copy)]
enum Op {
    Checkout(usize),
    Return(usize),
}

fn op(members: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..members).prop_map(Op::Checkout),
        (0..members).prop_map(Op::Return),
    ]
}

/// Rounds of operations; the operations inside a round run concurrently.
fn rounds() -> impl Strategy<Value = Vec<Vec<Op>>> {
    prop::collection::vec(prop::collection::vec(op(4), 1..6), 1..6)
}

/// Copy counts seen after one round settled.
#[derive(Debug)]
struct Round {
    available: u32,
    total: u32,
    active: u32,
    compensation_failures: usize,
}

/// `(new_total, new_available)` of every committed version of the item.
async fn committed_counts(store: &InMemoryEventStore, item_id: AggregateId) -> Vec<(u32, u32)> {
    store
        .load_all(item_id)
        .await
        .unwrap()
        .iter()
        .map(|envelope| match envelope.decode::<ItemEvent>().unwrap() {
            ItemEvent::ItemAdded(data) => (data.total_copies, data.total_copies),
            ItemEvent::ItemCopiesUpdated(data) => (data.new_total, data.new_available),
            ItemEvent::ItemRetired(_) => panic!("item retired during the run"),
        })
        .collect()
}

async fn run_rounds(total_copies: u32, rounds: Vec<Vec<Op>>) -> (Vec<Round>, Vec<(u32, u32)>) {
    let store = InMemoryEventStore::new();
    let rows = InMemoryReadModels::new();
    let inventory: Inventory = Arc::new(LocalInventory::new(store.clone(), rows.clone()));
    let membership = InMemoryMembership::new();
    let item_id = inventory
        .catalog()
        .add("978-0", "Solaris", "Lem", total_copies)
        .await
        .unwrap();

    let mut members: Vec<MemberId> = Vec::new();
    for _ in 0..4 {
        members.push(membership.register_active().await);
    }

    let saga = Arc::new(CirculationSaga::new(
        store.clone(),
        rows.clone(),
        inventory.clone(),
        membership,
        SagaConfig::default(),
    ));

    let mut settled = Vec::new();
    let mut compensation_failures = 0;
    for round in rounds {
        let mut tasks = JoinSet::new();
        for op in round {
            let saga = saga.clone();
            let deadline = Deadline::after(Duration::from_secs(5));
            let members = members.clone();
            // Rejections are expected; only failed compensations matter.
            tasks.spawn(async move {
                let report = match op {
                    Op::Checkout(m) => {
                        saga.checkout_with_report(members[m], item_id, deadline)
                            .await
                    }
                    Op::Return(m) => saga.return_with_report(members[m], item_id, deadline).await,
                };
                report.compensation_failures()
            });
        }
        while let Some(joined) = tasks.join_next().await {
            compensation_failures += joined.unwrap();
        }

        let item = inventory.get_item(item_id).await.unwrap();
        let active = rows
            .checkouts_for_item(item_id)
            .await
            .iter()
            .filter(|r| r.is_active())
            .count();
        settled.push(Round {
            available: item.available,
            total: item.total_copies,
            active: u32::try_from(active).unwrap(),
            compensation_failures,
        });
    }

    (settled, committed_counts(&store, item_id).await)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn copies_are_conserved(total_copies in 1u32..4, rounds in rounds()) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        let (settled, committed) = runtime.block_on(run_rounds(total_copies, rounds));

        for (total, available) in committed {
            prop_assert_eq!(total, total_copies);
            prop_assert!(available <= total);
        }
        for round in settled {
            prop_assert_eq!(round.total, total_copies);
            prop_assert!(round.available <= round.total);
            // A compensation that gave up is left for reconciliation.
            if round.compensation_failures == 0 {
                prop_assert_eq!(round.available + round.active, round.total, "{:?}", round);
            }
        }
    }
}
