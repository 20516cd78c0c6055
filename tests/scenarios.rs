use std::sync::Arc;

use propagation_sim::{observer::Record, prelude::*};

fn two_nodes(log: Arc<EventLog>) -> Simulation {
    SimulationBuilder::new()
        .add_node("x", Region::Europe, 0.5)
        .add_node("y", Region::Europe, 0.5)
        .fully_connected()
        .difficulty(0.0)
        .delay_model(ConstantDelay(1.0))
        .observer(log)
        .seed(1)
        .build()
        .unwrap()
}

fn seeded_config(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed: Some(seed),
        difficulty: 0.02,
        workload: Workload {
            arrival_probability: 0.05,
            min_fee: 1,
            max_fee: 100,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn mined_block_reaches_peer() {
    let log = Arc::new(EventLog::new());
    let mut sim = two_nodes(log.clone());
    let (x, y) = (NodeId::from(1), NodeId::from(2));

    let block = sim.node_mut(x).unwrap().mine_block(0);
    sim.flush(x).unwrap();

    // inv at 1, getdata at 2, block at 3
    sim.run(4);

    let receiver = sim.node(y).unwrap();
    assert_eq!(receiver.ledger().height(), 1);
    assert_eq!(receiver.ledger().choose_best_head().id, block.id);
    assert_eq!(receiver.stats().blocks[&block.id], 3);
    assert!(receiver
        .ledger()
        .heads()
        .iter()
        .all(|head| head.id != BlockId::GENESIS));

    let received = log.filter(|r| {
        r.node == y
            && matches!(
                r.event,
                Event::BlockReceived { duplicate: false, .. }
            )
    });
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].tick, 3);

    // y's announcement back to x is the last message in flight.
    assert_eq!(sim.in_flight(), 1);
    sim.step();
    assert_eq!(sim.in_flight(), 0);
    assert!(sim.converged());
}

#[test]
fn request_for_placeholder_goes_unanswered() {
    let log = Arc::new(EventLog::new());
    let mut y = Node::new(
        NodeId::from(2),
        "y",
        Region::Europe,
        0.0,
        ProtocolParams::default(),
        Box::new(ConstantDelay(1.0)),
        0,
    )
    .with_observer(log.clone());
    y.connect(1.into(), Region::Europe);
    y.connect(3.into(), Region::Europe);

    let item = Inventory::Block(BlockId::new(1.into(), 1));
    let inv = Envelope::new(1.into(), Message::Inventory(item));
    let out = y.step(0, vec![inv]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].envelope.message, Message::DataRequest(item));

    let request = Envelope::new(3.into(), Message::DataRequest(item));
    let out = y.step(1, vec![request]);

    assert!(out.is_empty());
    assert_eq!(
        log.records().last(),
        Some(&Record {
            tick: 1,
            node: 2.into(),
            event: Event::UnanswerableRequest { from: 3.into(), item },
        })
    );
}

#[test]
fn mempool_pops_by_feerate() {
    let mut pool = Mempool::new();
    for (id, feerate) in [5, 3, 8, 1].into_iter().enumerate() {
        let tx = Transaction::new(TxId(id as u64), 400, feerate * 400, 0, 0)
            .unwrap();
        pool.add(Arc::new(tx));
    }

    let popped: Vec<_> = pool
        .assemble(1_000_000, Block::HEADER_SIZE)
        .iter()
        .map(|tx| tx.fee / tx.size)
        .collect();

    assert_eq!(popped, vec![8, 5, 3, 1]);
    assert!(pool.is_empty());
}

#[test]
fn network_agrees_once_mining_stops() {
    let config = seeded_config(42);
    let mut sim = config.builder().unwrap().build().unwrap();

    config.workload.drive(&mut sim, 2_000, 42).unwrap();
    sim.set_difficulty(0.0).unwrap();
    for _ in 0..1_000 {
        if sim.in_flight() == 0 {
            break;
        }
        sim.step();
    }

    assert_eq!(sim.in_flight(), 0);

    let first = &sim.nodes()[0];
    assert!(first.ledger().height() > 0);
    for node in sim.nodes() {
        assert_eq!(node.ledger().height(), first.ledger().height());
        assert_eq!(node.ledger().num_blocks(), first.ledger().num_blocks());
        assert_eq!(node.ledger().pending().count(), 0);
        for block in first.ledger().known_blocks() {
            assert!(node.ledger().get(block.id).is_some());
        }
    }
}

#[test]
fn runs_with_same_seed_are_identical() {
    let run = || {
        let config = seeded_config(7);
        let mut sim = config.builder().unwrap().build().unwrap();
        config.workload.drive(&mut sim, 500, 7).unwrap();

        sim.snapshot()
    };

    assert_eq!(run(), run());
}

#[test]
fn snapshot_restores_through_json() {
    let config = seeded_config(3);
    let mut sim = config.builder().unwrap().build().unwrap();
    config.workload.drive(&mut sim, 300, 3).unwrap();

    let snapshot = sim.snapshot();
    let json = snapshot.to_json().unwrap();
    let parsed = SimulationSnapshot::from_json(&json).unwrap();
    assert_eq!(parsed, snapshot);

    let mut restored = config
        .builder()
        .unwrap()
        .from_snapshot(parsed)
        .build()
        .unwrap();

    assert_eq!(restored.tick(), 300);
    assert_eq!(restored.snapshot(), snapshot);
    for (a, b) in restored.nodes().iter().zip(sim.nodes()) {
        assert_eq!(a.power(), b.power());
        assert!(a.peers().eq(b.peers()));
    }

    restored.run(10);
    assert_eq!(restored.tick(), 310);
}

#[test]
fn transactions_after_resume_get_fresh_ids() {
    let config = seeded_config(5);
    let mut sim = config.builder().unwrap().build().unwrap();
    config.workload.drive(&mut sim, 200, 5).unwrap();
    let seen = sim.snapshot().next_tx_id();
    assert!(seen > 0);

    // Snapshots written before the counter was saved still resume safely.
    let mut snapshot = sim.snapshot();
    snapshot.next_tx = 0;

    let mut restored = config
        .builder()
        .unwrap()
        .from_snapshot(snapshot)
        .build()
        .unwrap();
    let origin = NodeId::from(1);
    let id = restored.submit_transaction(origin, 777, 4_242, 0).unwrap();
    assert!(id.0 >= seen);

    restored.step();
    let tx = restored.nodes()[0].mempool().get(id).unwrap();
    assert_eq!((tx.size, tx.fee), (777, 4_242));
    assert_eq!(restored.snapshot().next_tx, id.0 + 1);
}

#[test]
fn zero_size_transaction_in_snapshot_rejected() {
    let config = seeded_config(3);
    let mut sim = config.builder().unwrap().build().unwrap();
    sim.submit_transaction(NodeId::from(2), 250, 10, 0).unwrap();
    sim.step();

    let json = sim.snapshot().to_json().unwrap();
    assert!(SimulationSnapshot::from_json(&json).is_ok());

    let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let mempool = &mut value["nodes"][1]["mempool"];
    let list = if mempool["queued"].get(0).is_some() {
        "queued"
    } else {
        "included"
    };
    mempool[list][0]["size"] = 0.into();

    let err = SimulationSnapshot::from_json(&value.to_string()).unwrap_err();
    assert!(err.to_string().contains("size of 0 bytes"));
}

#[test]
fn snapshot_must_match_network() {
    let config = seeded_config(3);
    let sim = config.builder().unwrap().build().unwrap();

    let mut snapshot = sim.snapshot();
    snapshot.nodes.pop();

    assert!(matches!(
        config.builder().unwrap().from_snapshot(snapshot).build(),
        Err(SimulationBuildError::SnapshotMismatch(3, 4))
    ));
}
