//! Spendable-output selection: spend tracking, double-spend poisoning,
//! and the unconfirmed-change filter.

use super::*;
use crate::unix_now;
use featherbit_primitives::OutputInfo;

fn outpoint(tx: &Transaction, vout: u32) -> OutPoint {
    OutPoint {
        txid: tx.compute_txid(),
        vout,
    }
}

#[test]
fn test_single_unspent_output() {
    let db = db();
    let x = address(1);
    let a = TxBuilder::new()
        .input(dummy_outpoint(0))
        .output(100, &x)
        .build();
    db.insert(a.clone());

    let utxos = db.get_utxos(&address_set(&[&x]), false);
    assert_eq!(
        utxos,
        vec![OutputInfo {
            outpoint: outpoint(&a, 0),
            value: Amount::from_sat(100),
        }]
    );
}

#[test]
fn test_spent_output_excluded() {
    let db = db();
    let x = address(1);
    let y = address(2);
    let a = TxBuilder::new()
        .input(dummy_outpoint(0))
        .output(100, &x)
        .build();
    let b = TxBuilder::new()
        .input(outpoint(&a, 0))
        .output(90, &y)
        .build();
    db.insert(a);
    db.insert(b.clone());

    let utxos = db.get_utxos(&address_set(&[&x, &y]), false);
    assert_eq!(
        utxos,
        vec![OutputInfo {
            outpoint: outpoint(&b, 0),
            value: Amount::from_sat(90),
        }]
    );
}

#[test]
fn test_double_spend_poisons_descendants() {
    let db = db();
    let x = address(1);
    let y = address(2);
    let z = address(3);
    let a = TxBuilder::new()
        .input(dummy_outpoint(0))
        .output(100, &x)
        .build();
    let b = TxBuilder::new()
        .input(outpoint(&a, 0))
        .output(90, &y)
        .build();
    let c = TxBuilder::new()
        .input_with_sig(outpoint(&a, 0), vec![0x51])
        .output(80, &z)
        .build();
    let b_txid = b.compute_txid();
    db.insert(a.clone());
    db.insert(b.clone());
    db.insert(c);

    // Both sides of the conflict are unsafe while unconfirmed.
    assert!(db.get_utxos(&address_set(&[&z]), false).is_empty());
    assert!(db.get_utxos(&address_set(&[&y]), false).is_empty());

    // Confirmation settles the conflict in favor of the confirmed side.
    db.confirmed(b_txid, 100);
    let utxos = db.get_utxos(&address_set(&[&y]), false);
    assert_eq!(
        utxos,
        vec![OutputInfo {
            outpoint: outpoint(&b, 0),
            value: Amount::from_sat(90),
        }]
    );
    assert!(db.get_utxos(&address_set(&[&z]), false).is_empty());
}

#[test]
fn test_filter_rejects_unconfirmed_receive() {
    let db = db();
    let x = address(1);
    let foreign = address(9);
    let funding = TxBuilder::new()
        .input(dummy_outpoint(0))
        .output(60, &foreign)
        .build();
    let receive = TxBuilder::new()
        .input(outpoint(&funding, 0))
        .output(50, &x)
        .build();
    db.insert(funding);
    db.insert(receive.clone());

    let wallet = address_set(&[&x]);
    assert!(db.get_utxos(&wallet, true).is_empty());
    assert_eq!(
        db.get_utxos(&wallet, false),
        vec![OutputInfo {
            outpoint: outpoint(&receive, 0),
            value: Amount::from_sat(50),
        }]
    );
}

#[test]
fn test_filter_keeps_unconfirmed_change() {
    let db = db();
    let x = address(1);
    let funding = TxBuilder::new()
        .input(dummy_outpoint(0))
        .output(100, &x)
        .build();
    let spend = TxBuilder::new()
        .input(outpoint(&funding, 0))
        .output(40, &x)
        .build();
    db.insert(funding);
    db.insert(spend.clone());

    // Every input of the unconfirmed spend is ours: change survives the
    // filter.
    let utxos = db.get_utxos(&address_set(&[&x]), true);
    assert_eq!(
        utxos,
        vec![OutputInfo {
            outpoint: outpoint(&spend, 0),
            value: Amount::from_sat(40),
        }]
    );
}

#[test]
fn test_filter_rejects_unresolvable_inputs() {
    let db = db();
    let x = address(1);
    // The funding transaction is not in the store, so the input cannot
    // be shown to be ours.
    let orphan = TxBuilder::new()
        .input(dummy_outpoint(7))
        .output(50, &x)
        .build();
    db.insert(orphan.clone());

    let wallet = address_set(&[&x]);
    assert!(db.get_utxos(&wallet, true).is_empty());
    assert_eq!(db.get_utxos(&wallet, false).len(), 1);

    // Confirmed rows skip the change filter entirely.
    db.confirmed(orphan.compute_txid(), 100);
    assert_eq!(db.get_utxos(&wallet, true).len(), 1);
}

#[test]
fn test_foreign_outputs_excluded() {
    let db = db();
    let x = address(1);
    let other = address(2);
    let tx = TxBuilder::new()
        .input(dummy_outpoint(0))
        .output(100, &x)
        .output(200, &other)
        .build();
    db.insert(tx.clone());

    let utxos = db.get_utxos(&address_set(&[&x]), false);
    assert_eq!(
        utxos,
        vec![OutputInfo {
            outpoint: outpoint(&tx, 0),
            value: Amount::from_sat(100),
        }]
    );
}

#[test]
fn test_unconfirmed_ancestor_chain_is_safe() {
    let db = db();
    let x = address(1);
    let a = TxBuilder::new()
        .input(dummy_outpoint(0))
        .output(100, &x)
        .build();
    let b = TxBuilder::new()
        .input(outpoint(&a, 0))
        .output(90, &x)
        .build();
    let c = TxBuilder::new()
        .input(outpoint(&b, 0))
        .output(80, &x)
        .build();
    db.insert(a);
    db.insert(b);
    db.insert(c.clone());

    let utxos = db.get_utxos(&address_set(&[&x]), false);
    assert_eq!(
        utxos,
        vec![OutputInfo {
            outpoint: outpoint(&c, 0),
            value: Amount::from_sat(80),
        }]
    );
}

#[test]
fn test_crafted_cycle_terminates() {
    let db = db();
    let x = address(1);
    let key1 = Txid::from_byte_array([1; 32]);
    let key2 = Txid::from_byte_array([2; 32]);
    // Two rows keyed to spend each other, something only a hand-crafted
    // blob can produce. The walk must terminate, with the in-progress
    // entries reading as safe.
    let tx1 = TxBuilder::new()
        .input(OutPoint {
            txid: key2,
            vout: 1,
        })
        .output(100, &x)
        .build();
    let tx2 = TxBuilder::new()
        .input(OutPoint {
            txid: key1,
            vout: 1,
        })
        .output(200, &x)
        .build();
    {
        let mut inner = db.inner.write();
        for (key, tx) in [(key1, tx1), (key2, tx2)] {
            let ntxid = compute_ntxid(&tx);
            inner.rows.insert(
                key,
                TxRow {
                    tx,
                    txid: key,
                    ntxid,
                    state: TxState::Unconfirmed,
                    block_height: 0,
                    timestamp: unix_now(),
                    need_check: false,
                    malleated: false,
                    master_confirm: false,
                },
            );
        }
    }

    let mut utxos = db.get_utxos(&address_set(&[&x]), false);
    utxos.sort_by_key(|info| info.value);
    assert_eq!(utxos.len(), 2);
    assert_eq!(utxos[0].outpoint, OutPoint { txid: key1, vout: 0 });
    assert_eq!(utxos[1].outpoint, OutPoint { txid: key2, vout: 0 });
}
