// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

mod common;

use common::{funding_tx_details, live_utxo, pending_tx_details, txid, wallet_slice, MockChain};

use coordinator_core::error::Error;
use coordinator_core::identifier::InputId;
use coordinator_core::matcher::match_inputs;
use coordinator_core::reconstruct::reconstruct_utxos;

use std::collections::HashSet;

const RBF_SEQ: u32 = 0xffff_fffd;
const FINAL_SEQ: u32 = 0xffff_ffff;

fn needed(ids: &[InputId]) -> HashSet<InputId> {
	ids.iter().copied().collect()
}

// The wallet owns A:0 (100k sats) but pending transaction P already spends
// it, so the node's live UTXO listing no longer shows it. A replacement PSBT
// needing A:0 must still resolve it, at full amount, through reconstruction.
#[tokio::test]
async fn pending_spend_is_reconstructed_and_matched() {
	let chain = MockChain::new();
	chain.insert_transaction(funding_tx_details(0x0a, 0x41, 100_000));

	let pending = vec![pending_tx_details(0x0b, 0x0a, 0, RBF_SEQ)];
	let slices = vec![wallet_slice(0x41, false)];
	let wanted = [InputId::new(txid(0x0a), 0)];

	let reconstruction =
		reconstruct_utxos(&chain, &pending, &slices, &needed(&wanted)).await.unwrap();
	assert_eq!(reconstruction.utxos.len(), 1);
	assert_eq!(reconstruction.utxos[0].amount_sats, 100_000);
	assert_eq!(reconstruction.utxos[0].pending_spender, Some(txid(0x0b)));
	assert!(reconstruction.utxos[0].prev_tx_hex.is_some());
	assert!(reconstruction.replaces_pending);

	let result = match_inputs(&wanted, &[], &reconstruction.utxos);
	assert!(result.is_complete());
	assert_eq!(result.matched.len(), 1);
	assert_eq!(result.matched[0].id(), wanted[0]);
}

#[tokio::test]
async fn live_utxos_shadow_reconstructed_ones() {
	let chain = MockChain::new();
	chain.insert_transaction(funding_tx_details(0x0a, 0x41, 100_000));

	let pending = vec![pending_tx_details(0x0b, 0x0a, 0, RBF_SEQ)];
	let slices = vec![wallet_slice(0x41, false)];
	let wanted = [InputId::new(txid(0x0a), 0)];

	let reconstruction =
		reconstruct_utxos(&chain, &pending, &slices, &needed(&wanted)).await.unwrap();

	// The node reports the output live after all, with different metadata.
	let live = vec![live_utxo(0x0a, 0, 100_000, 0x42)];
	let result = match_inputs(&wanted, &live, &reconstruction.utxos);
	assert_eq!(result.matched.len(), 1);
	assert_eq!(result.matched[0].script_pubkey, live[0].script_pubkey);
	assert!(result.matched[0].pending_spender.is_none());
}

#[tokio::test]
async fn reconstruction_is_idempotent() {
	let chain = MockChain::new();
	chain.insert_transaction(funding_tx_details(0x0a, 0x41, 100_000));
	chain.insert_transaction(funding_tx_details(0x0c, 0x43, 40_000));

	let pending = vec![
		pending_tx_details(0x0b, 0x0a, 0, RBF_SEQ),
		pending_tx_details(0x0d, 0x0c, 0, FINAL_SEQ),
	];
	let slices = vec![wallet_slice(0x41, false), wallet_slice(0x43, true)];
	let wanted = [InputId::new(txid(0x0a), 0), InputId::new(txid(0x0c), 0)];

	let first = reconstruct_utxos(&chain, &pending, &slices, &needed(&wanted)).await.unwrap();
	let second = reconstruct_utxos(&chain, &pending, &slices, &needed(&wanted)).await.unwrap();
	assert_eq!(first, second);
	assert_eq!(first.utxos.len(), 2);
}

#[tokio::test]
async fn one_failing_source_does_not_sink_the_batch() {
	let chain = MockChain::new();
	chain.insert_transaction(funding_tx_details(0x0a, 0x41, 100_000));
	chain.fail_lookups_for(txid(0x0c));

	let pending = vec![
		pending_tx_details(0x0b, 0x0a, 0, RBF_SEQ),
		pending_tx_details(0x0d, 0x0c, 0, RBF_SEQ),
	];
	let slices = vec![wallet_slice(0x41, false)];
	let wanted = [InputId::new(txid(0x0a), 0), InputId::new(txid(0x0c), 0)];

	let reconstruction =
		reconstruct_utxos(&chain, &pending, &slices, &needed(&wanted)).await.unwrap();
	assert_eq!(reconstruction.utxos.len(), 1);
	assert_eq!(reconstruction.utxos[0].outpoint.txid, txid(0x0a));

	// The caller sees the shortfall through the matcher.
	let result = match_inputs(&wanted, &[], &reconstruction.utxos);
	assert!(!result.is_complete());
	assert_eq!(result.missing, vec![wanted[1]]);
}

#[tokio::test]
async fn unowned_outputs_are_never_surfaced() {
	let chain = MockChain::new();
	// The source pays an address no wallet slice covers.
	chain.insert_transaction(funding_tx_details(0x0a, 0x77, 100_000));

	let pending = vec![pending_tx_details(0x0b, 0x0a, 0, RBF_SEQ)];
	let slices = vec![wallet_slice(0x41, false)];
	let wanted = [InputId::new(txid(0x0a), 0)];

	let reconstruction =
		reconstruct_utxos(&chain, &pending, &slices, &needed(&wanted)).await.unwrap();
	assert!(reconstruction.utxos.is_empty());
}

#[tokio::test]
async fn nothing_pending_is_fatal() {
	let chain = MockChain::new();
	let wanted = [InputId::new(txid(0x0a), 0)];
	let err = reconstruct_utxos(&chain, &[], &[], &needed(&wanted)).await.unwrap_err();
	assert_eq!(err, Error::NothingToReconcile);
}
