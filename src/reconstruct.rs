// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Reconstruction of spendable outputs hidden inside pending transactions.
//!
//! A backend's UTXO listing goes blind on outputs that an unconfirmed
//! transaction already spends or creates. For replacement flows the
//! coordinator still has to treat those outputs as spendable, so this module
//! rebuilds full records for them from the source transactions.

use crate::chain::{fetch_with_hex, ChainReader};
use crate::error::Error;
use crate::identifier::InputId;
use crate::types::{SpendableInput, TransactionDetails, WalletSlice};

use bitcoin::{OutPoint, Txid};

use std::collections::{HashMap, HashSet};

/// The outcome of a reconstruction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
	/// All outputs that could be rebuilt, one per needed identifier.
	pub utxos: Vec<SpendableInput>,
	/// True when a needed output is being spent by an RBF-signaling pending
	/// transaction, i.e. the flow replaces that transaction rather than
	/// spending fresh coins.
	pub replaces_pending: bool,
}

/// Collects the unique source txids that have to be fetched to rebuild the
/// needed outputs.
pub fn needed_source_txids(
	pending: &[TransactionDetails], needed: &HashSet<InputId>,
) -> Vec<Txid> {
	let mut seen = HashSet::new();
	let mut txids = Vec::new();
	for tx in pending {
		for input in &tx.vin {
			if let Some(id) = input.spends() {
				if needed.contains(&id) && seen.insert(id.txid) {
					txids.push(id.txid);
				}
			}
		}
	}
	txids
}

/// Rebuilds a single spendable output from its source transaction.
pub(crate) fn reconstruct_one(
	source: &TransactionDetails, index: u32, pending_spender: Txid, slices: &[WalletSlice],
) -> Result<SpendableInput, Error> {
	let id = InputId::new(source.txid, index);
	let output = source.vout.get(index as usize).ok_or(Error::OutputNotFound(id))?;

	let slice = slices
		.iter()
		.find(|slice| match (&output.address, &output.script_pubkey) {
			(Some(addr), _) => slice.address == *addr,
			(None, Some(script)) => slice.script_pubkey == *script,
			(None, None) => false,
		})
		.ok_or(Error::OutputNotOwned(id))?;

	let hex = source.hex.clone().ok_or(Error::TransactionHexMissing(source.txid))?;

	Ok(SpendableInput {
		outpoint: OutPoint { txid: source.txid, vout: index },
		amount_sats: output.value_sats,
		confirmed: source.confirmed,
		prev_tx_hex: Some(hex),
		script_pubkey: slice.script_pubkey.clone(),
		witness_script: slice.witness_script.clone(),
		redeem_script: slice.redeem_script.clone(),
		bip32_path: Some(slice.bip32_path.clone()),
		signer_derivations: slice.signer_derivations.clone(),
		change: slice.change,
		sequence: None,
		pending_spender: Some(pending_spender),
	})
}

/// Rebuilds every needed output referenced by the pending transactions.
///
/// Source transactions are fetched concurrently through `chain`. A failed
/// fetch or an output the wallet turns out not to own disqualifies only the
/// records depending on it; having nothing to scan at all is fatal.
pub async fn reconstruct_utxos<C: ChainReader + ?Sized>(
	chain: &C, pending: &[TransactionDetails], slices: &[WalletSlice],
	needed: &HashSet<InputId>,
) -> Result<Reconstruction, Error> {
	if pending.is_empty() {
		return Err(Error::NothingToReconcile);
	}

	let txids = needed_source_txids(pending, needed);
	log::debug!(
		"Reconstructing {} needed inputs from {} source transactions",
		needed.len(),
		txids.len()
	);

	let fetches = txids.iter().map(|txid| fetch_with_hex(chain, txid));
	let fetched = futures::future::join_all(fetches).await;

	let mut sources: HashMap<Txid, TransactionDetails> = HashMap::with_capacity(txids.len());
	for (txid, result) in txids.iter().zip(fetched) {
		match result {
			Ok(details) => {
				sources.insert(*txid, details);
			},
			Err(e) => {
				log::warn!("Skipping source transaction {}: {}", txid, e);
			},
		}
	}

	let mut utxos = Vec::new();
	let mut done: HashSet<InputId> = HashSet::new();
	let mut replaces_pending = false;

	for tx in pending {
		let tx_signals_rbf = tx.signals_rbf();
		for input in &tx.vin {
			let id = match input.spends() {
				Some(id) if needed.contains(&id) => id,
				_ => continue,
			};
			if tx_signals_rbf {
				replaces_pending = true;
			}
			if !done.insert(id) {
				continue;
			}
			let source = match sources.get(&id.txid) {
				Some(source) => source,
				None => {
					log::warn!("Skipping {}: source transaction unavailable", id);
					continue;
				},
			};
			match reconstruct_one(source, id.index, tx.txid, slices) {
				Ok(utxo) => utxos.push(utxo),
				Err(e) => log::warn!("Skipping {}: {}", id, e),
			}
		}
	}

	log::info!(
		"Reconstructed {}/{} needed inputs (replacement flow: {})",
		utxos.len(),
		needed.len(),
		replaces_pending
	);
	Ok(Reconstruction { utxos, replaces_pending })
}
