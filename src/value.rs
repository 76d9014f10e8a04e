// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Net value effect of a transaction on the wallet.
//!
//! Backends differ wildly in what they expose, so the calculation picks the
//! strongest evidence available: categorized wallet accounting, then a
//! complete input graph, then an output-only heuristic.

use crate::types::{DeltaCategory, TransactionDetails};

use bitcoin::SignedAmount;

use std::collections::HashSet;

/// Computes the signed net value of `tx` from the wallet's point of view.
///
/// Returns zero when no transaction is given.
pub fn transaction_value(
	tx: Option<&TransactionDetails>, wallet_addresses: &HashSet<String>,
) -> SignedAmount {
	let tx = match tx {
		Some(tx) => tx,
		None => return SignedAmount::ZERO,
	};

	if let Some(deltas) = &tx.deltas {
		return categorized_value(tx, deltas);
	}

	if !wallet_addresses.is_empty() && has_complete_input_data(tx) {
		return graph_value(tx, wallet_addresses);
	}

	heuristic_value(tx, wallet_addresses)
}

/// Whether every input of `tx` carries the address of the output it spends.
pub fn has_complete_input_data(tx: &TransactionDetails) -> bool {
	!tx.vin.is_empty()
		&& tx.vin.iter().all(|input| {
			input.prevout.as_ref().map_or(false, |prev| prev.address.is_some())
		})
}

fn categorized_value(tx: &TransactionDetails, deltas: &[crate::types::WalletDelta]) -> SignedAmount {
	let accounted: i64 = deltas
		.iter()
		.filter(|d| {
			matches!(
				d.category,
				DeltaCategory::Receive
					| DeltaCategory::Generate
					| DeltaCategory::Immature
					| DeltaCategory::Send
			)
		})
		.map(|d| d.amount_sats)
		.sum();
	SignedAmount::from_sat(accounted - tx.fee_sats.unwrap_or(0) as i64)
}

fn graph_value(tx: &TransactionDetails, wallet_addresses: &HashSet<String>) -> SignedAmount {
	let to_wallet: i64 = tx
		.vout
		.iter()
		.filter(|out| out.address.as_deref().map_or(false, |a| wallet_addresses.contains(a)))
		.map(|out| out.value_sats as i64)
		.sum();
	let from_wallet: i64 = tx
		.vin
		.iter()
		.filter_map(|input| input.prevout.as_ref())
		.filter(|prev| prev.address.as_deref().map_or(false, |a| wallet_addresses.contains(a)))
		.map(|prev| prev.value_sats as i64)
		.sum();
	SignedAmount::from_sat(to_wallet - from_wallet)
}

fn heuristic_value(tx: &TransactionDetails, wallet_addresses: &HashSet<String>) -> SignedAmount {
	let to_wallet: i64 = tx
		.vout
		.iter()
		.filter(|out| out.address.as_deref().map_or(false, |a| wallet_addresses.contains(a)))
		.map(|out| out.value_sats as i64)
		.sum();

	if tx.is_received.unwrap_or(false) {
		return SignedAmount::from_sat(to_wallet);
	}

	let to_others: i64 = tx
		.vout
		.iter()
		.filter(|out| !out.address.as_deref().map_or(false, |a| wallet_addresses.contains(a)))
		.map(|out| out.value_sats as i64)
		.sum();
	SignedAmount::from_sat(-(tx.fee_sats.unwrap_or(0) as i64 + to_others))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{PrevOut, TxInputRef, TxOutputInfo, WalletDelta};

	use bitcoin::hashes::Hash;
	use bitcoin::Txid;

	fn base_tx() -> TransactionDetails {
		TransactionDetails {
			txid: Txid::from_byte_array([7; 32]),
			vin: vec![],
			vout: vec![],
			fee_sats: Some(1_000),
			vsize: Some(140),
			confirmed: false,
			is_received: None,
			deltas: None,
			hex: None,
		}
	}

	fn output(addr: &str, sats: u64) -> TxOutputInfo {
		TxOutputInfo { value_sats: sats, script_pubkey: None, address: Some(addr.to_string()) }
	}

	fn input_from(addr: &str, sats: u64) -> TxInputRef {
		TxInputRef {
			txid: Some(Txid::from_byte_array([1; 32])),
			vout: Some(0),
			sequence: Some(0xffff_fffd),
			prevout: Some(PrevOut {
				value_sats: sats,
				script_pubkey: None,
				address: Some(addr.to_string()),
			}),
		}
	}

	fn wallet(addrs: &[&str]) -> HashSet<String> {
		addrs.iter().map(|a| a.to_string()).collect()
	}

	#[test]
	fn absent_transaction_is_zero() {
		assert_eq!(transaction_value(None, &wallet(&["bc1qa"])), SignedAmount::ZERO);
	}

	#[test]
	fn categorized_deltas_win_over_everything() {
		let mut tx = base_tx();
		tx.deltas = Some(vec![
			WalletDelta { category: DeltaCategory::Receive, amount_sats: 50_000, address: None },
			WalletDelta { category: DeltaCategory::Send, amount_sats: -20_000, address: None },
			WalletDelta { category: DeltaCategory::Other, amount_sats: 999, address: None },
		]);
		// Output data that would give a different answer must be ignored.
		tx.vout = vec![output("bc1qa", 1)];
		let value = transaction_value(Some(&tx), &wallet(&["bc1qa"]));
		assert_eq!(value, SignedAmount::from_sat(50_000 - 20_000 - 1_000));
	}

	#[test]
	fn complete_graph_internal_transfer_nets_minus_fee() {
		let mut tx = base_tx();
		tx.vin = vec![input_from("bc1qchange", 100_000)];
		tx.vout = vec![output("bc1qchange", 60_000), output("bc1qother_ours", 39_000)];
		let value = transaction_value(Some(&tx), &wallet(&["bc1qchange", "bc1qother_ours"]));
		assert_eq!(value, SignedAmount::from_sat(-1_000));
	}

	#[test]
	fn complete_graph_spend_counts_inputs_and_change() {
		let mut tx = base_tx();
		tx.vin = vec![input_from("bc1qours", 100_000)];
		tx.vout = vec![output("bc1qpayee", 70_000), output("bc1qours", 29_000)];
		let value = transaction_value(Some(&tx), &wallet(&["bc1qours"]));
		assert_eq!(value, SignedAmount::from_sat(29_000 - 100_000));
	}

	#[test]
	fn empty_wallet_set_falls_through_to_heuristic() {
		let mut tx = base_tx();
		tx.vin = vec![input_from("bc1qours", 100_000)];
		tx.vout = vec![output("bc1qpayee", 99_000)];
		// Not received, no wallet addresses: everything paid plus the fee.
		let value = transaction_value(Some(&tx), &HashSet::new());
		assert_eq!(value, SignedAmount::from_sat(-(1_000 + 99_000)));
	}

	#[test]
	fn heuristic_receive_sums_wallet_outputs() {
		let mut tx = base_tx();
		tx.is_received = Some(true);
		tx.vin = vec![TxInputRef::default()];
		tx.vout = vec![output("bc1qours", 42_000), output("bc1qpayer_change", 5_000)];
		let value = transaction_value(Some(&tx), &wallet(&["bc1qours"]));
		assert_eq!(value, SignedAmount::from_sat(42_000));
	}

	#[test]
	fn heuristic_spend_charges_fee_and_foreign_outputs() {
		let mut tx = base_tx();
		tx.vin = vec![TxInputRef::default()];
		tx.vout = vec![output("bc1qpayee", 70_000), output("bc1qours", 29_000)];
		let value = transaction_value(Some(&tx), &wallet(&["bc1qours"]));
		assert_eq!(value, SignedAmount::from_sat(-(1_000 + 70_000)));
	}
}
