// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

#![allow(dead_code)]

use coordinator_core::chain::ChainReader;
use coordinator_core::error::Error;
use coordinator_core::types::{
	PrevOut, SpendableInput, TransactionDetails, TxInputRef, TxOutputInfo, WalletSlice,
};

use bitcoin::bip32::DerivationPath;
use bitcoin::hashes::Hash;
use bitcoin::{Address, Network, ScriptBuf, Transaction, Txid};

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Mutex;

/// In-memory chain backend. Transactions and fee rates are whatever the test
/// seeds; everything else fails like an unreachable node would.
pub struct MockChain {
	transactions: Mutex<HashMap<Txid, TransactionDetails>>,
	fee_rates: Mutex<HashMap<u16, f64>>,
	failing: Mutex<HashSet<Txid>>,
	broadcast_log: Mutex<Vec<Txid>>,
}

impl MockChain {
	pub fn new() -> Self {
		Self {
			transactions: Mutex::new(HashMap::new()),
			fee_rates: Mutex::new(HashMap::new()),
			failing: Mutex::new(HashSet::new()),
			broadcast_log: Mutex::new(Vec::new()),
		}
	}

	pub fn insert_transaction(&self, details: TransactionDetails) {
		self.transactions.lock().unwrap().insert(details.txid, details);
	}

	pub fn set_fee_rate(&self, target_blocks: u16, rate: f64) {
		self.fee_rates.lock().unwrap().insert(target_blocks, rate);
	}

	/// Makes every lookup of `txid` fail with a network error.
	pub fn fail_lookups_for(&self, txid: Txid) {
		self.failing.lock().unwrap().insert(txid);
	}

	pub fn broadcasts(&self) -> Vec<Txid> {
		self.broadcast_log.lock().unwrap().clone()
	}
}

#[async_trait::async_trait]
impl ChainReader for MockChain {
	async fn get_transaction(&self, txid: &Txid) -> Result<TransactionDetails, Error> {
		if self.failing.lock().unwrap().contains(txid) {
			return Err(Error::Network(format!("connection reset fetching {}", txid)));
		}
		self.transactions
			.lock()
			.unwrap()
			.get(txid)
			.cloned()
			.ok_or_else(|| Error::Network(format!("transaction {} not found", txid)))
	}

	async fn get_transaction_hex(&self, txid: &Txid) -> Result<String, Error> {
		let details = self.get_transaction(txid).await?;
		details.hex.ok_or(Error::TransactionHexMissing(*txid))
	}

	async fn estimate_fee_rate(&self, target_blocks: u16) -> Result<f64, Error> {
		self.fee_rates
			.lock()
			.unwrap()
			.get(&target_blocks)
			.copied()
			.ok_or_else(|| Error::Network("fee estimation unavailable".to_string()))
	}

	async fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error> {
		let txid = tx.compute_txid();
		self.broadcast_log.lock().unwrap().push(txid);
		Ok(txid)
	}
}

pub fn txid(byte: u8) -> Txid {
	Txid::from_byte_array([byte; 32])
}

pub fn witness_script(tag: u8) -> ScriptBuf {
	ScriptBuf::from_bytes(vec![tag])
}

pub fn p2wsh_address(tag: u8) -> Address {
	Address::p2wsh(witness_script(tag).as_script(), Network::Regtest)
}

/// A wallet slice for the p2wsh address derived from `tag`.
pub fn wallet_slice(tag: u8, change: bool) -> WalletSlice {
	let address = p2wsh_address(tag);
	WalletSlice {
		address: address.to_string(),
		bip32_path: DerivationPath::from_str(if change { "m/1/0" } else { "m/0/0" }).unwrap(),
		change,
		witness_script: Some(witness_script(tag)),
		redeem_script: None,
		script_pubkey: address.script_pubkey(),
		signer_derivations: vec![],
	}
}

/// Details of a confirmed transaction paying `sats` to the slice address at
/// output 0.
pub fn funding_tx_details(source: u8, slice_tag: u8, sats: u64) -> TransactionDetails {
	TransactionDetails {
		txid: txid(source),
		vin: vec![],
		vout: vec![TxOutputInfo {
			value_sats: sats,
			script_pubkey: Some(p2wsh_address(slice_tag).script_pubkey()),
			address: Some(p2wsh_address(slice_tag).to_string()),
		}],
		fee_sats: None,
		vsize: None,
		confirmed: true,
		is_received: None,
		deltas: None,
		hex: Some("020000000001000000000000".to_string()),
	}
}

/// Details of an unconfirmed transaction spending `source:vout`.
pub fn pending_tx_details(
	own: u8, source: u8, vout: u32, sequence: u32,
) -> TransactionDetails {
	TransactionDetails {
		txid: txid(own),
		vin: vec![TxInputRef {
			txid: Some(txid(source)),
			vout: Some(vout),
			sequence: Some(sequence),
			prevout: Some(PrevOut {
				value_sats: 100_000,
				script_pubkey: None,
				address: None,
			}),
		}],
		vout: vec![TxOutputInfo {
			value_sats: 99_500,
			script_pubkey: None,
			address: Some(p2wsh_address(0x61).to_string()),
		}],
		fee_sats: Some(500),
		vsize: Some(140),
		confirmed: false,
		is_received: None,
		deltas: None,
		hex: None,
	}
}

/// A live wallet UTXO as the node would report it.
pub fn live_utxo(source: u8, vout: u32, sats: u64, slice_tag: u8) -> SpendableInput {
	SpendableInput {
		outpoint: bitcoin::OutPoint { txid: txid(source), vout },
		amount_sats: sats,
		confirmed: true,
		prev_tx_hex: None,
		script_pubkey: p2wsh_address(slice_tag).script_pubkey(),
		witness_script: Some(witness_script(slice_tag)),
		redeem_script: None,
		bip32_path: None,
		signer_derivations: vec![],
		change: false,
		sequence: None,
		pending_spender: None,
	}
}
