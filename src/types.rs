// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Data model shared across the reconciliation subsystems.
//!
//! [`TransactionDetails`] mirrors the normalized shape chain backends report
//! (a superset of what Core and Esplora agree on), so it derives serde.
//! Wallet slices and spendable inputs are in-process types and do not.

use crate::identifier::InputId;

use bitcoin::bip32::{DerivationPath, Fingerprint, Xpub};
use bitcoin::{OutPoint, ScriptBuf, Txid};

use serde::{Deserialize, Serialize};

/// Category of a wallet-accounting entry reported by the chain backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaCategory {
	Receive,
	Generate,
	Immature,
	Send,
	/// Any category we do not account for.
	#[serde(other)]
	Other,
}

/// One categorized amount from the backend's wallet accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletDelta {
	pub category: DeltaCategory,
	/// Signed satoshis; send entries are negative.
	pub amount_sats: i64,
	#[serde(default)]
	pub address: Option<String>,
}

/// The output funding an input, when the backend exposes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrevOut {
	pub value_sats: u64,
	#[serde(default)]
	pub script_pubkey: Option<ScriptBuf>,
	#[serde(default)]
	pub address: Option<String>,
}

/// One input of a reported transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxInputRef {
	#[serde(default)]
	pub txid: Option<Txid>,
	#[serde(default)]
	pub vout: Option<u32>,
	#[serde(default)]
	pub sequence: Option<u32>,
	#[serde(default)]
	pub prevout: Option<PrevOut>,
}

impl TxInputRef {
	/// The identifier of the output this input spends, when known.
	pub fn spends(&self) -> Option<InputId> {
		Some(InputId::new(self.txid?, self.vout?))
	}
}

/// One output of a reported transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutputInfo {
	pub value_sats: u64,
	#[serde(default)]
	pub script_pubkey: Option<ScriptBuf>,
	#[serde(default)]
	pub address: Option<String>,
}

/// A transaction as reported by the chain backend, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
	pub txid: Txid,
	#[serde(default)]
	pub vin: Vec<TxInputRef>,
	#[serde(default)]
	pub vout: Vec<TxOutputInfo>,
	#[serde(default)]
	pub fee_sats: Option<u64>,
	#[serde(default)]
	pub vsize: Option<u64>,
	#[serde(default)]
	pub confirmed: bool,
	/// Set by wallet-aware backends when the transaction pays the wallet.
	#[serde(default)]
	pub is_received: Option<bool>,
	/// Categorized wallet accounting, when the backend is wallet-aware.
	#[serde(default)]
	pub deltas: Option<Vec<WalletDelta>>,
	/// Raw transaction hex, when already fetched alongside the details.
	#[serde(default)]
	pub hex: Option<String>,
}

impl TransactionDetails {
	/// Whether any input signals opt-in replaceability per [BIP 125].
	///
	/// [BIP 125]: https://github.com/bitcoin/bips/blob/master/bip-0125.mediawiki
	pub fn signals_rbf(&self) -> bool {
		self.vin
			.iter()
			.any(|input| input.sequence.map_or(false, |s| s < crate::config::RBF_SIGNAL_THRESHOLD))
	}
}

/// One known signer key derivation behind a multisig address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerDerivation {
	pub pubkey: bitcoin::PublicKey,
	pub master_fingerprint: Fingerprint,
	pub path: DerivationPath,
}

/// An account-level xpub of one cosigner, embedded into produced PSBTs so
/// signers can locate their keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerXpub {
	pub xpub: Xpub,
	pub master_fingerprint: Fingerprint,
	pub path: DerivationPath,
}

/// One address of the multisig wallet together with its script metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSlice {
	pub address: String,
	pub bip32_path: DerivationPath,
	/// True for internal (change) chain addresses.
	pub change: bool,
	pub witness_script: Option<ScriptBuf>,
	pub redeem_script: Option<ScriptBuf>,
	pub script_pubkey: ScriptBuf,
	pub signer_derivations: Vec<SignerDerivation>,
}

/// A fully resolved spendable output, either live from the wallet's UTXO set
/// or reconstructed out of a pending transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SpendableInput {
	pub outpoint: OutPoint,
	pub amount_sats: u64,
	pub confirmed: bool,
	/// Raw hex of the funding transaction, for non-witness UTXO data.
	pub prev_tx_hex: Option<String>,
	pub script_pubkey: ScriptBuf,
	pub witness_script: Option<ScriptBuf>,
	pub redeem_script: Option<ScriptBuf>,
	pub bip32_path: Option<DerivationPath>,
	pub signer_derivations: Vec<SignerDerivation>,
	pub change: bool,
	pub sequence: Option<u32>,
	/// For reconstructed records, the pending transaction spending this
	/// output right now.
	pub pending_spender: Option<Txid>,
}

impl SpendableInput {
	pub fn id(&self) -> InputId {
		InputId::from(self.outpoint)
	}
}
