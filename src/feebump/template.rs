// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Incremental construction of replacement and child transactions.
//!
//! A template accumulates inputs and outputs, keeps running fee math against
//! a target rate, and finally materializes as a PSBT v2. Outputs are either
//! locked (recipient amounts that must survive untouched) or malleable
//! (change the fee calculation may resize or drop).

use crate::config::{
	MultisigScriptType, WalletConfig, MAX_SANE_FEE_RATE_SAT_PER_VB, MAX_SANE_FEE_SATS,
	RBF_SEQUENCE,
};
use crate::error::Error;
use crate::feebump::sizing::{estimate_multisig_vsize, SizingParams};
use crate::psbt::PsbtV2;
use crate::types::{SignerXpub, SpendableInput};

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, OutPoint, ScriptBuf};

use std::str::FromStr;

/// One input of the transaction under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTemplate {
	pub outpoint: OutPoint,
	pub amount_sats: u64,
	pub sequence: u32,
	pub prev_tx_hex: Option<String>,
	pub script_pubkey: ScriptBuf,
	pub witness_script: Option<ScriptBuf>,
	pub redeem_script: Option<ScriptBuf>,
	pub signer_derivations: Vec<crate::types::SignerDerivation>,
}

impl From<&SpendableInput> for InputTemplate {
	fn from(utxo: &SpendableInput) -> Self {
		Self {
			outpoint: utxo.outpoint,
			amount_sats: utxo.amount_sats,
			sequence: utxo.sequence.unwrap_or(RBF_SEQUENCE),
			prev_tx_hex: utxo.prev_tx_hex.clone(),
			script_pubkey: utxo.script_pubkey.clone(),
			witness_script: utxo.witness_script.clone(),
			redeem_script: utxo.redeem_script.clone(),
			signer_derivations: utxo.signer_derivations.clone(),
		}
	}
}

/// One output of the transaction under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTemplate {
	pub address: String,
	pub amount_sats: u64,
	/// Locked outputs keep their amount; unlocked ones absorb fee changes.
	pub locked: bool,
}

/// A transaction being assembled against a fee-rate target.
#[derive(Debug, Clone)]
pub struct TransactionTemplate {
	inputs: Vec<InputTemplate>,
	outputs: Vec<OutputTemplate>,
	target_fee_rate: f64,
	config: WalletConfig,
	global_xpubs: Vec<SignerXpub>,
}

impl TransactionTemplate {
	pub fn new(
		target_fee_rate: f64, config: WalletConfig, global_xpubs: Vec<SignerXpub>,
	) -> Result<Self, Error> {
		config.validate()?;
		if !target_fee_rate.is_finite() || target_fee_rate <= 0.0 {
			return Err(Error::InvalidOptions("target fee rate must be positive".to_string()));
		}
		if target_fee_rate > MAX_SANE_FEE_RATE_SAT_PER_VB {
			return Err(Error::AbsurdFee { fee_sats: target_fee_rate as u64 });
		}
		Ok(Self { inputs: Vec::new(), outputs: Vec::new(), target_fee_rate, config, global_xpubs })
	}

	pub fn target_fee_rate(&self) -> f64 {
		self.target_fee_rate
	}

	pub fn add_input(&mut self, input: InputTemplate) {
		self.inputs.push(input);
	}

	pub fn add_output(&mut self, output: OutputTemplate) {
		self.outputs.push(output);
	}

	pub fn inputs(&self) -> &[InputTemplate] {
		&self.inputs
	}

	pub fn outputs(&self) -> &[OutputTemplate] {
		&self.outputs
	}

	pub fn set_output_amount(&mut self, index: usize, amount_sats: u64) {
		self.outputs[index].amount_sats = amount_sats;
	}

	pub fn contains_input(&self, outpoint: &OutPoint) -> bool {
		self.inputs.iter().any(|input| input.outpoint == *outpoint)
	}

	pub fn total_input_sats(&self) -> u64 {
		self.inputs.iter().map(|i| i.amount_sats).sum()
	}

	pub fn total_output_sats(&self) -> u64 {
		self.outputs.iter().map(|o| o.amount_sats).sum()
	}

	/// Estimated vsize at the wallet's quorum and script type.
	pub fn estimated_vsize(&self) -> usize {
		estimate_multisig_vsize(
			self.config.script_type,
			SizingParams {
				num_inputs: self.inputs.len().max(1),
				num_outputs: self.outputs.len().max(1),
				m: self.config.required_signers,
				n: self.config.total_signers,
			},
		)
	}

	/// The absolute fee the target rate demands at the current size.
	pub fn target_fees_sats(&self) -> u64 {
		(self.target_fee_rate * self.estimated_vsize() as f64).ceil() as u64
	}

	/// The fee the template currently pays. Outputs exceeding inputs is an
	/// error, not a negative fee.
	pub fn current_fee_sats(&self) -> Result<u64, Error> {
		self.total_input_sats()
			.checked_sub(self.total_output_sats())
			.ok_or(Error::InsufficientFunds)
	}

	pub fn fee_rate_satisfied(&self) -> Result<bool, Error> {
		Ok(self.current_fee_sats()? >= self.target_fees_sats())
	}

	/// Whether a change output should be added: no malleable output exists
	/// and the surplus is worth keeping.
	pub fn needs_change_output(&self) -> Result<bool, Error> {
		if self.outputs.iter().any(|o| !o.locked) {
			return Ok(false);
		}
		Ok(self.current_fee_sats()? > self.target_fees_sats() + self.config.dust_threshold_sats)
	}

	/// Recomputes the malleable output's amount from scratch so the final
	/// fee lands on target. A change amount at or below dust drops the
	/// output instead.
	pub fn adjust_change_output(&mut self) -> Result<(), Error> {
		let change_idx = match self.outputs.iter().position(|o| !o.locked) {
			Some(idx) => idx,
			None => return Ok(()),
		};
		let locked_sats: u64 =
			self.outputs.iter().filter(|o| o.locked).map(|o| o.amount_sats).sum();
		let spendable = self
			.total_input_sats()
			.checked_sub(locked_sats)
			.ok_or(Error::InsufficientFunds)?;
		let change = spendable.checked_sub(self.target_fees_sats());

		match change {
			Some(change) if change > self.config.dust_threshold_sats => {
				self.outputs[change_idx].amount_sats = change;
			},
			Some(change) => {
				log::debug!("Dropping dust change output of {} sats", change);
				self.outputs.remove(change_idx);
			},
			None => return Err(Error::InsufficientFunds),
		}
		Ok(())
	}

	/// Final sanity pass before the template becomes a PSBT.
	pub fn validate(&self) -> Result<(), Error> {
		if self.inputs.is_empty() {
			return Err(Error::InvalidOptions("transaction has no inputs".to_string()));
		}
		if self.outputs.is_empty() {
			return Err(Error::InvalidOptions("transaction has no outputs".to_string()));
		}
		let fee = self.current_fee_sats()?;
		let target = self.target_fees_sats();
		if fee < target {
			return Err(Error::FeeTooLow { required_sats: target, actual_sats: fee });
		}
		if fee > MAX_SANE_FEE_SATS {
			return Err(Error::AbsurdFee { fee_sats: fee });
		}
		let rate = fee as f64 / self.estimated_vsize() as f64;
		if rate > MAX_SANE_FEE_RATE_SAT_PER_VB {
			return Err(Error::AbsurdFee { fee_sats: fee });
		}
		if let Some(dusty) =
			self.outputs.iter().find(|o| o.amount_sats < self.config.dust_threshold_sats)
		{
			return Err(Error::DustOutput { amount_sats: dusty.amount_sats });
		}
		Ok(())
	}

	/// Materializes the template as a PSBT v2, carrying UTXO data, scripts,
	/// derivations, and the wallet's global xpubs.
	pub fn to_psbt(&self) -> Result<PsbtV2, Error> {
		let mut psbt = PsbtV2::new(2);

		for signer in &self.global_xpubs {
			psbt.add_global_xpub(&signer.xpub, signer.master_fingerprint, &signer.path);
		}

		for input in &self.inputs {
			let idx = psbt.add_input(input.outpoint, input.sequence);
			if self.config.script_type != MultisigScriptType::P2sh {
				psbt.set_input_witness_utxo(idx, input.amount_sats, &input.script_pubkey);
			}
			if let Some(hex) = &input.prev_tx_hex {
				let raw = crate::hex_utils::to_vec(hex).ok_or_else(|| {
					Error::InvalidTransaction("invalid funding transaction hex".to_string())
				})?;
				psbt.set_input_non_witness_utxo(idx, raw);
			}
			if let Some(script) = &input.redeem_script {
				psbt.set_input_redeem_script(idx, script);
			}
			if let Some(script) = &input.witness_script {
				psbt.set_input_witness_script(idx, script);
			}
			for derivation in &input.signer_derivations {
				psbt.add_input_bip32_derivation(
					idx,
					&derivation.pubkey,
					derivation.master_fingerprint,
					&derivation.path,
				);
			}
		}

		for output in &self.outputs {
			let script = self.output_script(&output.address)?;
			psbt.add_output(output.amount_sats, &script);
		}

		Ok(psbt)
	}

	fn output_script(&self, address: &str) -> Result<ScriptBuf, Error> {
		let address = Address::<NetworkUnchecked>::from_str(address)?
			.require_network(self.config.network)?;
		Ok(address.script_pubkey())
	}
}
