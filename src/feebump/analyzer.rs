// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Analysis of a stuck transaction's fee-bump options.

use crate::config::WalletConfig;
use crate::error::Error;
use crate::feebump::sizing::{estimate_multisig_vsize, SizingParams};
use crate::feebump::FeeBumpStrategy;
use crate::types::SpendableInput;

use bitcoin::consensus::deserialize;
use bitcoin::{Sequence, Transaction, TxOut, Txid};

/// Inputs to the analysis.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
	/// Raw hex of the transaction to analyze.
	pub tx_hex: String,
	/// The absolute fee the transaction currently pays.
	pub absolute_fee_sats: u64,
	/// The fee rate the caller wants to reach, in sat/vB.
	pub target_fee_rate: f64,
	/// Wallet outputs spendable right now, live or reconstructed.
	pub available_inputs: Vec<SpendableInput>,
	/// Index of the transaction's own change output, when known.
	pub change_output_index: Option<usize>,
	/// Treat unsignaled transactions as replaceable (full-RBF relay).
	pub assume_full_rbf: bool,
	pub config: WalletConfig,
}

/// The condensed result of an analysis, cheap to clone and hand to a UI.
#[derive(Debug, Clone, PartialEq)]
pub struct TxAnalysis {
	pub txid: Txid,
	pub vsize: usize,
	pub weight: usize,
	pub fee_sats: u64,
	pub fee_rate: f64,
	pub target_fee_rate: f64,
	pub signals_rbf: bool,
	pub can_rbf: bool,
	pub can_cpfp: bool,
	pub minimum_rbf_fee_sats: u64,
	pub cpfp_child_fee_rate: f64,
	pub estimated_rbf_cost_sats: u64,
	pub estimated_cpfp_cost_sats: u64,
	pub recommended_strategy: FeeBumpStrategy,
}

/// Analyzer over a decoded transaction and the wallet's view of it.
#[derive(Debug, Clone)]
pub struct TxAnalyzer {
	tx: Transaction,
	opts: AnalyzerOptions,
}

impl TxAnalyzer {
	pub fn new(opts: AnalyzerOptions) -> Result<Self, Error> {
		opts.config.validate()?;
		if opts.absolute_fee_sats == 0 {
			return Err(Error::InvalidOptions("absolute fee must be positive".to_string()));
		}
		if !opts.target_fee_rate.is_finite() || opts.target_fee_rate <= 0.0 {
			return Err(Error::InvalidOptions("target fee rate must be positive".to_string()));
		}
		let raw = hex_to_vec(&opts.tx_hex)?;
		let tx: Transaction = deserialize(&raw)?;
		if let Some(idx) = opts.change_output_index {
			if idx >= tx.output.len() {
				return Err(Error::InvalidOptions(format!(
					"change output index {} out of range",
					idx
				)));
			}
		}
		Ok(Self { tx, opts })
	}

	pub fn txid(&self) -> Txid {
		self.tx.compute_txid()
	}

	pub fn transaction(&self) -> &Transaction {
		&self.tx
	}

	pub fn options(&self) -> &AnalyzerOptions {
		&self.opts
	}

	pub fn vsize(&self) -> usize {
		self.tx.vsize()
	}

	pub fn weight(&self) -> usize {
		self.tx.weight().to_wu() as usize
	}

	pub fn fee_sats(&self) -> u64 {
		self.opts.absolute_fee_sats
	}

	pub fn fee_rate(&self) -> f64 {
		self.opts.absolute_fee_sats as f64 / self.vsize() as f64
	}

	/// Whether any input signals opt-in replaceability per [BIP 125].
	///
	/// [BIP 125]: https://github.com/bitcoin/bips/blob/master/bip-0125.mediawiki
	pub fn signals_rbf(&self) -> bool {
		self.tx.input.iter().any(|i| i.sequence < Sequence(crate::config::RBF_SIGNAL_THRESHOLD))
	}

	/// Whether the wallet controls at least one input of the transaction.
	pub fn owns_any_input(&self) -> bool {
		self.tx.input.iter().any(|txin| {
			self.opts.available_inputs.iter().any(|u| u.outpoint == txin.previous_output)
		})
	}

	pub fn can_rbf(&self) -> bool {
		(self.signals_rbf() || self.opts.assume_full_rbf) && self.owns_any_input()
	}

	pub fn can_cpfp(&self) -> bool {
		self.opts.change_output_index.map_or(false, |idx| idx < self.tx.output.len())
	}

	/// The BIP 125 rule-4 floor: the original fee plus one incremental relay
	/// fee for the replacement's size.
	pub fn minimum_rbf_fee_sats(&self) -> u64 {
		self.opts.absolute_fee_sats
			+ (self.opts.config.incremental_relay_fee_rate * self.vsize() as f64).ceil() as u64
	}

	/// Estimated vsize of a minimal CPFP child (one input, one output).
	pub fn estimated_child_vsize(&self) -> usize {
		estimate_multisig_vsize(
			self.opts.config.script_type,
			SizingParams {
				num_inputs: 1,
				num_outputs: 1,
				m: self.opts.config.required_signers,
				n: self.opts.config.total_signers,
			},
		)
	}

	/// The rate a CPFP child must pay so the package meets the target.
	pub fn cpfp_child_fee_rate(&self) -> f64 {
		let child = self.estimated_child_vsize() as f64;
		let package = (self.vsize() + self.estimated_child_vsize()) as f64;
		let needed =
			(self.opts.target_fee_rate * package - self.opts.absolute_fee_sats as f64) / child;
		needed.max(0.0)
	}

	pub fn estimated_rbf_cost_sats(&self) -> u64 {
		let target = (self.opts.target_fee_rate * self.vsize() as f64).ceil() as u64;
		target.max(self.minimum_rbf_fee_sats())
	}

	pub fn estimated_cpfp_cost_sats(&self) -> u64 {
		(self.cpfp_child_fee_rate() * self.estimated_child_vsize() as f64).ceil() as u64
	}

	/// Picks the cheaper workable strategy, or none when the transaction
	/// already meets the target.
	pub fn recommended_strategy(&self) -> FeeBumpStrategy {
		if self.fee_rate() >= self.opts.target_fee_rate {
			return FeeBumpStrategy::None;
		}
		let can_rbf = self.can_rbf();
		let can_cpfp = self.can_cpfp();
		if can_rbf
			&& (!can_cpfp || self.estimated_rbf_cost_sats() <= self.estimated_cpfp_cost_sats())
		{
			return FeeBumpStrategy::Rbf;
		}
		if can_cpfp {
			return FeeBumpStrategy::Cpfp;
		}
		FeeBumpStrategy::None
	}

	/// The original outputs paired with whether a replacement must keep them
	/// untouched.
	pub fn original_outputs(&self) -> Vec<(TxOut, bool)> {
		self.tx
			.output
			.iter()
			.enumerate()
			.map(|(idx, out)| (out.clone(), Some(idx) != self.opts.change_output_index))
			.collect()
	}

	pub fn analyze(&self) -> TxAnalysis {
		TxAnalysis {
			txid: self.txid(),
			vsize: self.vsize(),
			weight: self.weight(),
			fee_sats: self.fee_sats(),
			fee_rate: self.fee_rate(),
			target_fee_rate: self.opts.target_fee_rate,
			signals_rbf: self.signals_rbf(),
			can_rbf: self.can_rbf(),
			can_cpfp: self.can_cpfp(),
			minimum_rbf_fee_sats: self.minimum_rbf_fee_sats(),
			cpfp_child_fee_rate: self.cpfp_child_fee_rate(),
			estimated_rbf_cost_sats: self.estimated_rbf_cost_sats(),
			estimated_cpfp_cost_sats: self.estimated_cpfp_cost_sats(),
			recommended_strategy: self.recommended_strategy(),
		}
	}
}

pub(crate) fn hex_to_vec(hex: &str) -> Result<Vec<u8>, Error> {
	crate::hex_utils::to_vec(hex)
		.filter(|bytes| !bytes.is_empty())
		.ok_or_else(|| Error::InvalidTransaction("invalid transaction hex".to_string()))
}
