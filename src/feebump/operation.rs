// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Single-flight fee-bump flow.
//!
//! A [`FeeBumpOperation`] walks one transaction through
//! idle -> analyzing -> ready -> creating and lands on success or failed.
//! The terminal states only accept [`FeeBumpOperation::reset`], so a
//! coordinator handler can never double-create from one analysis.

use crate::chain::{fetch_with_hex, ChainReader};
use crate::config::{
	WalletConfig, FALLBACK_FEE_RATE_1_BLOCK, FALLBACK_FEE_RATE_3_BLOCKS,
	FALLBACK_FEE_RATE_6_BLOCKS,
};
use crate::error::Error;
use crate::feebump::analyzer::{AnalyzerOptions, TxAnalysis, TxAnalyzer};
use crate::feebump::cpfp::{create_cpfp, CpfpOptions};
use crate::feebump::rbf::{
	create_accelerated_rbf, create_cancel_rbf, AcceleratedRbfOptions, CancelRbfOptions,
};
use crate::feebump::{BuiltPsbt, FeeBumpStatus, FeeBumpStrategy};
use crate::types::SpendableInput;

use bitcoin::Txid;

use base64::prelude::{Engine, BASE64_STANDARD};
use chrono::{DateTime, Utc};

/// How urgently the bumped transaction should confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePriority {
	/// Within roughly six blocks.
	Low,
	/// Within roughly three blocks.
	Medium,
	/// Next block.
	High,
}

impl FeePriority {
	pub fn target_blocks(&self) -> u16 {
		match self {
			Self::Low => 6,
			Self::Medium => 3,
			Self::High => 1,
		}
	}

	/// Rate used when the chain source cannot produce an estimate.
	fn fallback_fee_rate(&self) -> f64 {
		match self {
			Self::Low => FALLBACK_FEE_RATE_6_BLOCKS,
			Self::Medium => FALLBACK_FEE_RATE_3_BLOCKS,
			Self::High => FALLBACK_FEE_RATE_1_BLOCK,
		}
	}
}

/// Which PSBT serialization the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PsbtVersionChoice {
	/// BIP 174, for the widest signer compatibility.
	#[default]
	V0,
	/// BIP 370.
	V2,
}

/// Fee-rate estimates for each priority, in sat/vB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeEstimates {
	pub high: f64,
	pub medium: f64,
	pub low: f64,
}

/// What to analyze and against which fee goal.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
	pub txid: Txid,
	pub priority: FeePriority,
	/// Overrides the estimated rate for `priority` when set.
	pub target_fee_rate: Option<f64>,
	/// Wallet outputs spendable right now, live or reconstructed.
	pub available_inputs: Vec<SpendableInput>,
	pub change_output_index: Option<usize>,
	pub assume_full_rbf: bool,
}

/// The outcome of a successful create step.
#[derive(Debug, Clone)]
pub struct FeeBumpResult {
	pub psbt_base64: String,
	pub new_fee_sats: u64,
	pub new_fee_rate: f64,
	pub strategy: FeeBumpStrategy,
	pub is_cancel: bool,
	pub created_at: DateTime<Utc>,
}

/// The state machine driving one fee bump end to end.
#[derive(Debug)]
pub struct FeeBumpOperation {
	config: WalletConfig,
	psbt_version: PsbtVersionChoice,
	status: FeeBumpStatus,
	analyzer: Option<TxAnalyzer>,
	analysis: Option<TxAnalysis>,
	result: Option<FeeBumpResult>,
}

impl FeeBumpOperation {
	pub fn new(config: WalletConfig, psbt_version: PsbtVersionChoice) -> Self {
		Self {
			config,
			psbt_version,
			status: FeeBumpStatus::Idle,
			analyzer: None,
			analysis: None,
			result: None,
		}
	}

	pub fn status(&self) -> FeeBumpStatus {
		self.status
	}

	pub fn analysis(&self) -> Option<&TxAnalysis> {
		self.analysis.as_ref()
	}

	pub fn result(&self) -> Option<&FeeBumpResult> {
		self.result.as_ref()
	}

	/// Clears all state back to idle. The only way out of the terminal
	/// states.
	pub fn reset(&mut self) {
		self.status = FeeBumpStatus::Idle;
		self.analyzer = None;
		self.analysis = None;
		self.result = None;
	}

	/// Fetches fee estimates for every priority, substituting a conservative
	/// fallback when the source fails.
	pub async fn fetch_fee_estimates<C: ChainReader + ?Sized>(chain: &C) -> FeeEstimates {
		FeeEstimates {
			high: estimate_or_fallback(chain, FeePriority::High).await,
			medium: estimate_or_fallback(chain, FeePriority::Medium).await,
			low: estimate_or_fallback(chain, FeePriority::Low).await,
		}
	}

	/// Analyzes the requested transaction and moves to ready.
	pub async fn analyze<C: ChainReader + ?Sized>(
		&mut self, chain: &C, request: AnalyzeRequest,
	) -> Result<&TxAnalysis, Error> {
		if self.status != FeeBumpStatus::Idle {
			return Err(Error::InvalidState { status: self.status, operation: "analyze" });
		}
		self.status = FeeBumpStatus::Analyzing;
		match self.analyze_inner(chain, request).await {
			Ok(analyzer) => {
				let analysis = analyzer.analyze();
				log::info!(
					"Analyzed {}: {:.2} sat/vB toward {:.2}, recommending {}",
					analysis.txid,
					analysis.fee_rate,
					analysis.target_fee_rate,
					analysis.recommended_strategy
				);
				self.analyzer = Some(analyzer);
				self.analysis = Some(analysis);
				self.status = FeeBumpStatus::Ready;
				Ok(self.analysis.as_ref().unwrap())
			},
			Err(e) => {
				log::error!("Fee-bump analysis failed: {}", e);
				self.status = FeeBumpStatus::Failed;
				Err(e)
			},
		}
	}

	async fn analyze_inner<C: ChainReader + ?Sized>(
		&self, chain: &C, request: AnalyzeRequest,
	) -> Result<TxAnalyzer, Error> {
		let details = fetch_with_hex(chain, &request.txid).await?;
		let tx_hex = details
			.hex
			.clone()
			.ok_or(Error::TransactionHexMissing(request.txid))?;
		let absolute_fee_sats = transaction_fee(&details)?;

		let target_fee_rate = match request.target_fee_rate {
			Some(rate) => rate,
			None => estimate_or_fallback(chain, request.priority).await,
		};

		TxAnalyzer::new(AnalyzerOptions {
			tx_hex,
			absolute_fee_sats,
			target_fee_rate,
			available_inputs: request.available_inputs,
			change_output_index: request.change_output_index,
			assume_full_rbf: request.assume_full_rbf,
			config: self.config.clone(),
		})
	}

	/// Builds an accelerated replacement from the ready analysis.
	///
	/// When the options name no change destination, the analysis change index
	/// and then the wallet's default change address are tried in turn.
	pub fn create_accelerated(
		&mut self, mut opts: AcceleratedRbfOptions,
	) -> Result<&FeeBumpResult, Error> {
		let analyzer = self.begin_create("create_accelerated")?;
		if opts.change_address.is_none() && opts.change_index.is_none() {
			opts.change_index = analyzer.options().change_output_index;
		}
		if opts.change_address.is_none() && opts.change_index.is_none() {
			opts.change_address = self.config.default_change_address.clone();
		}
		let built = create_accelerated_rbf(&analyzer, &opts);
		self.finish_create(built, FeeBumpStrategy::Rbf, false)
	}

	/// Builds a cancellation replacement from the ready analysis.
	pub fn create_cancel(&mut self, opts: CancelRbfOptions) -> Result<&FeeBumpResult, Error> {
		let analyzer = self.begin_create("create_cancel")?;
		let built = create_cancel_rbf(&analyzer, &opts);
		self.finish_create(built, FeeBumpStrategy::Rbf, true)
	}

	/// Builds a CPFP child from the ready analysis.
	pub fn create_cpfp(&mut self, mut opts: CpfpOptions) -> Result<&FeeBumpResult, Error> {
		let analyzer = self.begin_create("create_cpfp")?;
		if opts.change_address.is_empty() {
			opts.change_address =
				self.config.default_change_address.clone().unwrap_or_default();
		}
		let built = create_cpfp(&analyzer, &opts);
		self.finish_create(built, FeeBumpStrategy::Cpfp, false)
	}

	fn begin_create(&mut self, operation: &'static str) -> Result<TxAnalyzer, Error> {
		if self.status != FeeBumpStatus::Ready {
			return Err(Error::InvalidState { status: self.status, operation });
		}
		self.status = FeeBumpStatus::Creating;
		// Ready implies the analyzer is present.
		Ok(self.analyzer.clone().expect("analyzer present in ready state"))
	}

	fn finish_create(
		&mut self, built: Result<BuiltPsbt, Error>, strategy: FeeBumpStrategy, is_cancel: bool,
	) -> Result<&FeeBumpResult, Error> {
		match built.and_then(|b| self.encode_result(b, strategy, is_cancel)) {
			Ok(result) => {
				self.result = Some(result);
				self.status = FeeBumpStatus::Success;
				Ok(self.result.as_ref().unwrap())
			},
			Err(e) => {
				log::error!("Fee-bump creation failed: {}", e);
				self.status = FeeBumpStatus::Failed;
				Err(e)
			},
		}
	}

	fn encode_result(
		&self, built: BuiltPsbt, strategy: FeeBumpStrategy, is_cancel: bool,
	) -> Result<FeeBumpResult, Error> {
		let psbt_base64 = match self.psbt_version {
			PsbtVersionChoice::V0 => BASE64_STANDARD.encode(built.psbt.to_v0()?),
			PsbtVersionChoice::V2 => built.psbt.to_base64(),
		};
		Ok(FeeBumpResult {
			psbt_base64,
			new_fee_sats: built.fee_sats,
			new_fee_rate: built.fee_sats as f64 / built.vsize as f64,
			strategy,
			is_cancel,
			created_at: Utc::now(),
		})
	}
}

async fn estimate_or_fallback<C: ChainReader + ?Sized>(chain: &C, priority: FeePriority) -> f64 {
	match chain.estimate_fee_rate(priority.target_blocks()).await {
		Ok(rate) if rate.is_finite() && rate > 0.0 => rate,
		Ok(rate) => {
			log::warn!(
				"Chain source returned unusable fee rate {} for {} blocks, using fallback",
				rate,
				priority.target_blocks()
			);
			priority.fallback_fee_rate()
		},
		Err(e) => {
			log::warn!(
				"Fee estimation failed for {} blocks ({}), using fallback",
				priority.target_blocks(),
				e
			);
			priority.fallback_fee_rate()
		},
	}
}

fn transaction_fee(details: &crate::types::TransactionDetails) -> Result<u64, Error> {
	if let Some(fee) = details.fee_sats {
		return Ok(fee);
	}
	// Derive it from the input/output sums when the backend resolved every
	// prevout.
	if crate::value::has_complete_input_data(details) {
		let input: u64 = details
			.vin
			.iter()
			.filter_map(|i| i.prevout.as_ref().map(|p| p.value_sats))
			.sum();
		let output: u64 = details.vout.iter().map(|o| o.value_sats).sum();
		return input
			.checked_sub(output)
			.ok_or_else(|| Error::InvalidTransaction("outputs exceed inputs".to_string()));
	}
	Err(Error::InvalidTransaction(format!("fee unknown for {}", details.txid)))
}
