// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Child-pays-for-parent construction.
//!
//! When a stuck transaction cannot be replaced, a child spending its change
//! output can carry the package: miners judge parent and child together, so
//! the child pays enough that the combined rate meets the target.

use crate::config::DEFAULT_MAX_ADDITIONAL_INPUTS;
use crate::error::Error;
use crate::feebump::analyzer::TxAnalyzer;
use crate::feebump::template::{InputTemplate, OutputTemplate, TransactionTemplate};
use crate::feebump::BuiltPsbt;
use crate::types::{SignerXpub, SpendableInput};

/// Options for building a CPFP child.
#[derive(Debug, Clone)]
pub struct CpfpOptions {
	/// The parent's spendable (change) output, resolved with the wallet's
	/// script metadata.
	pub spendable_output: SpendableInput,
	/// Where the child sends its own change.
	pub change_address: String,
	pub global_xpubs: Vec<SignerXpub>,
}

/// Builds a child transaction lifting the parent's package fee rate to the
/// analyzer's target.
pub fn create_cpfp(analyzer: &TxAnalyzer, opts: &CpfpOptions) -> Result<BuiltPsbt, Error> {
	if !analyzer.can_cpfp() {
		return Err(Error::CpfpNotPossible);
	}
	validate_parent_output(analyzer, &opts.spendable_output)?;
	if opts.change_address.is_empty() {
		return Err(Error::ChangeOutputRequired);
	}

	let child_rate = analyzer.cpfp_child_fee_rate();
	if child_rate <= 0.0 {
		return Err(Error::InvalidOptions(
			"parent already meets the target fee rate".to_string(),
		));
	}

	let mut template = TransactionTemplate::new(
		child_rate,
		analyzer.options().config.clone(),
		opts.global_xpubs.clone(),
	)?;
	template.add_input(InputTemplate::from(&opts.spendable_output));
	template.add_output(OutputTemplate {
		address: opts.change_address.clone(),
		amount_sats: 0,
		locked: false,
	});

	add_funding_inputs(analyzer, &mut template)?;

	// Strict mode: a child whose change would be dust burns wallet funds
	// into fees, so refuse instead of silently dropping the output.
	let dust = analyzer.options().config.dust_threshold_sats;
	let available = template
		.total_input_sats()
		.checked_sub(template.target_fees_sats())
		.ok_or(Error::InsufficientFunds)?;
	if available <= dust {
		return Err(Error::DustOutput { amount_sats: available });
	}
	template.adjust_change_output()?;
	template.validate()?;

	let child_fee = template.current_fee_sats()?;
	let child_vsize = template.estimated_vsize();
	validate_package(analyzer, child_fee, child_vsize)?;

	log::info!(
		"Built CPFP child for {}: {} sats over {} vbytes lifts the package to {:.2} sat/vB",
		analyzer.txid(),
		child_fee,
		child_vsize,
		package_fee_rate(analyzer, child_fee, child_vsize)
	);
	Ok(BuiltPsbt { psbt: template.to_psbt()?, fee_sats: child_fee, vsize: child_vsize })
}

fn validate_parent_output(analyzer: &TxAnalyzer, utxo: &SpendableInput) -> Result<(), Error> {
	let expected_index = analyzer.options().change_output_index.unwrap_or_default();
	if utxo.outpoint.txid != analyzer.txid() || utxo.outpoint.vout as usize != expected_index {
		return Err(Error::InvalidOptions(
			"spendable output does not match the parent's change output".to_string(),
		));
	}
	let parent_out = &analyzer.transaction().output[expected_index];
	if parent_out.value.to_sat() != utxo.amount_sats {
		return Err(Error::InvalidOptions(
			"spendable output amount does not match the parent".to_string(),
		));
	}
	Ok(())
}

fn add_funding_inputs(
	analyzer: &TxAnalyzer, template: &mut TransactionTemplate,
) -> Result<(), Error> {
	let mut candidates: Vec<&SpendableInput> = analyzer
		.options()
		.available_inputs
		.iter()
		.filter(|u| !template.contains_input(&u.outpoint))
		.collect();
	candidates.sort_by(|a, b| b.amount_sats.cmp(&a.amount_sats));

	let dust = analyzer.options().config.dust_threshold_sats;
	let mut added = 0usize;
	for candidate in candidates {
		if added >= DEFAULT_MAX_ADDITIONAL_INPUTS {
			break;
		}
		let covers = template
			.total_input_sats()
			.checked_sub(template.target_fees_sats())
			.map_or(false, |change| change > dust);
		if covers {
			break;
		}
		log::debug!("Adding input {} to fund the CPFP child", candidate.id());
		template.add_input(InputTemplate::from(candidate));
		added += 1;
	}
	Ok(())
}

fn package_fee_rate(analyzer: &TxAnalyzer, child_fee: u64, child_vsize: usize) -> f64 {
	(analyzer.fee_sats() + child_fee) as f64 / (analyzer.vsize() + child_vsize) as f64
}

fn validate_package(analyzer: &TxAnalyzer, child_fee: u64, child_vsize: usize) -> Result<(), Error> {
	let rate = package_fee_rate(analyzer, child_fee, child_vsize);
	let target = analyzer.options().target_fee_rate;
	if rate + 0.01 < target {
		let package_vsize = analyzer.vsize() + child_vsize;
		return Err(Error::FeeTooLow {
			required_sats: (target * package_vsize as f64).ceil() as u64,
			actual_sats: analyzer.fee_sats() + child_fee,
		});
	}
	Ok(())
}
