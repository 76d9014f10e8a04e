// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Replace-by-fee construction per [BIP 125].
//!
//! Two flavors: an accelerated replacement that preserves the original
//! recipient outputs and pays a higher fee, and a cancellation that redirects
//! everything to a fresh address. Both must beat the original absolute fee
//! and the incremental-relay floor, or relays will refuse the replacement.
//!
//! [BIP 125]: https://github.com/bitcoin/bips/blob/master/bip-0125.mediawiki

use crate::config::DEFAULT_MAX_ADDITIONAL_INPUTS;
use crate::error::Error;
use crate::feebump::analyzer::TxAnalyzer;
use crate::feebump::template::{InputTemplate, OutputTemplate, TransactionTemplate};
use crate::feebump::BuiltPsbt;
use crate::identifier::InputId;
use crate::types::{SignerXpub, SpendableInput};

use bitcoin::Address;

/// Options for an accelerated (recipient-preserving) replacement.
#[derive(Debug, Clone)]
pub struct AcceleratedRbfOptions {
	/// Reuse every original input. Safer: no stray sibling replacement can
	/// confirm alongside this one.
	pub reuse_all_inputs: bool,
	/// Send surplus to this address. Mutually exclusive with `change_index`.
	pub change_address: Option<String>,
	/// Resize the original change output at this index instead.
	pub change_index: Option<usize>,
	pub global_xpubs: Vec<SignerXpub>,
}

/// Options for a cancellation replacement.
#[derive(Debug, Clone)]
pub struct CancelRbfOptions {
	pub cancel_address: String,
	pub reuse_all_inputs: bool,
	pub global_xpubs: Vec<SignerXpub>,
}

/// Builds a replacement that keeps the original recipient outputs.
pub fn create_accelerated_rbf(
	analyzer: &TxAnalyzer, opts: &AcceleratedRbfOptions,
) -> Result<BuiltPsbt, Error> {
	validate_replaceable(analyzer)?;
	let change_index = match (&opts.change_address, opts.change_index) {
		(Some(_), Some(_)) => {
			return Err(Error::InvalidOptions(
				"change address and change index are mutually exclusive".to_string(),
			));
		},
		(None, None) => return Err(Error::ChangeOutputRequired),
		(None, Some(idx)) => {
			if idx >= analyzer.transaction().output.len() {
				return Err(Error::InvalidOptions(format!(
					"change output index {} out of range",
					idx
				)));
			}
			Some(idx)
		},
		(Some(_), None) => None,
	};

	let mut template = TransactionTemplate::new(
		template_fee_rate(analyzer),
		analyzer.options().config.clone(),
		opts.global_xpubs.clone(),
	)?;

	let network = analyzer.options().config.network;
	for (idx, (txout, _)) in analyzer.original_outputs().into_iter().enumerate() {
		let address = Address::from_script(&txout.script_pubkey, network)
			.map_err(|e| Error::InvalidAddress(e.to_string()))?;
		template.add_output(OutputTemplate {
			address: address.to_string(),
			amount_sats: txout.value.to_sat(),
			locked: Some(idx) != change_index,
		});
	}

	add_original_inputs(analyzer, &mut template, opts.reuse_all_inputs)?;
	add_additional_inputs(analyzer, &mut template)?;

	if change_index.is_none() {
		if template.needs_change_output()? {
			let address = opts.change_address.clone().ok_or(Error::ChangeOutputRequired)?;
			template.add_output(OutputTemplate { address, amount_sats: 0, locked: false });
		}
	}
	template.adjust_change_output()?;

	finalize_replacement(analyzer, template)
}

/// Builds a replacement that abandons the original outputs and pays
/// everything minus fees to the cancel address.
pub fn create_cancel_rbf(
	analyzer: &TxAnalyzer, opts: &CancelRbfOptions,
) -> Result<BuiltPsbt, Error> {
	validate_replaceable(analyzer)?;
	if opts.cancel_address.is_empty() {
		return Err(Error::CancelAddressRequired);
	}

	let mut template = TransactionTemplate::new(
		template_fee_rate(analyzer),
		analyzer.options().config.clone(),
		opts.global_xpubs.clone(),
	)?;

	add_original_inputs(analyzer, &mut template, opts.reuse_all_inputs)?;
	template.add_output(OutputTemplate {
		address: opts.cancel_address.clone(),
		amount_sats: 0,
		locked: false,
	});

	// The cancel output absorbs everything the fee does not take.
	let fees = template.target_fees_sats().max(analyzer.minimum_rbf_fee_sats());
	let amount =
		template.total_input_sats().checked_sub(fees).ok_or(Error::InsufficientFunds)?;
	let dust = analyzer.options().config.dust_threshold_sats;
	if amount <= dust {
		return Err(Error::DustOutput { amount_sats: amount });
	}
	template.set_output_amount(0, amount);

	finalize_replacement(analyzer, template)
}

fn validate_replaceable(analyzer: &TxAnalyzer) -> Result<(), Error> {
	if !analyzer.signals_rbf() && !analyzer.options().assume_full_rbf {
		return Err(Error::NotReplaceable);
	}
	if !analyzer.owns_any_input() {
		return Err(Error::NoOwnedInputs);
	}
	if analyzer.options().target_fee_rate <= analyzer.fee_rate() {
		return Err(Error::InvalidOptions(format!(
			"target fee rate {:.2} sat/vB does not exceed the current {:.2} sat/vB",
			analyzer.options().target_fee_rate,
			analyzer.fee_rate()
		)));
	}
	Ok(())
}

/// The rate the template builds against: the user's target, floored so the
/// absolute BIP 125 minimum is reachable at the original's size.
fn template_fee_rate(analyzer: &TxAnalyzer) -> f64 {
	let floor_rate = analyzer.minimum_rbf_fee_sats() as f64 / analyzer.vsize() as f64;
	analyzer.options().target_fee_rate.max(floor_rate)
}

fn add_original_inputs(
	analyzer: &TxAnalyzer, template: &mut TransactionTemplate, reuse_all: bool,
) -> Result<(), Error> {
	let available = &analyzer.options().available_inputs;
	let mut added = 0usize;
	for txin in &analyzer.transaction().input {
		match available.iter().find(|u| u.outpoint == txin.previous_output) {
			Some(utxo) => {
				template.add_input(InputTemplate::from(utxo));
				added += 1;
			},
			None if reuse_all => {
				return Err(Error::Reconciliation {
					id: InputId::from(txin.previous_output),
					reason: "original input is not spendable by the wallet".to_string(),
				});
			},
			None => {},
		}
	}
	if added == 0 {
		return Err(Error::NoOwnedInputs);
	}
	Ok(())
}

fn add_additional_inputs(
	analyzer: &TxAnalyzer, template: &mut TransactionTemplate,
) -> Result<(), Error> {
	let original_txid = analyzer.txid();
	let mut candidates: Vec<&SpendableInput> = analyzer
		.options()
		.available_inputs
		.iter()
		.filter(|u| u.outpoint.txid != original_txid && !template.contains_input(&u.outpoint))
		.collect();
	candidates.sort_by(|a, b| b.amount_sats.cmp(&a.amount_sats));

	let minimum = analyzer.minimum_rbf_fee_sats();
	let mut added = 0usize;
	for candidate in candidates {
		if added >= DEFAULT_MAX_ADDITIONAL_INPUTS {
			break;
		}
		let fee = template.current_fee_sats().unwrap_or(0);
		if fee >= template.target_fees_sats() && fee >= minimum {
			break;
		}
		log::debug!(
			"Adding input {} ({} sats) to cover the replacement fee",
			candidate.id(),
			candidate.amount_sats
		);
		template.add_input(InputTemplate::from(candidate));
		added += 1;
	}
	Ok(())
}

fn finalize_replacement(
	analyzer: &TxAnalyzer, template: TransactionTemplate,
) -> Result<BuiltPsbt, Error> {
	let fee = template.current_fee_sats()?;
	if fee <= analyzer.fee_sats() {
		return Err(Error::FeeTooLow {
			required_sats: analyzer.fee_sats() + 1,
			actual_sats: fee,
		});
	}
	let minimum = analyzer.minimum_rbf_fee_sats();
	if fee < minimum {
		return Err(Error::FeeTooLow { required_sats: minimum, actual_sats: fee });
	}
	template.validate()?;

	let vsize = template.estimated_vsize();
	log::info!(
		"Built replacement for {}: {} sats over {} vbytes ({:.2} sat/vB)",
		analyzer.txid(),
		fee,
		vsize,
		fee as f64 / vsize as f64
	);
	Ok(BuiltPsbt { psbt: template.to_psbt()?, fee_sats: fee, vsize })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::feebump::analyzer::AnalyzerOptions;
	use crate::feebump::test_fixtures::{
		cancel_address, change_address, extra_input, regtest_config, stuck_tx, stuck_tx_hex,
		wallet_input_for,
	};

	fn analyzer(signals: bool, target: f64, with_inputs: bool) -> TxAnalyzer {
		let tx = stuck_tx(signals);
		let mut available = vec![];
		if with_inputs {
			available.push(wallet_input_for(&tx.input[0]));
			available.push(extra_input(0x77, 50_000));
		}
		TxAnalyzer::new(AnalyzerOptions {
			tx_hex: stuck_tx_hex(signals),
			absolute_fee_sats: 500,
			target_fee_rate: target,
			available_inputs: available,
			change_output_index: Some(1),
			assume_full_rbf: false,
			config: regtest_config(),
		})
		.unwrap()
	}

	fn accelerate_opts() -> AcceleratedRbfOptions {
		AcceleratedRbfOptions {
			reuse_all_inputs: true,
			change_address: None,
			change_index: Some(1),
			global_xpubs: vec![],
		}
	}

	#[test]
	fn rejects_unsignaled_transactions() {
		let analyzer = analyzer(false, 10.0, true);
		let err = create_accelerated_rbf(&analyzer, &accelerate_opts()).unwrap_err();
		assert_eq!(err, Error::NotReplaceable);
	}

	#[test]
	fn rejects_targets_below_the_current_rate() {
		let analyzer = analyzer(true, 1.0, true);
		assert!(matches!(
			create_accelerated_rbf(&analyzer, &accelerate_opts()),
			Err(Error::InvalidOptions(_))
		));
	}

	#[test]
	fn rejects_when_wallet_owns_nothing() {
		let analyzer = analyzer(true, 10.0, false);
		let err = create_accelerated_rbf(&analyzer, &accelerate_opts()).unwrap_err();
		assert_eq!(err, Error::NoOwnedInputs);
	}

	#[test]
	fn requires_some_change_destination() {
		let analyzer = analyzer(true, 10.0, true);
		let opts = AcceleratedRbfOptions {
			reuse_all_inputs: true,
			change_address: None,
			change_index: None,
			global_xpubs: vec![],
		};
		assert_eq!(create_accelerated_rbf(&analyzer, &opts).unwrap_err(), Error::ChangeOutputRequired);
	}

	#[test]
	fn accelerated_replacement_beats_original_fee_and_target_rate() {
		let analyzer = analyzer(true, 10.0, true);
		let built = create_accelerated_rbf(&analyzer, &accelerate_opts()).unwrap();

		assert!(built.fee_sats > analyzer.fee_sats());
		assert!(built.fee_sats >= analyzer.minimum_rbf_fee_sats());
		assert!(built.fee_sats >= (10.0 * built.vsize as f64).ceil() as u64);

		// Recipient output survives untouched; change absorbed the fee.
		assert_eq!(built.psbt.output_amount(0), Some(70_000));
		let change = built.psbt.output_amount(1).unwrap();
		assert!(change < 29_000 + 50_000);
	}

	#[test]
	fn accelerated_replacement_with_change_address_adds_fresh_change() {
		let analyzer = analyzer(true, 10.0, true);
		let opts = AcceleratedRbfOptions {
			reuse_all_inputs: true,
			change_address: Some(change_address()),
			change_index: None,
			global_xpubs: vec![],
		};
		let built = create_accelerated_rbf(&analyzer, &opts).unwrap();

		// Both original outputs locked, plus the fresh change output.
		assert_eq!(built.psbt.output_count(), 3);
		assert_eq!(built.psbt.output_amount(0), Some(70_000));
		assert_eq!(built.psbt.output_amount(1), Some(29_000));
		assert!(built.fee_sats >= (10.0 * built.vsize as f64).ceil() as u64);
	}

	#[test]
	fn cancel_pays_everything_minus_fees_to_one_output() {
		let analyzer = analyzer(true, 10.0, true);
		let opts = CancelRbfOptions {
			cancel_address: cancel_address(),
			reuse_all_inputs: true,
			global_xpubs: vec![],
		};
		let built = create_cancel_rbf(&analyzer, &opts).unwrap();

		// Only the original input funds the cancel; the extra wallet UTXO
		// stays untouched.
		assert_eq!(built.psbt.input_count(), 1);
		assert_eq!(built.psbt.output_count(), 1);
		let paid = built.psbt.output_amount(0).unwrap();
		assert_eq!(paid + built.fee_sats, 100_000);
		assert!(built.fee_sats > analyzer.fee_sats());
		assert!(built.fee_sats >= analyzer.minimum_rbf_fee_sats());
	}

	#[test]
	fn cancel_without_address_is_rejected() {
		let analyzer = analyzer(true, 10.0, true);
		let opts = CancelRbfOptions {
			cancel_address: String::new(),
			reuse_all_inputs: true,
			global_xpubs: vec![],
		};
		assert_eq!(create_cancel_rbf(&analyzer, &opts).unwrap_err(), Error::CancelAddressRequired);
	}
}
