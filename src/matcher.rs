// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Two-phase resolution of PSBT inputs against the wallet's outputs.

use crate::identifier::InputId;
use crate::types::SpendableInput;

use std::collections::HashSet;

/// The outcome of matching a PSBT's inputs against wallet outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
	/// Resolved inputs, in the PSBT's input order.
	pub matched: Vec<SpendableInput>,
	/// Identifiers the wallet could not satisfy.
	pub missing: Vec<InputId>,
}

impl MatchResult {
	/// True when every PSBT input was resolved.
	pub fn is_complete(&self) -> bool {
		self.missing.is_empty()
	}
}

/// Resolves `wanted` (in PSBT input order) against the wallet.
///
/// Phase one consults the live UTXO set; phase two falls back to outputs
/// reconstructed from pending transactions. A live match shadows any
/// reconstructed duplicate, and each identifier resolves at most once.
pub fn match_inputs(
	wanted: &[InputId], available: &[SpendableInput], reconstructed: &[SpendableInput],
) -> MatchResult {
	let mut matched = Vec::with_capacity(wanted.len());
	let mut missing = Vec::new();
	let mut found: HashSet<InputId> = HashSet::with_capacity(wanted.len());

	for id in wanted {
		if found.contains(id) {
			continue;
		}
		if let Some(live) = available.iter().find(|utxo| utxo.id() == *id) {
			found.insert(*id);
			matched.push(live.clone());
			continue;
		}
		if let Some(rebuilt) = reconstructed.iter().find(|utxo| utxo.id() == *id) {
			found.insert(*id);
			matched.push(rebuilt.clone());
			continue;
		}
		missing.push(*id);
	}

	MatchResult { matched, missing }
}
