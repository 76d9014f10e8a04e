// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Canonical identification of transaction inputs.
//!
//! Every subsystem that talks about a spendable output uses the same
//! `txid:index` form, with the txid in display (big-endian) hex. Sets and
//! maps keyed by [`InputId`] are how the matcher and the reconstruction
//! engine agree on which outputs they mean.

use bitcoin::{OutPoint, Psbt, Txid};

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A `txid:index` reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputId {
	/// The funding transaction, in display byte order.
	pub txid: Txid,
	/// The output index on the funding transaction.
	pub index: u32,
}

impl InputId {
	pub fn new(txid: Txid, index: u32) -> Self {
		Self { txid, index }
	}
}

impl From<OutPoint> for InputId {
	fn from(op: OutPoint) -> Self {
		Self { txid: op.txid, index: op.vout }
	}
}

impl From<InputId> for OutPoint {
	fn from(id: InputId) -> Self {
		OutPoint { txid: id.txid, vout: id.index }
	}
}

impl fmt::Display for InputId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.txid, self.index)
	}
}

impl FromStr for InputId {
	type Err = crate::error::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (txid, index) = s
			.rsplit_once(':')
			.ok_or_else(|| crate::error::Error::InvalidOptions(format!("malformed input id: {}", s)))?;
		let txid = Txid::from_str(txid)
			.map_err(|e| crate::error::Error::InvalidOptions(format!("bad txid in {}: {}", s, e)))?;
		let index = index
			.parse::<u32>()
			.map_err(|e| crate::error::Error::InvalidOptions(format!("bad index in {}: {}", s, e)))?;
		Ok(Self { txid, index })
	}
}

/// Returns the identifiers of every input a PSBT wants to spend.
///
/// The unsigned transaction stores txids in little-endian byte order;
/// [`Txid`]'s display form already normalizes to big-endian hex.
pub fn input_ids(psbt: &Psbt) -> HashSet<InputId> {
	psbt.unsigned_tx.input.iter().map(|txin| InputId::from(txin.previous_output)).collect()
}

/// Looks up the sequence number the PSBT assigns to the given input.
pub fn sequence_for_input(psbt: &Psbt, id: &InputId) -> Option<u32> {
	psbt.unsigned_tx
		.input
		.iter()
		.find(|txin| InputId::from(txin.previous_output) == *id)
		.map(|txin| txin.sequence.0)
}
