// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

use crate::feebump::FeeBumpStatus;
use crate::identifier::InputId;

use bitcoin::Txid;

use std::fmt;

/// Errors returned by the reconciliation core.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	/// The provided options failed validation.
	InvalidOptions(String),
	/// A PSBT could not be parsed or converted.
	InvalidPsbt(String),
	/// A raw transaction could not be decoded.
	InvalidTransaction(String),
	/// An address could not be parsed for the configured network.
	InvalidAddress(String),
	/// No change output could be determined for the replacement.
	ChangeOutputRequired,
	/// A cancellation was requested without a cancel address.
	CancelAddressRequired,
	/// The raw transaction hex for a pending transaction is missing.
	TransactionHexMissing(Txid),
	/// The referenced output does not exist on the source transaction.
	OutputNotFound(InputId),
	/// The referenced output pays an address no wallet slice owns.
	OutputNotOwned(InputId),
	/// No pending transactions were supplied to reconcile against.
	NothingToReconcile,
	/// The transaction does not signal replaceability and full-RBF was not
	/// assumed.
	NotReplaceable,
	/// The wallet controls none of the original transaction's inputs.
	NoOwnedInputs,
	/// No output of the transaction can carry a CPFP child.
	CpfpNotPossible,
	/// Available inputs cannot cover the required amount.
	InsufficientFunds,
	/// The resulting fee would undercut a relay or replacement floor.
	FeeTooLow { required_sats: u64, actual_sats: u64 },
	/// The resulting fee exceeds a sanity cap.
	AbsurdFee { fee_sats: u64 },
	/// An output would be created below the dust threshold.
	DustOutput { amount_sats: u64 },
	/// A chain-reader call failed.
	Network(String),
	/// A single UTXO could not be reconstructed.
	Reconciliation { id: InputId, reason: String },
	/// The fee-bump operation was driven from an illegal state.
	InvalidState { status: FeeBumpStatus, operation: &'static str },
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::InvalidOptions(msg) => write!(f, "Invalid options: {}", msg),
			Error::InvalidPsbt(msg) => write!(f, "Invalid PSBT: {}", msg),
			Error::InvalidTransaction(msg) => write!(f, "Invalid transaction: {}", msg),
			Error::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
			Error::ChangeOutputRequired => {
				write!(f, "Could not determine change output for fee bumping")
			},
			Error::CancelAddressRequired => {
				write!(f, "A cancel address is required for cancellation")
			},
			Error::TransactionHexMissing(txid) => {
				write!(f, "Missing raw transaction hex for {}", txid)
			},
			Error::OutputNotFound(id) => write!(f, "Output {} not found", id),
			Error::OutputNotOwned(id) => write!(f, "Output {} not owned by any wallet slice", id),
			Error::NothingToReconcile => write!(f, "No pending transactions to reconcile"),
			Error::NotReplaceable => write!(f, "Transaction does not signal RBF"),
			Error::NoOwnedInputs => {
				write!(f, "None of the original transaction inputs belong to the wallet")
			},
			Error::CpfpNotPossible => write!(f, "No spendable output available for CPFP"),
			Error::InsufficientFunds => write!(f, "Insufficient funds"),
			Error::FeeTooLow { required_sats, actual_sats } => write!(
				f,
				"Fee too low: {} sats required, {} sats provided",
				required_sats, actual_sats
			),
			Error::AbsurdFee { fee_sats } => write!(f, "Absurdly high fee: {} sats", fee_sats),
			Error::DustOutput { amount_sats } => {
				write!(f, "Output of {} sats is below the dust threshold", amount_sats)
			},
			Error::Network(msg) => write!(f, "Chain reader failure: {}", msg),
			Error::Reconciliation { id, reason } => {
				write!(f, "Failed to reconstruct {}: {}", id, reason)
			},
			Error::InvalidState { status, operation } => {
				write!(f, "Cannot {} while {}", operation, status)
			},
		}
	}
}

impl std::error::Error for Error {}

impl From<bitcoin::psbt::Error> for Error {
	fn from(e: bitcoin::psbt::Error) -> Self {
		Self::InvalidPsbt(e.to_string())
	}
}

impl From<bitcoin::consensus::encode::Error> for Error {
	fn from(e: bitcoin::consensus::encode::Error) -> Self {
		Self::InvalidTransaction(e.to_string())
	}
}

impl From<bitcoin::address::ParseError> for Error {
	fn from(e: bitcoin::address::ParseError) -> Self {
		Self::InvalidAddress(e.to_string())
	}
}
