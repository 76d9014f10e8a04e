// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Fee bumping for stuck transactions.
//!
//! [`TxAnalyzer`] inspects a transaction and recommends a strategy, the
//! `rbf` and `cpfp` modules build replacement or child documents, and
//! [`FeeBumpOperation`] drives the whole flow as a single-flight state
//! machine suitable for a coordinator backend.

pub mod analyzer;
pub mod cpfp;
pub mod operation;
pub mod rbf;
pub(crate) mod sizing;
pub mod template;

pub use analyzer::{AnalyzerOptions, TxAnalysis, TxAnalyzer};
pub use cpfp::{create_cpfp, CpfpOptions};
pub use operation::{
	AnalyzeRequest, FeeBumpOperation, FeeBumpResult, FeeEstimates, FeePriority,
	PsbtVersionChoice,
};
pub use rbf::{create_accelerated_rbf, create_cancel_rbf, AcceleratedRbfOptions, CancelRbfOptions};
pub use template::{InputTemplate, OutputTemplate, TransactionTemplate};

use crate::psbt::PsbtV2;

use std::fmt;

/// The strategy an analysis recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeBumpStrategy {
	/// The transaction already meets the target, or nothing workable exists.
	None,
	/// Replace the transaction outright per [BIP 125].
	///
	/// [BIP 125]: https://github.com/bitcoin/bips/blob/master/bip-0125.mediawiki
	Rbf,
	/// Attach a high-fee child spending the transaction's change output.
	Cpfp,
}

impl fmt::Display for FeeBumpStrategy {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::None => write!(f, "none"),
			Self::Rbf => write!(f, "rbf"),
			Self::Cpfp => write!(f, "cpfp"),
		}
	}
}

/// Lifecycle of a [`FeeBumpOperation`].
///
/// `Success` and `Failed` are terminal; only a reset leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeBumpStatus {
	Idle,
	Analyzing,
	Ready,
	Creating,
	Success,
	Failed,
}

impl fmt::Display for FeeBumpStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Idle => write!(f, "idle"),
			Self::Analyzing => write!(f, "analyzing"),
			Self::Ready => write!(f, "ready"),
			Self::Creating => write!(f, "creating"),
			Self::Success => write!(f, "success"),
			Self::Failed => write!(f, "failed"),
		}
	}
}

/// A finished fee-bump document and its headline numbers.
#[derive(Debug, Clone)]
pub struct BuiltPsbt {
	pub psbt: PsbtV2,
	/// Fee the new transaction itself pays, in satoshis.
	pub fee_sats: u64,
	/// Estimated virtual size of the new transaction once signed.
	pub vsize: usize,
}
