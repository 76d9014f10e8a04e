// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Wallet-level configuration and protocol constants.

use bitcoin::Network;

/// Outputs below this value are considered dust and never created.
pub const DEFAULT_DUST_THRESHOLD_SATS: u64 = 546;

/// Sequence number signaling opt-in replaceability per [BIP 125].
///
/// [BIP 125]: https://github.com/bitcoin/bips/blob/master/bip-0125.mediawiki
pub const RBF_SEQUENCE: u32 = 0xffff_fffd;

/// Any sequence below this signals replaceability.
pub(crate) const RBF_SIGNAL_THRESHOLD: u32 = 0xffff_fffe;

/// Default incremental relay fee rate in sat/vB, used for the BIP 125
/// absolute-fee floor of a replacement.
pub const DEFAULT_INCREMENTAL_RELAY_FEE_RATE: f64 = 1.0;

/// Cap on wallet inputs added on top of the originals while fee bumping.
pub const DEFAULT_MAX_ADDITIONAL_INPUTS: usize = 3;

/// Refuse to build transactions paying more than this rate.
pub const MAX_SANE_FEE_RATE_SAT_PER_VB: f64 = 1_000.0;

/// Refuse to build transactions paying more than this absolute fee.
pub const MAX_SANE_FEE_SATS: u64 = 10_000_000;

// Fallback fee rates in sat/vB when the chain reader cannot estimate,
// indexed by confirmation target.
pub(crate) const FALLBACK_FEE_RATE_1_BLOCK: f64 = 32.75;
pub(crate) const FALLBACK_FEE_RATE_3_BLOCKS: f64 = 32.75;
pub(crate) const FALLBACK_FEE_RATE_6_BLOCKS: f64 = 20.09;

/// The multisig script template a wallet's addresses are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultisigScriptType {
	/// Legacy pay-to-script-hash.
	P2sh,
	/// Nested segwit, a P2WSH witness script wrapped in P2SH.
	P2shP2wsh,
	/// Native segwit pay-to-witness-script-hash.
	P2wsh,
}

/// Static description of the multisig wallet the coordinator operates on.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletConfig {
	/// The network addresses are validated against.
	pub network: Network,
	/// Required signers (`m` in m-of-n).
	pub required_signers: usize,
	/// Total signers (`n` in m-of-n).
	pub total_signers: usize,
	/// The script template of the wallet's addresses.
	pub script_type: MultisigScriptType,
	/// Dust threshold applied to change outputs, in satoshis.
	pub dust_threshold_sats: u64,
	/// Incremental relay fee rate in sat/vB for replacement floors.
	pub incremental_relay_fee_rate: f64,
	/// The wallet's next unused change address, if the caller tracks one.
	pub default_change_address: Option<String>,
}

impl Default for WalletConfig {
	fn default() -> Self {
		Self {
			network: Network::Bitcoin,
			required_signers: 2,
			total_signers: 3,
			script_type: MultisigScriptType::P2wsh,
			dust_threshold_sats: DEFAULT_DUST_THRESHOLD_SATS,
			incremental_relay_fee_rate: DEFAULT_INCREMENTAL_RELAY_FEE_RATE,
			default_change_address: None,
		}
	}
}

impl WalletConfig {
	/// Checks quorum and threshold sanity.
	pub fn validate(&self) -> Result<(), crate::error::Error> {
		if self.required_signers == 0 || self.required_signers > self.total_signers {
			return Err(crate::error::Error::InvalidOptions(format!(
				"invalid quorum {}-of-{}",
				self.required_signers, self.total_signers
			)));
		}
		if self.dust_threshold_sats == 0 {
			return Err(crate::error::Error::InvalidOptions(
				"dust threshold must be positive".to_string(),
			));
		}
		Ok(())
	}
}
