// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! Virtual-size estimation for m-of-n multisig spends.
//!
//! Sizes follow the conservative conventions of the Optech transaction-size
//! calculator: 72-byte ECDSA signatures, 33-byte compressed pubkeys.

use crate::config::MultisigScriptType;

/// The dimensions of a transaction to estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingParams {
	pub num_inputs: usize,
	pub num_outputs: usize,
	/// Required signers.
	pub m: usize,
	/// Total signers.
	pub n: usize,
}

const SIGNATURE_SIZE: usize = 72;
const PUBKEY_SIZE: usize = 33;

fn compact_size_len(n: usize) -> usize {
	match n {
		0..=0xfc => 1,
		0xfd..=0xffff => 3,
		0x10000..=0xffff_ffff => 5,
		_ => 9,
	}
}

/// `OP_m <n pushes of 33-byte keys> OP_n OP_CHECKMULTISIG`.
fn redeem_script_size(n: usize) -> usize {
	1 + n * (1 + PUBKEY_SIZE) + 1 + 1
}

/// One input's witness: item count, the empty CHECKMULTISIG item, `m`
/// signatures with pushes, and the witness script with its size prefix.
fn witness_size(m: usize, n: usize) -> usize {
	let redeem = redeem_script_size(n);
	compact_size_len(1 + m + 1) + 1 + m * (1 + SIGNATURE_SIZE) + compact_size_len(redeem) + redeem
}

fn p2sh_vsize(params: SizingParams) -> usize {
	let redeem = redeem_script_size(params.n);
	let redeem_push = if redeem <= 75 {
		1
	} else if redeem <= 255 {
		2
	} else {
		3
	};
	let script_sig = 1 + params.m * (1 + SIGNATURE_SIZE) + redeem_push + redeem;
	let input_size = 32 + 4 + compact_size_len(script_sig) + script_sig + 4;
	let output_size = 32;

	input_size * params.num_inputs
		+ output_size * params.num_outputs
		+ 4 + 4
		+ compact_size_len(params.num_inputs)
		+ compact_size_len(params.num_outputs)
}

fn p2wsh_vsize(params: SizingParams) -> usize {
	// prevhash (32) + index (4) + empty script_sig (1) + sequence (4)
	let input_size = 41;
	// value (8) + script length (1) + largest locking script (34)
	let output_size = 43;
	let base = 4
		+ 4 + compact_size_len(params.num_inputs)
		+ params.num_inputs * input_size
		+ compact_size_len(params.num_outputs)
		+ params.num_outputs * output_size;
	let witness = 2
		+ compact_size_len(params.num_inputs)
		+ params.num_inputs * witness_size(params.m, params.n);
	let weight = base * 3 + base + witness;
	weight.div_ceil(4)
}

fn p2sh_p2wsh_vsize(params: SizingParams) -> usize {
	// prevhash (32) + index (4) + script length (1) + P2SH-wrapped witness
	// program (34) + sequence (4)
	let input_size = 75;
	let output_size = 32;
	let base = params.num_inputs * input_size + params.num_outputs * output_size + 4 + 4 + 1 + 1;
	let witness = params.num_inputs * witness_size(params.m, params.n);
	(base * 3 + witness).div_ceil(4)
}

/// Estimates the vsize of a transaction spending same-quorum multisig inputs.
pub fn estimate_multisig_vsize(script_type: MultisigScriptType, params: SizingParams) -> usize {
	match script_type {
		MultisigScriptType::P2sh => p2sh_vsize(params),
		MultisigScriptType::P2shP2wsh => p2sh_p2wsh_vsize(params),
		MultisigScriptType::P2wsh => p2wsh_vsize(params),
	}
}
