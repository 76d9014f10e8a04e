// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! PSBT version detection and normalization.
//!
//! Coordinators receive PSBTs from wallets of every vintage: raw bytes,
//! base64 or hex text, version 0 or version 2. [`load_psbt`] accepts all of
//! them and hands back a uniform v0 handle; [`PsbtV2`] is the native v2
//! model used when producing documents.

mod v2;

pub use v2::PsbtV2;

use crate::error::Error;

use bitcoin::Psbt;

use base64::prelude::{Engine, BASE64_STANDARD};

/// Whether the data already starts with the PSBT magic bytes.
pub fn is_binary_psbt(data: &[u8]) -> bool {
	data.starts_with(&v2::PSBT_MAGIC)
}

/// Normalizes raw-binary, base64, or hex input into PSBT bytes.
pub fn decode_psbt_input(data: &[u8]) -> Result<Vec<u8>, Error> {
	if is_binary_psbt(data) {
		return Ok(data.to_vec());
	}
	let text = std::str::from_utf8(data)
		.map_err(|_| Error::InvalidPsbt("neither PSBT bytes nor text".to_string()))?
		.trim();
	if let Ok(bytes) = BASE64_STANDARD.decode(text) {
		if is_binary_psbt(&bytes) {
			return Ok(bytes);
		}
	}
	if let Some(bytes) = crate::hex_utils::to_vec(text) {
		if is_binary_psbt(&bytes) {
			return Ok(bytes);
		}
	}
	Err(Error::InvalidPsbt("unrecognized PSBT encoding".to_string()))
}

/// Reads the declared version of a serialized PSBT.
///
/// Scans the global map leniently, so it works on both v0 and v2 documents.
/// Absence of the version key means version 0.
pub fn psbt_version(bytes: &[u8]) -> Result<u32, Error> {
	if !is_binary_psbt(bytes) {
		return Err(Error::InvalidPsbt("missing magic".to_string()));
	}
	let mut pos = v2::PSBT_MAGIC.len();
	loop {
		let key_len = read_compact_size(bytes, &mut pos)? as usize;
		if key_len == 0 {
			return Ok(0);
		}
		let key = take(bytes, &mut pos, key_len)?;
		let value_len = read_compact_size(bytes, &mut pos)? as usize;
		let value = take(bytes, &mut pos, value_len)?;
		if key == [0xfb] {
			let value: [u8; 4] = value
				.try_into()
				.map_err(|_| Error::InvalidPsbt("version must be 4 bytes".to_string()))?;
			return Ok(u32::from_le_bytes(value));
		}
	}
}

/// Whether the input is a version 2 PSBT. Never panics; malformed input is
/// simply not v2.
pub fn is_v2(data: &[u8]) -> bool {
	decode_psbt_input(data).and_then(|bytes| psbt_version(&bytes)).map_or(false, |v| v == 2)
}

/// Parses any supported PSBT input into a uniform v0 handle.
///
/// Version 2 documents are converted through [`PsbtV2::to_v0`] first.
pub fn load_psbt(data: &[u8]) -> Result<Psbt, Error> {
	let bytes = decode_psbt_input(data)?;
	let bytes = match psbt_version(&bytes)? {
		0 => bytes,
		2 => PsbtV2::parse(&bytes)?.to_v0()?,
		other => {
			return Err(Error::InvalidPsbt(format!("unsupported PSBT version {}", other)));
		},
	};
	Psbt::deserialize(&bytes).map_err(|e| Error::InvalidPsbt(e.to_string()))
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], Error> {
	// Declared lengths are attacker-controlled; `pos + n` may overflow.
	if n > bytes.len() - *pos {
		return Err(Error::InvalidPsbt("unexpected end of data".to_string()));
	}
	let slice = &bytes[*pos..*pos + n];
	*pos += n;
	Ok(slice)
}

fn read_compact_size(bytes: &[u8], pos: &mut usize) -> Result<u64, Error> {
	let first = take(bytes, pos, 1)?[0];
	Ok(match first {
		0xfd => u16::from_le_bytes(take(bytes, pos, 2)?.try_into().unwrap()) as u64,
		0xfe => u32::from_le_bytes(take(bytes, pos, 4)?.try_into().unwrap()) as u64,
		0xff => u64::from_le_bytes(take(bytes, pos, 8)?.try_into().unwrap()),
		n => n as u64,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	use bitcoin::hashes::Hash;
	use bitcoin::{OutPoint, ScriptBuf, Txid};

	fn sample_v2() -> PsbtV2 {
		let mut psbt = PsbtV2::new(2);
		let spk = ScriptBuf::from_bytes(vec![0x00, 0x20, 0x01]);
		let i0 = psbt.add_input(
			OutPoint { txid: Txid::from_byte_array([9; 32]), vout: 1 },
			0xffff_fffd,
		);
		psbt.set_input_witness_utxo(i0, 12_345, &spk);
		psbt.add_output(10_000, &ScriptBuf::from_bytes(vec![0x00, 0x14, 0x02]));
		psbt
	}

	#[test]
	fn probes_version_of_both_formats() {
		let v2_bytes = sample_v2().serialize();
		assert_eq!(psbt_version(&v2_bytes).unwrap(), 2);

		let v0_bytes = sample_v2().to_v0().unwrap();
		assert_eq!(psbt_version(&v0_bytes).unwrap(), 0);
	}

	#[test]
	fn is_v2_never_panics_on_garbage() {
		assert!(!is_v2(b""));
		assert!(!is_v2(b"not a psbt at all"));
		assert!(!is_v2(&[0x70, 0x73, 0x62, 0x74, 0xff, 0x01]));
		assert!(!is_v2(sample_v2().to_v0().unwrap().as_slice()));
		assert!(is_v2(sample_v2().serialize().as_slice()));
	}

	#[test]
	fn loads_v2_from_binary_base64_and_hex() {
		let psbt = sample_v2();
		let bytes = psbt.serialize();
		let b64 = psbt.to_base64();
		let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

		for input in [bytes.clone(), b64.into_bytes(), hex.into_bytes()] {
			let loaded = load_psbt(&input).unwrap();
			assert_eq!(loaded.unsigned_tx.input.len(), 1);
			assert_eq!(loaded.unsigned_tx.output[0].value.to_sat(), 10_000);
		}
	}

	#[test]
	fn loads_v0_directly() {
		let v0_bytes = sample_v2().to_v0().unwrap();
		let loaded = load_psbt(&v0_bytes).unwrap();
		assert_eq!(loaded.unsigned_tx.input[0].previous_output.vout, 1);
	}

	#[test]
	fn oversized_declared_lengths_are_errors_not_panics() {
		// Magic followed by a compact-size key length of u64::MAX.
		let mut bytes = v2::PSBT_MAGIC.to_vec();
		bytes.push(0xff);
		bytes.extend_from_slice(&[0xff; 8]);

		assert!(!is_v2(&bytes));
		assert!(psbt_version(&bytes).is_err());
		assert!(load_psbt(&bytes).is_err());
	}

	#[test]
	fn rejects_unknown_versions_and_garbage() {
		assert!(load_psbt(b"garbage").is_err());

		// A v2 document truncated mid-map must error, not panic.
		let mut bytes = sample_v2().serialize();
		bytes.truncate(bytes.len() - 3);
		assert!(load_psbt(&bytes).is_err());
	}
}
