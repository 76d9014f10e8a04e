// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! A self-contained PSBT version 2 model per [BIP 370].
//!
//! The document is held as ordered key-value maps for the global, per-input,
//! and per-output scopes, exactly as it appears on the wire. Conversion to
//! and from version 0 ([BIP 174]) is a map shuffle: the unsigned transaction
//! is exploded into (or rebuilt from) the v2 per-input and per-output
//! fields, and every other entry is carried over untouched and in order.
//!
//! [BIP 174]: https://github.com/bitcoin/bips/blob/master/bip-0174.mediawiki
//! [BIP 370]: https://github.com/bitcoin/bips/blob/master/bip-0370.mediawiki

use crate::error::Error;

use bitcoin::absolute::LockTime;
use bitcoin::bip32::{DerivationPath, Fingerprint, Xpub};
use bitcoin::consensus::{deserialize, serialize};
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use base64::prelude::{Engine, BASE64_STANDARD};

/// `psbt` followed by `0xff`.
pub const PSBT_MAGIC: [u8; 5] = [0x70, 0x73, 0x62, 0x74, 0xff];

// Global key types.
pub(crate) const GLOBAL_UNSIGNED_TX: u8 = 0x00;
pub(crate) const GLOBAL_XPUB: u8 = 0x01;
pub(crate) const GLOBAL_TX_VERSION: u8 = 0x02;
pub(crate) const GLOBAL_FALLBACK_LOCKTIME: u8 = 0x03;
pub(crate) const GLOBAL_INPUT_COUNT: u8 = 0x04;
pub(crate) const GLOBAL_OUTPUT_COUNT: u8 = 0x05;
pub(crate) const GLOBAL_TX_MODIFIABLE: u8 = 0x06;
pub(crate) const GLOBAL_VERSION: u8 = 0xfb;

// Input key types.
pub(crate) const IN_NON_WITNESS_UTXO: u8 = 0x00;
pub(crate) const IN_WITNESS_UTXO: u8 = 0x01;
pub(crate) const IN_REDEEM_SCRIPT: u8 = 0x04;
pub(crate) const IN_WITNESS_SCRIPT: u8 = 0x05;
pub(crate) const IN_BIP32_DERIVATION: u8 = 0x06;
pub(crate) const IN_PREVIOUS_TXID: u8 = 0x0e;
pub(crate) const IN_OUTPUT_INDEX: u8 = 0x0f;
pub(crate) const IN_SEQUENCE: u8 = 0x10;
pub(crate) const IN_REQUIRED_TIME_LOCKTIME: u8 = 0x11;
pub(crate) const IN_REQUIRED_HEIGHT_LOCKTIME: u8 = 0x12;

// Output key types.
pub(crate) const OUT_BIP32_DERIVATION: u8 = 0x02;
pub(crate) const OUT_AMOUNT: u8 = 0x03;
pub(crate) const OUT_SCRIPT: u8 = 0x04;

// Key types that exist only in one version and are stripped when converting
// to the other.
const V2_ONLY_GLOBAL: [u8; 6] = [
	GLOBAL_TX_VERSION,
	GLOBAL_FALLBACK_LOCKTIME,
	GLOBAL_INPUT_COUNT,
	GLOBAL_OUTPUT_COUNT,
	GLOBAL_TX_MODIFIABLE,
	GLOBAL_VERSION,
];
const V2_ONLY_INPUT: [u8; 5] = [
	IN_PREVIOUS_TXID,
	IN_OUTPUT_INDEX,
	IN_SEQUENCE,
	IN_REQUIRED_TIME_LOCKTIME,
	IN_REQUIRED_HEIGHT_LOCKTIME,
];
const V2_ONLY_OUTPUT: [u8; 2] = [OUT_AMOUNT, OUT_SCRIPT];

/// An insertion-ordered key-value map, keys held as raw bytes including the
/// key type prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct KvMap(Vec<(Vec<u8>, Vec<u8>)>);

impl KvMap {
	fn get(&self, key: &[u8]) -> Option<&[u8]> {
		self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_slice())
	}

	fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
		match self.0.iter_mut().find(|(k, _)| *k == key) {
			Some(entry) => entry.1 = value,
			None => self.0.push((key, value)),
		}
	}

	fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
		self.0.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
	}

	/// Entries of the given single-byte key type, `(key_data, value)`.
	fn of_type(&self, key_type: u8) -> impl Iterator<Item = (&[u8], &[u8])> {
		self.iter().filter(move |(k, _)| k.first() == Some(&key_type)).map(|(k, v)| (&k[1..], v))
	}

	fn retain_except_types(&self, excluded: &[u8]) -> KvMap {
		KvMap(
			self.0
				.iter()
				.filter(|(k, _)| k.first().map_or(true, |t| !excluded.contains(t)))
				.cloned()
				.collect(),
		)
	}
}

struct Reader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Self { buf, pos: 0 }
	}

	fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
		// Declared lengths are attacker-controlled; `pos + n` may overflow.
		if n > self.buf.len() - self.pos {
			return Err(Error::InvalidPsbt("unexpected end of data".to_string()));
		}
		let slice = &self.buf[self.pos..self.pos + n];
		self.pos += n;
		Ok(slice)
	}

	fn u8(&mut self) -> Result<u8, Error> {
		Ok(self.take(1)?[0])
	}

	fn compact_size(&mut self) -> Result<u64, Error> {
		let first = self.u8()?;
		Ok(match first {
			0xfd => u16::from_le_bytes(self.take(2)?.try_into().unwrap()) as u64,
			0xfe => u32::from_le_bytes(self.take(4)?.try_into().unwrap()) as u64,
			0xff => u64::from_le_bytes(self.take(8)?.try_into().unwrap()),
			n => n as u64,
		})
	}

	fn done(&self) -> bool {
		self.pos >= self.buf.len()
	}
}

pub(crate) fn write_compact_size(out: &mut Vec<u8>, n: u64) {
	match n {
		0..=0xfc => out.push(n as u8),
		0xfd..=0xffff => {
			out.push(0xfd);
			out.extend_from_slice(&(n as u16).to_le_bytes());
		},
		0x10000..=0xffff_ffff => {
			out.push(0xfe);
			out.extend_from_slice(&(n as u32).to_le_bytes());
		},
		_ => {
			out.push(0xff);
			out.extend_from_slice(&n.to_le_bytes());
		},
	}
}

pub(crate) fn compact_size_vec(n: u64) -> Vec<u8> {
	let mut out = Vec::with_capacity(9);
	write_compact_size(&mut out, n);
	out
}

fn read_compact_value(value: &[u8]) -> Result<u64, Error> {
	let mut reader = Reader::new(value);
	let n = reader.compact_size()?;
	if !reader.done() {
		return Err(Error::InvalidPsbt("trailing bytes in count".to_string()));
	}
	Ok(n)
}

fn read_map(reader: &mut Reader<'_>) -> Result<KvMap, Error> {
	let mut map = KvMap::default();
	loop {
		let key_len = reader.compact_size()? as usize;
		if key_len == 0 {
			return Ok(map);
		}
		let key = reader.take(key_len)?.to_vec();
		let value_len = reader.compact_size()? as usize;
		let value = reader.take(value_len)?.to_vec();
		if map.get(&key).is_some() {
			return Err(Error::InvalidPsbt("duplicate map key".to_string()));
		}
		map.insert(key, value);
	}
}

fn write_map(out: &mut Vec<u8>, map: &KvMap) {
	for (key, value) in map.iter() {
		write_compact_size(out, key.len() as u64);
		out.extend_from_slice(key);
		write_compact_size(out, value.len() as u64);
		out.extend_from_slice(value);
	}
	out.push(0x00);
}

fn u32_value(value: &[u8], what: &str) -> Result<u32, Error> {
	let bytes: [u8; 4] = value
		.try_into()
		.map_err(|_| Error::InvalidPsbt(format!("{} must be 4 bytes", what)))?;
	Ok(u32::from_le_bytes(bytes))
}

/// A parsed PSBT version 2 document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsbtV2 {
	global: KvMap,
	inputs: Vec<KvMap>,
	outputs: Vec<KvMap>,
}

impl PsbtV2 {
	/// Creates an empty v2 document for the given transaction version.
	pub fn new(tx_version: i32) -> Self {
		let mut global = KvMap::default();
		global.insert(vec![GLOBAL_VERSION], 2u32.to_le_bytes().to_vec());
		global.insert(vec![GLOBAL_TX_VERSION], tx_version.to_le_bytes().to_vec());
		global.insert(vec![GLOBAL_FALLBACK_LOCKTIME], 0u32.to_le_bytes().to_vec());
		global.insert(vec![GLOBAL_INPUT_COUNT], compact_size_vec(0));
		global.insert(vec![GLOBAL_OUTPUT_COUNT], compact_size_vec(0));
		Self { global, inputs: Vec::new(), outputs: Vec::new() }
	}

	/// Parses a serialized v2 document.
	pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
		let mut reader = Reader::new(bytes);
		if reader.take(5)? != PSBT_MAGIC {
			return Err(Error::InvalidPsbt("missing magic".to_string()));
		}
		let global = read_map(&mut reader)?;

		match global.get(&[GLOBAL_VERSION]) {
			Some(v) if u32_value(v, "version")? == 2 => {},
			Some(_) => return Err(Error::InvalidPsbt("not a v2 document".to_string())),
			None => return Err(Error::InvalidPsbt("missing global version".to_string())),
		}
		if global.get(&[GLOBAL_TX_VERSION]).is_none() {
			return Err(Error::InvalidPsbt("missing global tx version".to_string()));
		}
		if global.get(&[GLOBAL_UNSIGNED_TX]).is_some() {
			return Err(Error::InvalidPsbt("v2 document carries a v0 unsigned tx".to_string()));
		}
		let input_count = global
			.get(&[GLOBAL_INPUT_COUNT])
			.ok_or_else(|| Error::InvalidPsbt("missing input count".to_string()))
			.and_then(read_compact_value)?;
		let output_count = global
			.get(&[GLOBAL_OUTPUT_COUNT])
			.ok_or_else(|| Error::InvalidPsbt("missing output count".to_string()))
			.and_then(read_compact_value)?;

		// Counts are attacker-controlled; allocate as maps actually parse.
		let mut inputs = Vec::new();
		for _ in 0..input_count {
			inputs.push(read_map(&mut reader)?);
		}
		let mut outputs = Vec::new();
		for _ in 0..output_count {
			outputs.push(read_map(&mut reader)?);
		}
		if !reader.done() {
			return Err(Error::InvalidPsbt("trailing data after output maps".to_string()));
		}
		Ok(Self { global, inputs, outputs })
	}

	/// Serializes the document to bytes.
	pub fn serialize(&self) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(&PSBT_MAGIC);
		write_map(&mut out, &self.global);
		for input in &self.inputs {
			write_map(&mut out, input);
		}
		for output in &self.outputs {
			write_map(&mut out, output);
		}
		out
	}

	/// Serializes the document to base64 text.
	pub fn to_base64(&self) -> String {
		BASE64_STANDARD.encode(self.serialize())
	}

	pub fn version(&self) -> u32 {
		self.global.get(&[GLOBAL_VERSION]).and_then(|v| u32_value(v, "version").ok()).unwrap_or(0)
	}

	pub fn tx_version(&self) -> i32 {
		self.global
			.get(&[GLOBAL_TX_VERSION])
			.and_then(|v| <[u8; 4]>::try_from(v).ok())
			.map(i32::from_le_bytes)
			.unwrap_or(2)
	}

	pub fn fallback_locktime(&self) -> Option<u32> {
		self.global.get(&[GLOBAL_FALLBACK_LOCKTIME]).and_then(|v| u32_value(v, "locktime").ok())
	}

	pub fn input_count(&self) -> usize {
		self.inputs.len()
	}

	pub fn output_count(&self) -> usize {
		self.outputs.len()
	}

	pub fn previous_txid(&self, input: usize) -> Option<Txid> {
		let value = self.inputs.get(input)?.get(&[IN_PREVIOUS_TXID])?;
		let bytes: [u8; 32] = value.try_into().ok()?;
		Some(Txid::from_byte_array(bytes))
	}

	pub fn output_index(&self, input: usize) -> Option<u32> {
		let value = self.inputs.get(input)?.get(&[IN_OUTPUT_INDEX])?;
		u32_value(value, "output index").ok()
	}

	pub fn sequence(&self, input: usize) -> Option<u32> {
		let value = self.inputs.get(input)?.get(&[IN_SEQUENCE])?;
		u32_value(value, "sequence").ok()
	}

	/// The witness UTXO funding the given input, if present.
	pub fn witness_utxo(&self, input: usize) -> Option<TxOut> {
		let value = self.inputs.get(input)?.get(&[IN_WITNESS_UTXO])?;
		deserialize::<TxOut>(value).ok()
	}

	/// The full transaction funding the given input, if present.
	pub fn non_witness_utxo(&self, input: usize) -> Option<Transaction> {
		let value = self.inputs.get(input)?.get(&[IN_NON_WITNESS_UTXO])?;
		deserialize::<Transaction>(value).ok()
	}

	pub fn output_amount(&self, output: usize) -> Option<u64> {
		let value = self.outputs.get(output)?.get(&[OUT_AMOUNT])?;
		let bytes: [u8; 8] = value.try_into().ok()?;
		Some(i64::from_le_bytes(bytes) as u64)
	}

	pub fn output_script(&self, output: usize) -> Option<ScriptBuf> {
		let value = self.outputs.get(output)?.get(&[OUT_SCRIPT])?;
		Some(ScriptBuf::from_bytes(value.to_vec()))
	}

	/// Appends an input referencing the given outpoint. Returns its index.
	pub fn add_input(&mut self, outpoint: OutPoint, sequence: u32) -> usize {
		let mut map = KvMap::default();
		map.insert(vec![IN_PREVIOUS_TXID], outpoint.txid.to_byte_array().to_vec());
		map.insert(vec![IN_OUTPUT_INDEX], outpoint.vout.to_le_bytes().to_vec());
		map.insert(vec![IN_SEQUENCE], sequence.to_le_bytes().to_vec());
		self.inputs.push(map);
		let count = self.inputs.len();
		self.global.insert(vec![GLOBAL_INPUT_COUNT], compact_size_vec(count as u64));
		count - 1
	}

	pub fn set_input_witness_utxo(&mut self, input: usize, value_sats: u64, script: &ScriptBuf) {
		let txout =
			TxOut { value: Amount::from_sat(value_sats), script_pubkey: script.clone() };
		self.inputs[input].insert(vec![IN_WITNESS_UTXO], serialize(&txout));
	}

	pub fn set_input_non_witness_utxo(&mut self, input: usize, raw_tx: Vec<u8>) {
		self.inputs[input].insert(vec![IN_NON_WITNESS_UTXO], raw_tx);
	}

	pub fn set_input_redeem_script(&mut self, input: usize, script: &ScriptBuf) {
		self.inputs[input].insert(vec![IN_REDEEM_SCRIPT], script.to_bytes());
	}

	pub fn set_input_witness_script(&mut self, input: usize, script: &ScriptBuf) {
		self.inputs[input].insert(vec![IN_WITNESS_SCRIPT], script.to_bytes());
	}

	pub fn add_input_bip32_derivation(
		&mut self, input: usize, pubkey: &bitcoin::PublicKey, fingerprint: Fingerprint,
		path: &DerivationPath,
	) {
		let mut key = vec![IN_BIP32_DERIVATION];
		key.extend_from_slice(&pubkey.to_bytes());
		self.inputs[input].insert(key, derivation_value(fingerprint, path));
	}

	/// Appends an output paying `script`. Returns its index.
	pub fn add_output(&mut self, value_sats: u64, script: &ScriptBuf) -> usize {
		let mut map = KvMap::default();
		map.insert(vec![OUT_AMOUNT], (value_sats as i64).to_le_bytes().to_vec());
		map.insert(vec![OUT_SCRIPT], script.to_bytes());
		self.outputs.push(map);
		let count = self.outputs.len();
		self.global.insert(vec![GLOBAL_OUTPUT_COUNT], compact_size_vec(count as u64));
		count - 1
	}

	pub fn add_output_bip32_derivation(
		&mut self, output: usize, pubkey: &bitcoin::PublicKey, fingerprint: Fingerprint,
		path: &DerivationPath,
	) {
		let mut key = vec![OUT_BIP32_DERIVATION];
		key.extend_from_slice(&pubkey.to_bytes());
		self.outputs[output].insert(key, derivation_value(fingerprint, path));
	}

	pub fn add_global_xpub(&mut self, xpub: &Xpub, fingerprint: Fingerprint, path: &DerivationPath) {
		let mut key = vec![GLOBAL_XPUB];
		key.extend_from_slice(&xpub.encode());
		self.global.insert(key, derivation_value(fingerprint, path));
	}

	/// The global xpubs embedded in the document, `(xpub, fingerprint, path)`.
	pub fn global_xpubs(&self) -> Vec<(Xpub, Fingerprint, DerivationPath)> {
		self.global
			.of_type(GLOBAL_XPUB)
			.filter_map(|(key_data, value)| {
				let xpub = Xpub::decode(key_data).ok()?;
				let (fingerprint, path) = parse_derivation_value(value)?;
				Some((xpub, fingerprint, path))
			})
			.collect()
	}

	/// Converts a serialized v0 document into v2 form.
	pub fn from_v0(bytes: &[u8]) -> Result<Self, Error> {
		let mut reader = Reader::new(bytes);
		if reader.take(5)? != PSBT_MAGIC {
			return Err(Error::InvalidPsbt("missing magic".to_string()));
		}
		let v0_global = read_map(&mut reader)?;
		let raw_tx = v0_global
			.get(&[GLOBAL_UNSIGNED_TX])
			.ok_or_else(|| Error::InvalidPsbt("missing unsigned transaction".to_string()))?;
		let unsigned: Transaction = deserialize(raw_tx)
			.map_err(|e| Error::InvalidPsbt(format!("bad unsigned transaction: {}", e)))?;

		let mut v0_inputs = Vec::with_capacity(unsigned.input.len());
		for _ in 0..unsigned.input.len() {
			v0_inputs.push(read_map(&mut reader)?);
		}
		let mut v0_outputs = Vec::with_capacity(unsigned.output.len());
		for _ in 0..unsigned.output.len() {
			v0_outputs.push(read_map(&mut reader)?);
		}
		if !reader.done() {
			return Err(Error::InvalidPsbt("trailing data after output maps".to_string()));
		}

		let mut global = v0_global.retain_except_types(&[GLOBAL_UNSIGNED_TX]);
		global.insert(vec![GLOBAL_VERSION], 2u32.to_le_bytes().to_vec());
		global.insert(vec![GLOBAL_TX_VERSION], unsigned.version.0.to_le_bytes().to_vec());
		global.insert(
			vec![GLOBAL_FALLBACK_LOCKTIME],
			unsigned.lock_time.to_consensus_u32().to_le_bytes().to_vec(),
		);
		global.insert(vec![GLOBAL_INPUT_COUNT], compact_size_vec(unsigned.input.len() as u64));
		global.insert(vec![GLOBAL_OUTPUT_COUNT], compact_size_vec(unsigned.output.len() as u64));

		let inputs = unsigned
			.input
			.iter()
			.zip(v0_inputs)
			.map(|(txin, map)| {
				let mut map = map;
				map.insert(
					vec![IN_PREVIOUS_TXID],
					txin.previous_output.txid.to_byte_array().to_vec(),
				);
				map.insert(vec![IN_OUTPUT_INDEX], txin.previous_output.vout.to_le_bytes().to_vec());
				map.insert(vec![IN_SEQUENCE], txin.sequence.0.to_le_bytes().to_vec());
				map
			})
			.collect();

		let outputs = unsigned
			.output
			.iter()
			.zip(v0_outputs)
			.map(|(txout, map)| {
				let mut map = map;
				map.insert(vec![OUT_AMOUNT], txout.value.to_sat().to_le_bytes().to_vec());
				map.insert(vec![OUT_SCRIPT], txout.script_pubkey.to_bytes());
				map
			})
			.collect();

		Ok(Self { global, inputs, outputs })
	}

	/// Converts the document into serialized v0 form.
	///
	/// The unsigned transaction is rebuilt from the v2 fields, v2-only keys
	/// are stripped, and everything else is carried over in order.
	pub fn to_v0(&self) -> Result<Vec<u8>, Error> {
		let mut txins = Vec::with_capacity(self.inputs.len());
		for i in 0..self.inputs.len() {
			let txid = self
				.previous_txid(i)
				.ok_or_else(|| Error::InvalidPsbt(format!("input {} missing previous txid", i)))?;
			let vout = self
				.output_index(i)
				.ok_or_else(|| Error::InvalidPsbt(format!("input {} missing output index", i)))?;
			txins.push(TxIn {
				previous_output: OutPoint { txid, vout },
				script_sig: ScriptBuf::new(),
				sequence: Sequence(self.sequence(i).unwrap_or(0xffff_ffff)),
				witness: Witness::default(),
			});
		}

		let mut txouts = Vec::with_capacity(self.outputs.len());
		for i in 0..self.outputs.len() {
			let amount = self
				.output_amount(i)
				.ok_or_else(|| Error::InvalidPsbt(format!("output {} missing amount", i)))?;
			let script = self
				.output_script(i)
				.ok_or_else(|| Error::InvalidPsbt(format!("output {} missing script", i)))?;
			txouts.push(TxOut { value: Amount::from_sat(amount), script_pubkey: script });
		}

		let unsigned = Transaction {
			version: Version(self.tx_version()),
			lock_time: LockTime::from_consensus(self.effective_locktime()),
			input: txins,
			output: txouts,
		};

		let mut global = self.global.retain_except_types(&V2_ONLY_GLOBAL);
		let mut ordered = KvMap::default();
		ordered.insert(vec![GLOBAL_UNSIGNED_TX], serialize(&unsigned));
		for (key, value) in global.iter() {
			ordered.insert(key.to_vec(), value.to_vec());
		}
		global = ordered;

		let mut out = Vec::new();
		out.extend_from_slice(&PSBT_MAGIC);
		write_map(&mut out, &global);
		for input in &self.inputs {
			write_map(&mut out, &input.retain_except_types(&V2_ONLY_INPUT));
		}
		for output in &self.outputs {
			write_map(&mut out, &output.retain_except_types(&V2_ONLY_OUTPUT));
		}
		Ok(out)
	}

	// Locktime resolution per BIP 370: height locktimes win over time
	// locktimes, otherwise the fallback applies.
	fn effective_locktime(&self) -> u32 {
		let mut height = None;
		let mut time = None;
		for map in &self.inputs {
			if let Some(v) = map.get(&[IN_REQUIRED_HEIGHT_LOCKTIME]) {
				if let Ok(h) = u32_value(v, "height locktime") {
					height = Some(height.map_or(h, |prev: u32| prev.max(h)));
				}
			}
			if let Some(v) = map.get(&[IN_REQUIRED_TIME_LOCKTIME]) {
				if let Ok(t) = u32_value(v, "time locktime") {
					time = Some(time.map_or(t, |prev: u32| prev.max(t)));
				}
			}
		}
		height.or(time).or_else(|| self.fallback_locktime()).unwrap_or(0)
	}
}

fn derivation_value(fingerprint: Fingerprint, path: &DerivationPath) -> Vec<u8> {
	let mut value = fingerprint.to_bytes().to_vec();
	for child in path.as_ref() {
		value.extend_from_slice(&u32::from(*child).to_le_bytes());
	}
	value
}

fn parse_derivation_value(value: &[u8]) -> Option<(Fingerprint, DerivationPath)> {
	if value.len() < 4 || (value.len() - 4) % 4 != 0 {
		return None;
	}
	let fingerprint = Fingerprint::from(<[u8; 4]>::try_from(&value[..4]).ok()?);
	let children: Vec<bitcoin::bip32::ChildNumber> = value[4..]
		.chunks_exact(4)
		.map(|c| {
			bitcoin::bip32::ChildNumber::from(u32::from_le_bytes(c.try_into().unwrap()))
		})
		.collect();
	Some((fingerprint, DerivationPath::from(children)))
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::str::FromStr;

	fn txid(byte: u8) -> Txid {
		Txid::from_byte_array([byte; 32])
	}

	fn two_of_three_script() -> ScriptBuf {
		// Shape only; the exact keys are irrelevant to map plumbing.
		ScriptBuf::from_bytes(vec![0x52, 0x21, 0xaa, 0x52, 0xae])
	}

	fn sample_v2() -> PsbtV2 {
		let mut psbt = PsbtV2::new(2);
		let spk = ScriptBuf::from_bytes(vec![0x00, 0x20, 0x11]);
		let i0 = psbt.add_input(OutPoint { txid: txid(1), vout: 0 }, 0xffff_fffd);
		psbt.set_input_witness_utxo(i0, 40_000, &spk);
		psbt.set_input_witness_script(i0, &two_of_three_script());
		let i1 = psbt.add_input(OutPoint { txid: txid(2), vout: 3 }, 0xffff_fffd);
		psbt.set_input_witness_utxo(i1, 60_000, &spk);
		psbt.add_output(70_000, &ScriptBuf::from_bytes(vec![0x00, 0x14, 0x22]));
		psbt.add_output(29_000, &ScriptBuf::from_bytes(vec![0x00, 0x14, 0x33]));
		psbt
	}

	#[test]
	fn huge_declared_length_is_an_error_not_a_panic() {
		// Magic followed by a compact-size key length of u64::MAX; the
		// naive `pos + len` bounds check would overflow here.
		let mut bytes = PSBT_MAGIC.to_vec();
		bytes.push(0xff);
		bytes.extend_from_slice(&[0xff; 8]);
		assert!(PsbtV2::parse(&bytes).is_err());
		assert!(PsbtV2::from_v0(&bytes).is_err());
	}

	#[test]
	fn serialize_parse_round_trip() {
		let psbt = sample_v2();
		let parsed = PsbtV2::parse(&psbt.serialize()).unwrap();
		assert_eq!(parsed, psbt);
		assert_eq!(parsed.version(), 2);
		assert_eq!(parsed.input_count(), 2);
		assert_eq!(parsed.previous_txid(1), Some(txid(2)));
		assert_eq!(parsed.output_index(1), Some(3));
		assert_eq!(parsed.sequence(0), Some(0xffff_fffd));
		assert_eq!(parsed.output_amount(0), Some(70_000));
	}

	#[test]
	fn v0_conversion_round_trip_preserves_structure() {
		let psbt = sample_v2();
		let v0_bytes = psbt.to_v0().unwrap();

		// The v0 form must be digestible by the rust-bitcoin parser.
		let v0 = bitcoin::Psbt::deserialize(&v0_bytes).unwrap();
		assert_eq!(v0.unsigned_tx.input.len(), 2);
		assert_eq!(v0.unsigned_tx.output.len(), 2);
		assert_eq!(v0.unsigned_tx.input[1].previous_output.vout, 3);
		assert_eq!(v0.unsigned_tx.output[0].value.to_sat(), 70_000);

		let back = PsbtV2::from_v0(&v0_bytes).unwrap();
		assert_eq!(back.input_count(), psbt.input_count());
		assert_eq!(back.output_count(), psbt.output_count());
		for i in 0..psbt.input_count() {
			assert_eq!(back.previous_txid(i), psbt.previous_txid(i));
			assert_eq!(back.output_index(i), psbt.output_index(i));
			assert_eq!(back.sequence(i), psbt.sequence(i));
			assert_eq!(back.witness_utxo(i), psbt.witness_utxo(i));
		}
		for o in 0..psbt.output_count() {
			assert_eq!(back.output_amount(o), psbt.output_amount(o));
			assert_eq!(back.output_script(o), psbt.output_script(o));
		}
	}

	#[test]
	fn parse_rejects_v0_documents() {
		let v0_bytes = sample_v2().to_v0().unwrap();
		assert!(matches!(PsbtV2::parse(&v0_bytes), Err(Error::InvalidPsbt(_))));
	}

	#[test]
	fn parse_rejects_garbage_without_panicking() {
		assert!(PsbtV2::parse(b"").is_err());
		assert!(PsbtV2::parse(b"psbt").is_err());
		let mut truncated = sample_v2().serialize();
		truncated.truncate(truncated.len() / 2);
		assert!(PsbtV2::parse(&truncated).is_err());
	}

	#[test]
	fn global_xpub_survives_both_directions() {
		let xpub = Xpub::from_str(
			"xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8",
		)
		.unwrap();
		let path = DerivationPath::from_str("m/45'/0/0").unwrap();
		let fingerprint = Fingerprint::from([0xde, 0xad, 0xbe, 0xef]);

		let mut psbt = sample_v2();
		psbt.add_global_xpub(&xpub, fingerprint, &path);

		let via_v0 = PsbtV2::from_v0(&psbt.to_v0().unwrap()).unwrap();
		let xpubs = via_v0.global_xpubs();
		assert_eq!(xpubs.len(), 1);
		assert_eq!(xpubs[0].0, xpub);
		assert_eq!(xpubs[0].1, fingerprint);
		assert_eq!(xpubs[0].2, path);
	}

	#[test]
	fn base64_encoding_is_parseable() {
		let psbt = sample_v2();
		let decoded = BASE64_STANDARD.decode(psbt.to_base64()).unwrap();
		assert_eq!(PsbtV2::parse(&decoded).unwrap(), psbt);
	}
}
