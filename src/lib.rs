// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

#![crate_name = "coordinator_core"]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! # Coordinator Core
//!
//! Transaction reconciliation and fee bumping for a stateless multisig
//! coordinator.
//!
//! A coordinator serves wallets it does not hold keys for: it learns the
//! wallet's addresses and pending transactions from a chain backend, decides
//! which UTXOs a new document may spend, and produces PSBTs for the signers.
//! This crate is the reconciliation core of that service:
//!
//! * [`identifier`] names inputs canonically as `txid:index` pairs.
//! * [`value`] computes what a transaction did to the wallet, in satoshis.
//! * [`reconstruct`] rebuilds spendable UTXO records from pending
//!   transactions the backend no longer lists.
//! * [`matcher`] resolves a PSBT's inputs against live and reconstructed
//!   UTXOs in two phases.
//! * [`psbt`] normalizes PSBT v0 and v2 documents in either direction.
//! * [`feebump`] analyzes stuck transactions and builds RBF or CPFP
//!   documents through a single-flight [`FeeBumpOperation`].
//!
//! Everything chain-facing goes through the [`ChainReader`] trait, so the
//! core stays backend-agnostic and deterministic under test.
//!
//! [`FeeBumpOperation`]: feebump::FeeBumpOperation

pub mod chain;
pub mod config;
pub mod error;
pub mod feebump;
pub(crate) mod hex_utils;
pub mod identifier;
pub mod matcher;
pub mod psbt;
pub mod reconstruct;
pub mod types;
pub mod value;

pub use chain::ChainReader;
pub use config::{MultisigScriptType, WalletConfig};
pub use error::Error;
pub use identifier::InputId;
pub use matcher::{match_inputs, MatchResult};
pub use psbt::{load_psbt, PsbtV2};
pub use reconstruct::{reconstruct_utxos, Reconstruction};
pub use types::{SpendableInput, TransactionDetails};
pub use value::transaction_value;
