// This file is Copyright its original authors, visible in version control history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. You may not use this file except in
// accordance with one or both of these licenses.

//! The seam to the outside world.
//!
//! The core never talks to a node directly. Everything it needs from the
//! chain goes through [`ChainReader`], so callers can back it with Core RPC,
//! Esplora, or a fixture in tests.

use crate::error::Error;
use crate::types::TransactionDetails;

use bitcoin::{Transaction, Txid};

/// Read access to the chain and mempool, plus broadcast.
///
/// Implementations are expected to be cheap to call concurrently; the
/// reconstruction engine issues one `get_transaction`/`get_transaction_hex`
/// pair per needed source transaction in parallel.
#[async_trait::async_trait]
pub trait ChainReader {
	/// Fetches the normalized details of a transaction, confirmed or pending.
	async fn get_transaction(&self, txid: &Txid) -> Result<TransactionDetails, Error>;

	/// Fetches the raw serialized transaction as hex.
	async fn get_transaction_hex(&self, txid: &Txid) -> Result<String, Error>;

	/// Estimates a fee rate in sat/vB for confirmation within
	/// `target_blocks` blocks.
	async fn estimate_fee_rate(&self, target_blocks: u16) -> Result<f64, Error>;

	/// Submits a fully signed transaction to the network.
	async fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error>;
}

/// Fetches details and raw hex for one transaction.
pub(crate) async fn fetch_with_hex<C: ChainReader + ?Sized>(
	chain: &C, txid: &Txid,
) -> Result<TransactionDetails, Error> {
	let mut details = chain.get_transaction(txid).await?;
	if details.hex.is_none() {
		details.hex = Some(chain.get_transaction_hex(txid).await?);
	}
	Ok(details)
}
