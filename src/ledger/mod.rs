//! Ledger access
//!
//! Reads raw board accounts from the chain (or its indexer) and normalizes
//! them into [`LedgerRecord`](crate::domain::LedgerRecord)s.

pub mod fetcher;
pub mod http;

pub use fetcher::{normalize, BoardSnapshot, LedgerReader, RawBoardAccount, StateFetcher};
pub use http::{HttpLedgerReader, LedgerClientConfig};

#[cfg(test)]
pub use fetcher::MockLedgerReader;
