//! Durable submission ledger for playlog.
//!
//! One JSON record file holds one playlist epoch: its identity, creation
//! time, and the tracks each user submitted. [`LedgerStore`] owns the active
//! file and deduplicates track ids across the whole epoch.

// Allow large error types - rich diagnostic messages are more valuable on error paths.
#![allow(clippy::result_large_err)]

mod epoch;
mod error;
mod naming;
mod record_file;
mod store;

pub use epoch::{Epoch, UserHistory, UserId, UNSET_PLAYLIST};
pub use error::{ErrorCode, LedgerError, Result};
pub use naming::{
    file_by_date, latest_record_file, period_label, unique_name, uniquify, RECORD_EXTENSION,
};
pub use record_file::{decode, encode, is_user_key, RecordFile};
pub use store::LedgerStore;
