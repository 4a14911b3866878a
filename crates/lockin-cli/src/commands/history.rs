use lockin_core::storage::records::FocusSessionRecord;
use lockin_core::{StoreExt, StoreKey};

use super::{open_store, print_json, CliResult};

/// Print the `limit` most recent completed sessions, newest first.
pub async fn run(limit: usize) -> CliResult {
    let store = open_store()?;
    let history: Vec<FocusSessionRecord> = store.get_or_default(StoreKey::FocusSessions).await;
    let recent: Vec<_> = history.iter().rev().take(limit).collect();
    print_json(&recent)
}
