//! Item-list input: a JSON array of base58 mint addresses.

use crate::errors::{RegistryError, Result};
use crate::shard::ItemId;
use std::path::Path;
use std::str::FromStr;

pub fn parse_item_list(raw: &str) -> Result<Vec<ItemId>> {
    let entries: Vec<String> = serde_json::from_str(raw)?;
    entries
        .iter()
        .map(|entry| ItemId::from_str(entry.trim()).map_err(|_| RegistryError::InvalidItemId(entry.clone())))
        .collect()
}

pub fn read_item_list(path: impl AsRef<Path>) -> Result<Vec<ItemId>> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    parse_item_list(&raw)
}
