use std::path::Path;

use anyhow::{Result, bail};
use serde_json::{Map, Value};
use tracing::info;

use crate::util::json;

/// Copy the named top-level entries from one JSON object file into another,
/// overwriting entries the target already has. A key missing from the input
/// file is an error; nothing is written in that case.
pub fn copy_entries(input: &Path, output: &Path, keys: &[String]) -> Result<()> {
    let source: Map<String, Value> = json::read_json(input)?;
    let mut target: Map<String, Value> = json::read_json(output)?;

    for key in keys {
        let Some(value) = source.get(key) else {
            bail!("key `{key}` not found in {}", input.display());
        };
        target.insert(key.clone(), value.clone());
    }

    json::write_json_pretty(output, &target)?;
    info!(
        "copied {} entries from {} into {}",
        keys.len(),
        input.display(),
        output.display()
    );
    Ok(())
}
