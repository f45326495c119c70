//! `clusreg guid` — generate and check GUID text.

use anyhow::{Context, Result};
use clusreg_core::Guid;

pub fn new() -> Result<()> {
    println!("{}", Guid::generate());
    Ok(())
}

/// Print the canonical form and the 16 stored bytes of `text`. Braces
/// around the text are accepted.
pub fn check(text: &str) -> Result<()> {
    let guid: Guid = text
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .parse()
        .with_context(|| format!("'{text}' is not a GUID"))?;
    println!("{guid}");
    println!("{}", hex::encode(guid.to_bytes()));
    Ok(())
}
