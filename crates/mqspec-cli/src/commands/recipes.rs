//! `mqspec recipes`: list the available recipes

use std::io::Write;

use mqspec_provision::{recipe_names, DEFAULT_RECIPE};

use super::format::render_table;
use crate::Result;

fn recipe_table() -> String {
    let rows: Vec<Vec<String>> = recipe_names()
        .into_iter()
        .map(|name| {
            let default = if name == DEFAULT_RECIPE { "yes" } else { "" };
            vec![name.to_string(), default.to_string()]
        })
        .collect();
    render_table(&["NAME", "DEFAULT"], &rows)
}

/// Run `mqspec recipes`
pub fn run() -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(recipe_table().as_bytes())?;
    Ok(())
}
