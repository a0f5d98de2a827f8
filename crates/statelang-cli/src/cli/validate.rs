//! `statelang validate`: load a definition and report its shape.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use statelang_core::workflow::definition::load_state_machine_file;

/// Parse and validate `file`, then print a summary to stdout.
pub fn validate(file: &Path, json: bool, quiet: bool) -> Result<()> {
    validate_to(&mut std::io::stdout().lock(), file, json, quiet)
}

/// Same as [`validate`], writing the summary to `out`. Under `quiet` a
/// valid file prints nothing.
pub fn validate_to(out: &mut impl Write, file: &Path, json: bool, quiet: bool) -> Result<()> {
    let sm = load_state_machine_file(file)
        .with_context(|| format!("invalid definition: {}", file.display()))?;

    if quiet {
        return Ok(());
    }

    let mut names: Vec<&str> = sm.states.keys().map(String::as_str).collect();
    names.sort_unstable();

    if json {
        let summary = serde_json::json!({
            "valid": true,
            "file": file.display().to_string(),
            "start_at": sm.start_at,
            "states": names,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
        return Ok(());
    }

    writeln!(out)?;
    writeln!(
        out,
        "  {} {} is valid",
        style("✓").green().bold(),
        style(file.display()).cyan()
    )?;
    writeln!(out)?;
    writeln!(out, "  {} states, starting at '{}'", names.len(), sm.start_at)?;
    for name in names {
        let kind = sm.states[name].type_name();
        writeln!(out, "    {} {}", style(format!("{kind:<9}")).dim(), name)?;
    }
    writeln!(out)?;
    Ok(())
}
