//! `pat` subcommands.

use crate::settings::Settings;
use std::io::Write;
use std::path::Path;

/// Store `token` as the personal access token in the settings file.
///
/// Other settings in the file are left untouched; the file and its parent
/// directories are created if needed.
pub fn add(path: &Path, token: &str, out: &mut dyn Write) -> anyhow::Result<()> {
    if token.trim().is_empty() {
        anyhow::bail!("PAT value cannot be empty");
    }

    let mut settings = Settings::load(path)?;
    settings.pat = Some(token.to_string());
    settings.save(path)?;

    tracing::info!(target: "pat_cli", path = %path.display(), "Stored personal access token");
    writeln!(out, "PAT successfully set in {}", path.display())?;
    writeln!(out, "The key 'pat' now holds your token.")?;
    Ok(())
}
