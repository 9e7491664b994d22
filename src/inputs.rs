//! Operator-maintained input files: the wallet list and the message template.

use crate::config::InputConfig;
use crate::types::WalletAddress;
use anyhow::{anyhow, bail, Context, Result};
use nonempty::NonEmpty;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Create the input files (and their directories) empty when missing.
pub fn ensure_input_files(config: &InputConfig) -> Result<()> {
    for path in [&config.wallets_file, &config.template_file] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        if !path.exists() {
            fs::write(path, "").with_context(|| format!("failed to create {}", path.display()))?;
            info!(path = %path.display(), "created empty input file");
        }
    }
    Ok(())
}

/// Trimmed, non-blank lines of a text file.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}

/// Wallets to monitor, one base58 public key per line.
///
/// Invalid addresses and duplicates are skipped with a warning; no valid wallet at all
/// is an error.
pub fn load_wallets(path: &Path) -> Result<NonEmpty<WalletAddress>> {
    let mut seen = HashSet::new();
    let mut wallets = Vec::new();
    for line in read_lines(path)? {
        if let Err(e) = Pubkey::from_str(&line) {
            warn!(wallet = %line, error = %e, "invalid wallet address skipped");
            continue;
        }
        if seen.insert(line.clone()) {
            wallets.push(line);
        } else {
            warn!(wallet = %line, "duplicate wallet ignored");
        }
    }
    NonEmpty::from_vec(wallets).ok_or_else(|| anyhow!("no wallets in {}", path.display()))
}

/// Message template, trimmed. An empty template is an error.
pub fn load_template(path: &Path) -> Result<String> {
    let template = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .trim()
        .to_string();
    if template.is_empty() {
        bail!("no message template in {}", path.display());
    }
    Ok(template)
}
