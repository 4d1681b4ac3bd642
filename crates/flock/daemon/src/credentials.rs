//! Bird credentials file
//!
//! ```json
//! { "tokens": ["first-bot-token", "second-bot-token"] }
//! ```

use crate::error::{DaemonError, DaemonResult};
use flock_engine::Credential;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct CredentialsFile {
    #[serde(default)]
    tokens: Option<Vec<String>>,
}

/// Read one credential per bird, in file order.
///
/// A missing file, malformed JSON, an absent or empty token list, or a blank
/// token are all fatal.
pub fn load_credentials(path: &Path) -> DaemonResult<Vec<Credential>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        DaemonError::Credentials(format!("Cannot read {}: {}", path.display(), e))
    })?;

    let file: CredentialsFile = serde_json::from_str(&raw).map_err(|e| {
        DaemonError::Credentials(format!("Malformed {}: {}", path.display(), e))
    })?;

    let tokens = file.tokens.unwrap_or_default();
    if tokens.is_empty() {
        return Err(DaemonError::Credentials(format!(
            "No bot tokens in {}",
            path.display()
        )));
    }

    tokens
        .into_iter()
        .enumerate()
        .map(|(index, token)| {
            let token = token.trim();
            if token.is_empty() {
                Err(DaemonError::Credentials(format!("Token {index} is blank")))
            } else {
                Ok(Credential::new(token))
            }
        })
        .collect()
}
