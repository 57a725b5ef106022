//! Shared helpers for the CLI.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the global tracing subscriber. Logs go to stderr so command
/// output on stdout stays machine-readable.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Mask a secret for display, keeping a short prefix and suffix.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}

/// Parse a JSON argument with a readable error.
pub fn parse_json(what: &str, raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).with_context(|| format!("{what} is not valid JSON"))
}

/// Convert a `--ttl-secs` argument, rejecting values chrono cannot hold.
pub fn ttl_from_secs(secs: i64) -> Result<chrono::Duration> {
    chrono::Duration::try_seconds(secs).ok_or_else(|| anyhow!("--ttl-secs {secs} is out of range"))
}

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush().context("failed to flush stdout")?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read answer")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_long_secrets() {
        assert_eq!(mask_secret("sk-abcdefghijklmnop"), "sk-a***********mnop");
    }

    #[test]
    fn fully_masks_short_secrets() {
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret(""), "");
    }

    #[test]
    fn ttl_conversion_rejects_overflow() {
        assert_eq!(ttl_from_secs(3600).unwrap(), chrono::Duration::hours(1));
        assert_eq!(ttl_from_secs(0).unwrap(), chrono::Duration::zero());
        assert!(ttl_from_secs(i64::MAX).is_err());
        assert!(ttl_from_secs(i64::MIN).is_err());
    }

    #[test]
    fn json_errors_name_the_argument() {
        let err = parse_json("schema", "{").unwrap_err();
        assert!(err.to_string().contains("schema"));
    }
}
