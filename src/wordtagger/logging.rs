//! Tracing bootstrap.
//!
//! Logs go to stderr so they never mix with command output. The filter comes
//! from `WORDTAGGER_LOG` when set (same syntax as `RUST_LOG`), otherwise
//! `wordtagger=warn`, or `wordtagger=debug` with `--verbose`.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "WORDTAGGER_LOG";

pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "wordtagger=debug"
    } else {
        "wordtagger=warn"
    }
}

/// Installs the global subscriber. Calling it again is a no-op.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_lowers_the_level() {
        assert_eq!(default_directive(false), "wordtagger=warn");
        assert_eq!(default_directive(true), "wordtagger=debug");
    }

    #[test]
    fn init_is_idempotent() {
        init_logging(false);
        init_logging(true);
    }
}
