//! DNS query filtering module.
//!
//! Provides ad-blocking by checking queried names against a blocklist of
//! known ad/tracking domains and regex heuristics.

mod matcher;
pub mod source;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::BlockingConfig;

pub use matcher::Matcher;

/// Decides whether a queried name should be sinkholed.
pub trait Blocker: Send + Sync {
    fn should_block(&self, domain: &str) -> bool;
}

impl Blocker for Matcher {
    fn should_block(&self, domain: &str) -> bool {
        self.is_blocked(domain)
    }
}

/// Blocker that never blocks.
pub struct AllowAll;

impl Blocker for AllowAll {
    fn should_block(&self, _domain: &str) -> bool {
        false
    }
}

/// Build the blocker described by the configuration.
///
/// Bad regex rules and unreadable list files are logged and skipped.
pub fn build(config: &BlockingConfig) -> Arc<dyn Blocker> {
    if !config.enabled {
        info!("Blocking disabled, all queries will be forwarded");
        return Arc::new(AllowAll);
    }

    let mut matcher = Matcher::new();

    for pattern in &config.regex {
        if let Err(e) = matcher.add_regex(pattern) {
            error!(error = %e, "Skipping regex rule");
        }
    }

    for path in &config.lists {
        match source::load_file(path, &mut matcher) {
            Ok(count) => info!(path = %path.display(), domains = count, "Blocklist loaded"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to load blocklist"),
        }
    }

    info!(
        domains = matcher.len(),
        rules = matcher.rule_count(),
        "Blocklist ready"
    );

    Arc::new(matcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn allow_all_never_blocks() {
        assert!(!AllowAll.should_block("ads.doubleclick.net"));
        assert!(!AllowAll.should_block(""));
    }

    #[test]
    fn build_disabled_allows_everything() {
        let config = BlockingConfig {
            enabled: false,
            ..BlockingConfig::default()
        };

        let blocker = build(&config);

        assert!(!blocker.should_block("ads.example.com"));
    }

    #[test]
    fn build_skips_bad_rules_and_missing_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.0.0.0 tracker.example.net").unwrap();

        let config = BlockingConfig {
            enabled: true,
            lists: vec![file.path().to_path_buf(), "/nonexistent/list.txt".into()],
            regex: vec!["(broken".to_string(), r"^ad[s]?[\w-]*\.".to_string()],
        };

        let blocker = build(&config);

        assert!(blocker.should_block("cdn.tracker.example.net"));
        assert!(blocker.should_block("adserver.example.org"));
        assert!(!blocker.should_block("example.org"));
    }
}
