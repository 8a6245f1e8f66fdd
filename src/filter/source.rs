//! Local blocklist files.
//!
//! Accepts hosts files ("0.0.0.0 ads.example.com") and plain lists with
//! one domain per line. `#` starts a comment anywhere on a line.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use super::Matcher;

/// Placeholder names that hosts files map to themselves.
const IGNORED: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "0.0.0.0",
    "255.255.255.255",
];

/// Parse domains out of a blocklist.
///
/// Lines that are not valid UTF-8 are skipped; the rest of the list is
/// still read.
pub fn parse_list<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut domains = Vec::new();

    for (index, raw) in reader.split(b'\n').enumerate() {
        let raw = raw?;
        let Ok(line) = std::str::from_utf8(&raw) else {
            debug!(line = index + 1, "Skipping undecodable blocklist line");
            continue;
        };
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };

        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };
        // Hosts format: the domain is the second field
        let domain = fields.next().unwrap_or(first);

        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() || IGNORED.contains(&domain.as_str()) {
            continue;
        }
        domains.push(domain);
    }

    Ok(domains)
}

/// Load a blocklist file into the matcher, returning the number of
/// domains read.
pub fn load_file(path: &Path, matcher: &mut Matcher) -> io::Result<usize> {
    let file = File::open(path)?;
    let domains = parse_list(BufReader::new(file))?;
    for domain in &domains {
        matcher.add(domain);
    }
    Ok(domains.len())
}
