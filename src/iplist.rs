use std::{ collections::HashSet, fs, path::Path };

use anyhow::{ Context, Result };
use tracing::debug;

/// Outcome of matching source addresses against a target repository.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Number of addresses present on both sides, before the limit.
    pub matched: usize,
    /// Addresses chosen for deletion, at most `limit` of them.
    pub selected: Vec<String>,
    pub truncated: bool,
}

/// Parses newline delimited addresses. Lines may also carry several
/// comma separated addresses; blank lines and empty entries are ignored.
pub fn parse_ip_text(text: &str) -> Vec<String> {
    let joined = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",");
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_ip_file(path: &Path) -> Result<Vec<String>> {
    debug!("reading ip list from {:?}", path);
    let s = fs::read_to_string(path).context(format!("cannot read input file {:?}", path))?;
    Ok(parse_ip_text(&s))
}

/// Removes duplicates, keeping the first occurrence of each address.
pub fn dedup(ips: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ips.iter()
        .filter(|ip| seen.insert(ip.as_str()))
        .cloned()
        .collect()
}

/// Addresses present in both lists, deduplicated, in source order.
pub fn intersect(source: &[String], target: &[String]) -> Vec<String> {
    let target: HashSet<&str> = target.iter().map(String::as_str).collect();
    dedup(source)
        .into_iter()
        .filter(|ip| target.contains(ip.as_str()))
        .collect()
}

pub fn select(source: &[String], target: &[String], limit: usize) -> Selection {
    let mut selected = intersect(source, target);
    let matched = selected.len();
    let truncated = matched > limit;
    selected.truncate(limit);
    Selection { matched, selected, truncated }
}
