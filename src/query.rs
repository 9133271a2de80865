use crate::error::{Error, Result};
use crate::types::PrefSnapshot;
use glob::Pattern;

/// Select preferences whose key matches any of the glob patterns (OR logic)
///
/// An empty pattern list selects nothing.
pub fn query_preferences(snapshot: &PrefSnapshot, patterns: &[&str]) -> Result<PrefSnapshot> {
    let compiled = compile_patterns(patterns)?;

    Ok(snapshot
        .iter()
        .filter(|(key, _)| matches_any(&compiled, key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect())
}

/// Compile all patterns up front so an invalid one fails before any matching
fn compile_patterns(patterns: &[&str]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(|e| Error::InvalidGlobPattern(format!("'{p}': {e}"))))
        .collect()
}

fn matches_any(patterns: &[Pattern], key: &str) -> bool {
    patterns.iter().any(|pattern| pattern.matches(key))
}
