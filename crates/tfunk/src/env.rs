//! Process environment capture

use std::collections::HashMap;

/// Build an environment map from `KEY=value` entries.
///
/// Entries split on the first `=` only, so values may contain `=`. Entries
/// without one are dropped. Keys are trimmed, values kept verbatim, and a
/// repeated key keeps its last value.
pub fn map_environment<I, S>(entries: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter_map(|entry| {
            let (key, value) = entry.as_ref().split_once('=')?;
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// The environment of this process
pub fn process_environment() -> HashMap<String, String> {
    map_environment(std::env::vars_os().map(|(key, value)| {
        format!("{}={}", key.to_string_lossy(), value.to_string_lossy())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_environment() {
        let env = map_environment(["A=1", "BAD", "B==2"]);
        assert_eq!(env.len(), 2);
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "=2");
    }

    #[test]
    fn test_keys_are_trimmed_and_last_wins() {
        let env = map_environment([" KEY =first", "KEY= second ", "EMPTY="]);
        assert_eq!(env["KEY"], " second ");
        assert_eq!(env["EMPTY"], "");
    }
}
