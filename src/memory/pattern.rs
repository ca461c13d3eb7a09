use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use regex::Regex;

use crate::core::{PersistenceError, Result};

const LIKE_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(128) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

lazy_static::lazy_static! {
    static ref LIKE_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(LIKE_CACHE_CAPACITY));
}

/// Translates a LIKE pattern (`%` any run, `_` one char, `\` escape) into an
/// anchored regex.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Answers the common shapes without compiling a regex.
fn fast_path_like(text: &str, pattern: &str) -> Option<bool> {
    if pattern.contains('_') || pattern.contains('\\') {
        return None;
    }

    let wildcards = pattern.matches('%').count();
    match wildcards {
        0 => Some(text == pattern),
        1 if pattern.ends_with('%') => Some(text.starts_with(&pattern[..pattern.len() - 1])),
        1 if pattern.starts_with('%') => Some(text.ends_with(&pattern[1..])),
        2 if pattern.len() >= 2 && pattern.starts_with('%') && pattern.ends_with('%') => {
            Some(text.contains(&pattern[1..pattern.len() - 1]))
        }
        _ => None,
    }
}

fn compiled(pattern: &str) -> Result<Arc<Regex>> {
    let mut cache = LIKE_CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(regex) = cache.get(pattern) {
        return Ok(Arc::clone(regex));
    }

    let regex = Regex::new(&like_to_regex(pattern))
        .map_err(|e| PersistenceError::Execution(format!("Invalid LIKE pattern: {}", e)))?;
    let regex = Arc::new(regex);
    cache.put(pattern.to_string(), Arc::clone(&regex));
    Ok(regex)
}

pub(crate) fn eval_like(text: &str, pattern: &str) -> Result<bool> {
    if let Some(matched) = fast_path_like(text, pattern) {
        return Ok(matched);
    }

    Ok(compiled(pattern)?.is_match(text))
}
