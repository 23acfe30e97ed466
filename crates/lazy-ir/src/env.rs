use std::env;
use std::sync::OnceLock;

static LAZY_IR_DEBUG: OnceLock<bool> = OnceLock::new();
static LAZY_IR_LOG_GRAPH_CHANGES: OnceLock<bool> = OnceLock::new();
static LAZY_IR_SHAPE_CACHE_SIZE: OnceLock<Option<usize>> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn read_bool(name: &str) -> bool {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    }
}

/// `LAZY_IR_DEBUG`: record call-site locations on every node.
pub(crate) fn debug_enabled() -> bool {
    *LAZY_IR_DEBUG.get_or_init(|| read_bool("LAZY_IR_DEBUG"))
}

/// `LAZY_IR_LOG_GRAPH_CHANGES`: emit a debug event for every inserted node.
pub(crate) fn log_graph_changes() -> bool {
    *LAZY_IR_LOG_GRAPH_CHANGES.get_or_init(|| read_bool("LAZY_IR_LOG_GRAPH_CHANGES"))
}

/// `LAZY_IR_SHAPE_CACHE_SIZE`: overrides the per-graph shape cache capacity.
pub(crate) fn shape_cache_size() -> Option<usize> {
    *LAZY_IR_SHAPE_CACHE_SIZE.get_or_init(|| {
        let value = env::var("LAZY_IR_SHAPE_CACHE_SIZE").ok()?;
        match value.trim().parse::<usize>() {
            Ok(size) => Some(size),
            Err(_) => {
                tracing::warn!(
                    value = value.as_str(),
                    "ignoring unparsable LAZY_IR_SHAPE_CACHE_SIZE"
                );
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::parse_bool;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for value in ["1", "true", "YES", " on "] {
            assert!(parse_bool(value), "{value:?} should parse as true");
        }
        for value in ["0", "false", "off", "maybe"] {
            assert!(!parse_bool(value), "{value:?} should parse as false");
        }
    }
}
