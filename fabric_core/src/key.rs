//! Registry key schema: `<prefix> '/' <id>`.
//!
//! Mirrors `original_source/lib/etcd/clients.go`: a single forward-slash
//! delimiter, first field is the prefix, second is the lease/instance id.

/// The single delimiter separating a registry key's prefix from its id.
pub const DELIMITER: char = '/';

const INDEX_OF_KEY: usize = 0;
const INDEX_OF_ID: usize = 1;

fn extract(key: &str, index: usize) -> Option<&str> {
    key.split(DELIMITER)
        .filter(|field| !field.is_empty())
        .nth(index)
}

/// Extracts the leading `prefix` segment of a registry key.
pub fn extract_key(key: &str) -> Option<&str> {
    extract(key, INDEX_OF_KEY)
}

/// Extracts the trailing id segment of a registry key.
pub fn extract_id(key: &str) -> Option<&str> {
    extract(key, INDEX_OF_ID)
}

/// Builds a registry key from a prefix and a decimal lease id.
pub fn make_key(prefix: &str, id: i64) -> String {
    format!("{prefix}{DELIMITER}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_prefix_and_id() {
        let key = make_key("svc.user", 12345);
        assert_eq!(key, "svc.user/12345");
        assert_eq!(extract_key(&key), Some("svc.user"));
        assert_eq!(extract_id(&key), Some("12345"));
    }

    #[test]
    fn rejects_unrelated_keys() {
        assert_eq!(extract_key("no-delimiter-here"), Some("no-delimiter-here"));
        assert_eq!(extract_id("no-delimiter-here"), None);
    }

    #[test]
    fn ignores_leading_empty_fields() {
        // a key with a leading slash still yields prefix then id
        assert_eq!(extract_key("/svc/42"), Some("svc"));
        assert_eq!(extract_id("/svc/42"), Some("42"));
    }
}
