use blake2::{Blake2s256, Digest};

const PAPER_ID_PREFIX: &str = "ml_";
const PAPER_ID_HEX_LEN: usize = 8;

/// Derives the stable paper identifier: `ml_` followed by the first 8 hex
/// characters of the BLAKE2s-256 digest of the lowercased title.
///
/// The title is hashed as UTF-8 with no trimming or locale handling, so the
/// same title always maps to the same id regardless of where it is computed.
pub fn paper_id_from_title(title: &str) -> String {
    let digest = Blake2s256::digest(title.to_lowercase().as_bytes());
    let hex = hex::encode(digest);
    format!("{}{}", PAPER_ID_PREFIX, &hex[..PAPER_ID_HEX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(paper_id_from_title("Gaussian Widgets"), "ml_fb515620");
        assert_eq!(paper_id_from_title("Attention Is All You Need"), "ml_68809685");
    }

    #[test]
    fn test_case_insensitive() {
        let a = paper_id_from_title("Foo");
        assert_eq!(a, paper_id_from_title("foo"));
        assert_eq!(a, paper_id_from_title("FOO"));
        assert_eq!(a, "ml_08d6cad8");
    }

    #[test]
    fn test_shape() {
        let id = paper_id_from_title("");
        assert_eq!(id, "ml_69217a30");
        assert_eq!(id.len(), 11);
        assert!(id[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
