use uuid::Uuid;

/// Query parameter carrying the verification token.
pub const VERIFY_PARAM: &str = "verifyFp";

const VERIFY_PREFIX: &str = "verify_";

/// Generates a single-use `verifyFp` token: `verify_` followed by a random
/// UUID in its 32-digit form without dashes.
pub fn gen_verify_fp() -> String {
    format!("{VERIFY_PREFIX}{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_verify_fp_format() {
        let fp = gen_verify_fp();
        let id = fp.strip_prefix("verify_").unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!id.contains('-'));
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_verify_fp_is_single_use() {
        assert_ne!(gen_verify_fp(), gen_verify_fp());
    }
}
