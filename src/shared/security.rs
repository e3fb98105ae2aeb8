//! Usage: Token masking for logs and error messages.

const TOKEN_MASK_PREFIX_LEN: usize = 6;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;

pub(crate) fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let len = trimmed.len();
    if len <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN || !trimmed.is_ascii() {
        return "*".repeat(len.min(8));
    }

    let prefix = &trimmed[..TOKEN_MASK_PREFIX_LEN];
    let suffix = &trimmed[len - TOKEN_MASK_SUFFIX_LEN..];
    format!("{prefix}...{suffix}")
}

pub(crate) fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc.contains("token")
        || key_lc.contains("secret")
        || key_lc == "authorization"
        || key_lc == "developer-token"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_token_keeps_prefix_and_suffix() {
        assert_eq!(mask_token("1//0gAbcdef1234567890"), "1//0gA...7890");
    }

    #[test]
    fn mask_token_short_values_redacts_fully() {
        assert_eq!(mask_token("abcd"), "****");
        assert_eq!(mask_token("  "), "");
    }

    #[test]
    fn sensitive_keys_cover_oauth_fields() {
        assert!(is_sensitive_key("refresh_token"));
        assert!(is_sensitive_key("client_secret"));
        assert!(is_sensitive_key("Authorization"));
        assert!(!is_sensitive_key("email"));
    }
}
