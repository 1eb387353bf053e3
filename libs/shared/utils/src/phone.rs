use std::sync::OnceLock;

use regex::Regex;

// Strict E.164: + followed by 1-15 digits, leading digit non-zero
fn e164_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+[1-9]\d{1,14}$").unwrap())
}

pub fn is_valid_e164(number: &str) -> bool {
    e164_pattern().is_match(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_us_numbers() {
        assert!(is_valid_e164("+12125551234"));
        assert!(is_valid_e164("+442071234567"));
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(!is_valid_e164("12125551234"));
        assert!(!is_valid_e164("+02125551234"));
        assert!(!is_valid_e164("+1 212 555 1234"));
        assert!(!is_valid_e164("+"));
        assert!(!is_valid_e164(""));
        assert!(!is_valid_e164("+12345678901234567"));
    }
}
