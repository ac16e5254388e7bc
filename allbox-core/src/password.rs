use rand::Rng;
use sha2::{Digest, Sha256};

use crate::CoreError;

pub const MIN_PASSWORD_DIGITS: usize = 4;
pub const MAX_PASSWORD_DIGITS: usize = 6;

// Baked into every stored hash; changing it orphans existing dialogs.
const PASSWORD_SALT: &str = "allbox_salt_2024";

/// Generate a uniformly random numeric dialog password of `digits` digits.
/// The first digit is never zero, so the code always renders at full width.
pub fn generate_password(digits: usize) -> Result<String, CoreError> {
    if !(MIN_PASSWORD_DIGITS..=MAX_PASSWORD_DIGITS).contains(&digits) {
        return Err(CoreError::InvalidPasswordLength { got: digits });
    }

    let low = 10_u32.pow(digits as u32 - 1);
    let high = 10_u32.pow(digits as u32);
    let value = rand::rng().random_range(low..high);
    Ok(value.to_string())
}

/// Salted SHA-256 of the password, lowercase hex. The remote dialog table
/// stores exactly this value; lookup is a plain equality query against it.
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(format!("{password}{PASSWORD_SALT}").as_bytes());
    hex::encode(digest)
}

pub fn validate_password_format(password: &str) -> Result<(), CoreError> {
    let trimmed = password.trim();
    if !(MIN_PASSWORD_DIGITS..=MAX_PASSWORD_DIGITS).contains(&trimmed.len())
        || !trimmed.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(CoreError::InvalidPasswordFormat);
    }
    Ok(())
}

/// Contents of the downloadable "forgot password" reminder file.
pub fn reminder_file_contents(dialog_name: &str, password: &str) -> String {
    let name = if dialog_name.trim().is_empty() {
        "Dialog"
    } else {
        dialog_name
    };
    format!("{name}\n\nDialog code: {password}\n\nKeep this file safe!")
}

pub fn reminder_file_name(dialog_name: &str) -> String {
    let name = if dialog_name.trim().is_empty() {
        "dialog"
    } else {
        dialog_name
    };
    format!("{name}-password.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_password_has_requested_width() {
        for digits in MIN_PASSWORD_DIGITS..=MAX_PASSWORD_DIGITS {
            let password = generate_password(digits).unwrap();
            assert_eq!(password.len(), digits);
            assert!(password.bytes().all(|b| b.is_ascii_digit()));
            assert_ne!(password.as_bytes()[0], b'0');
        }
    }

    #[test]
    fn out_of_range_length_is_rejected() {
        assert!(generate_password(3).is_err());
        assert!(generate_password(7).is_err());
    }

    #[test]
    fn hash_is_deterministic_lowercase_hex() {
        let a = hash_password("1234");
        let b = hash_password("1234");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_ne!(a, hash_password("1235"));
    }

    #[test]
    fn password_format_validation() {
        assert!(validate_password_format("1234").is_ok());
        assert!(validate_password_format(" 123456 ").is_ok());
        assert!(validate_password_format("123").is_err());
        assert!(validate_password_format("1234567").is_err());
        assert!(validate_password_format("12a4").is_err());
    }

    #[test]
    fn reminder_contents_include_name_and_code() {
        let contents = reminder_file_contents("Swift Send", "4721");
        assert!(contents.starts_with("Swift Send\n"));
        assert!(contents.contains("Dialog code: 4721"));
        assert_eq!(reminder_file_name("Swift Send"), "Swift Send-password.txt");
        assert_eq!(reminder_file_name("  "), "dialog-password.txt");
    }
}
