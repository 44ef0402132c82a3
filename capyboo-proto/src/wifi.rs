//! WiFi credentials and their validation

/// Longest SSID allowed by 802.11, in bytes
pub const MAX_SSID_LEN: usize = 32;

/// Longest WPA passphrase, in bytes
pub const MAX_PASSWORD_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("WiFi SSID must not be empty")]
    EmptySsid,
    #[error("SSID must be {MAX_SSID_LEN} bytes or less (got {0})")]
    SsidTooLong(usize),
    #[error("password must be {MAX_PASSWORD_LEN} bytes or less (got {0})")]
    PasswordTooLong(usize),
}

/// A validated SSID/password pair.
///
/// Only obtainable through [`validate`], so holding one means the length
/// bounds already hold. It is consumed when turned into a command.
#[derive(Clone, PartialEq, Eq)]
pub struct WifiCredential {
    ssid: String,
    password: String,
}

impl WifiCredential {
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for WifiCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredential")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Check the credential bounds and build a [`WifiCredential`].
///
/// The SSID is only trimmed for the emptiness check; it is kept as given.
/// Lengths are measured in bytes, any characters are accepted.
pub fn validate(ssid: &str, password: &str) -> Result<WifiCredential, ValidationError> {
    if ssid.trim().is_empty() {
        return Err(ValidationError::EmptySsid);
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(ValidationError::SsidTooLong(ssid.len()));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooLong(password.len()));
    }

    Ok(WifiCredential {
        ssid: ssid.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{MAX_PASSWORD_LEN, MAX_SSID_LEN, ValidationError, validate};

    #[test]
    fn accepts_bounds() {
        for ssid_len in [1, 8, MAX_SSID_LEN] {
            for password_len in [0, 1, 8, MAX_PASSWORD_LEN] {
                let ssid = "s".repeat(ssid_len);
                let password = "p".repeat(password_len);
                let credential = validate(&ssid, &password).unwrap();
                assert_eq!(credential.ssid(), ssid);
                assert_eq!(credential.password(), password);
            }
        }
    }

    #[test]
    fn rejects_blank_ssid() {
        assert_eq!(validate("", "secret"), Err(ValidationError::EmptySsid));
        assert_eq!(validate("  \t ", "secret"), Err(ValidationError::EmptySsid));
    }

    #[test]
    fn rejects_long_ssid() {
        let ssid = "s".repeat(MAX_SSID_LEN + 1);
        assert_eq!(validate(&ssid, ""), Err(ValidationError::SsidTooLong(33)));
    }

    #[test]
    fn rejects_long_password() {
        let password = "p".repeat(MAX_PASSWORD_LEN + 1);
        assert_eq!(
            validate("HomeNet", &password),
            Err(ValidationError::PasswordTooLong(64))
        );
    }

    #[test]
    fn ssid_is_not_trimmed() {
        let credential = validate(" HomeNet ", "").unwrap();
        assert_eq!(credential.ssid(), " HomeNet ");
    }

    #[test]
    fn length_is_bytes_not_chars() {
        // 11 chars, 33 bytes
        let ssid = "日本語日本語日本語日本";
        assert_eq!(ssid.len(), 33);
        assert_eq!(validate(ssid, ""), Err(ValidationError::SsidTooLong(33)));
    }

    #[test]
    fn debug_hides_password() {
        let credential = validate("HomeNet", "secret123").unwrap();
        let shown = format!("{credential:?}");
        assert!(shown.contains("HomeNet"));
        assert!(!shown.contains("secret123"));
    }
}
