//! Subjects of the transactional emails this crate looks for.

use std::fmt;

/// Which email to look for, identified by its subject line.
///
/// Each variant maps to one subject string. Matching against a `Subject`
/// header ignores case and surrounding whitespace, so templates that vary
/// only in capitalization ("Verify your Email" / "Verify Your Email") match
/// the same variant.
///
/// # Example
///
/// ```
/// use mail_link::TargetSubject;
///
/// assert!(TargetSubject::EmailVerification.matches("Verify your Email"));
/// assert!(TargetSubject::PasswordReset.matches("  reset password "));
/// assert!(!TargetSubject::PasswordReset.matches("Re: Reset Password"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetSubject {
    /// Password reset email ("Reset Password").
    PasswordReset,
    /// Sign-up verification email ("Verify Your Email").
    EmailVerification,
    /// Any other subject line.
    Custom(String),
}

impl TargetSubject {
    /// Returns the subject line this target stands for.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            TargetSubject::PasswordReset => "Reset Password",
            TargetSubject::EmailVerification => "Verify Your Email",
            TargetSubject::Custom(subject) => subject,
        }
    }

    /// Returns `true` if a `Subject` header value names this target.
    #[must_use]
    pub fn matches(&self, header_value: &str) -> bool {
        normalize(header_value) == normalize(self.as_str())
    }
}

impl fmt::Display for TargetSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(subject: &str) -> String {
    subject.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_subjects() {
        assert_eq!(TargetSubject::PasswordReset.as_str(), "Reset Password");
        assert_eq!(TargetSubject::EmailVerification.as_str(), "Verify Your Email");
    }

    #[test]
    fn test_matching_ignores_case() {
        let target = TargetSubject::EmailVerification;
        assert!(target.matches("Verify Your Email"));
        assert!(target.matches("Verify your Email"));
        assert!(target.matches("VERIFY YOUR EMAIL"));
    }

    #[test]
    fn test_matching_is_exact_otherwise() {
        let target = TargetSubject::PasswordReset;
        assert!(!target.matches("Other"));
        assert!(!target.matches("Reset Password now"));
        assert!(!target.matches("Fwd: Reset Password"));
    }

    #[test]
    fn test_custom_subject() {
        let target = TargetSubject::Custom("Confirm your account".into());
        assert!(target.matches("confirm your account"));
        assert_eq!(target.to_string(), "Confirm your account");
    }
}
