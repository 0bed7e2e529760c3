//! Password strength policy.
//!
//! Every rule is evaluated independently so a form can render the whole
//! checklist at once.

use std::fmt;

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// A single violated password rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PasswordViolation {
    TooShort,
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSpecial,
}

impl PasswordViolation {
    /// Message shown next to the failed rule.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::TooShort => "Password must be at least 8 characters long",
            Self::MissingUppercase => "Password must contain at least one uppercase letter",
            Self::MissingLowercase => "Password must contain at least one lowercase letter",
            Self::MissingDigit => "Password must contain at least one number",
            Self::MissingSpecial => "Password must contain at least one special character",
        }
    }
}

impl fmt::Display for PasswordViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of [`validate_password_strength`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordCheck {
    violations: Vec<PasswordViolation>,
}

impl PasswordCheck {
    /// True when no rule was violated.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// The violated rules, in rule order.
    #[must_use]
    pub fn violations(&self) -> &[PasswordViolation] {
        &self.violations
    }

    /// The violation messages, in rule order.
    #[must_use]
    pub fn messages(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.message()).collect()
    }
}

/// Checks a password against length, uppercase, lowercase, digit and
/// special-character rules, reporting every violation.
#[must_use]
pub fn validate_password_strength(password: &str) -> PasswordCheck {
    let mut violations = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push(PasswordViolation::TooShort);
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push(PasswordViolation::MissingUppercase);
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push(PasswordViolation::MissingLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push(PasswordViolation::MissingDigit);
    }
    if !password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        violations.push(PasswordViolation::MissingSpecial);
    }

    PasswordCheck { violations }
}
