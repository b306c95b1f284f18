//! Password policy and strength scoring.
//!
//! Validation is an ordered pipeline that stops at the first failing rule:
//! length, character classes, blocklist, sequential runs, repeated runs.
//! The strength score is computed independently and never gates anything;
//! it exists for UI feedback.

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

pub const MIN_LENGTH: usize = 12;
pub const MAX_LENGTH: usize = 128;

/// Characters that satisfy the symbol requirement.
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// Reference runs for sequential detection, matched forward and reversed.
const SEQUENCES: [&str; 5] = [
    "0123456789",
    "abcdefghijklmnopqrstuvwxyz",
    "qwertyuiop",
    "asdfghjkl",
    "zxcvbnm",
];

const RUN_LENGTH: usize = 4;

/// Known weak passwords, lowercase.
const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password12",
    "password123",
    "password123!",
    "password1234",
    "password1234!",
    "p@ssw0rd",
    "p@ssw0rd123",
    "p@ssw0rd123!",
    "p@ssword123!",
    "passw0rd123!",
    "123456789012",
    "1234567890ab",
    "qwerty123456",
    "qwerty123!@#",
    "qwertyuiop12",
    "letmein12345",
    "letmein123!!",
    "welcome12345",
    "welcome123!!",
    "welcome@2024",
    "welcome@2025",
    "admin1234567",
    "admin@123456",
    "administrator",
    "iloveyou1234",
    "changeme1234",
    "changeme123!",
    "trustno1trustno1",
    "football1234",
    "baseball1234",
    "sunshine1234",
    "summer2024!!",
    "winter2024!!",
    "marketplace1!",
];

/// Character classes a password must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CharClass {
    Uppercase,
    Lowercase,
    Digit,
    Symbol,
}

impl CharClass {
    pub const ALL: [CharClass; 4] = [
        CharClass::Uppercase,
        CharClass::Lowercase,
        CharClass::Digit,
        CharClass::Symbol,
    ];

    fn matches(&self, c: char) -> bool {
        match self {
            CharClass::Uppercase => c.is_ascii_uppercase(),
            CharClass::Lowercase => c.is_ascii_lowercase(),
            CharClass::Digit => c.is_ascii_digit(),
            CharClass::Symbol => SYMBOLS.contains(c),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            CharClass::Uppercase => "one uppercase letter",
            CharClass::Lowercase => "one lowercase letter",
            CharClass::Digit => "one number",
            CharClass::Symbol => "one special character",
        }
    }

    fn present_in(&self, candidate: &str) -> bool {
        candidate.chars().any(|c| self.matches(c))
    }
}

fn describe_missing(missing: &[CharClass]) -> String {
    missing
        .iter()
        .map(CharClass::describe)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The first rule a candidate password failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordViolation {
    #[error("Password must be at least {min} characters long")]
    TooShort { min: usize },

    #[error("Password must be at most {max} characters long")]
    TooLong { max: usize },

    #[error("Password must contain at least {}", describe_missing(.missing))]
    MissingComplexity { missing: Vec<CharClass> },

    #[error("Password is too common, choose a less predictable one")]
    Common,

    #[error("Password must not contain sequential characters (e.g. 1234, abcd, qwer)")]
    Sequential,

    #[error("Password must not repeat the same character 4 or more times in a row")]
    Repeated,
}

impl PasswordViolation {
    /// Stable identifier for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            PasswordViolation::TooShort { .. } => "password_too_short",
            PasswordViolation::TooLong { .. } => "password_too_long",
            PasswordViolation::MissingComplexity { .. } => "password_missing_complexity",
            PasswordViolation::Common => "password_common",
            PasswordViolation::Sequential => "password_sequential",
            PasswordViolation::Repeated => "password_repeated",
        }
    }
}

/// Run the policy pipeline, reporting only the first failing rule.
pub fn validate(candidate: &str) -> Result<(), PasswordViolation> {
    let length = candidate.chars().count();
    if length < MIN_LENGTH {
        return Err(PasswordViolation::TooShort { min: MIN_LENGTH });
    }
    if length > MAX_LENGTH {
        return Err(PasswordViolation::TooLong { max: MAX_LENGTH });
    }

    let missing: Vec<CharClass> = CharClass::ALL
        .into_iter()
        .filter(|class| !class.present_in(candidate))
        .collect();
    if !missing.is_empty() {
        return Err(PasswordViolation::MissingComplexity { missing });
    }

    if is_common(candidate) {
        return Err(PasswordViolation::Common);
    }
    if has_sequential_run(candidate) {
        return Err(PasswordViolation::Sequential);
    }
    if has_repeated_run(candidate) {
        return Err(PasswordViolation::Repeated);
    }

    Ok(())
}

/// Case-insensitive blocklist membership.
pub fn is_common(candidate: &str) -> bool {
    let lowered = candidate.to_lowercase();
    COMMON_PASSWORDS.contains(&lowered.as_str())
}

/// Whether any 4-character window, case-insensitively, appears forward or
/// reversed in one of the reference sequences.
pub fn has_sequential_run(candidate: &str) -> bool {
    let chars: Vec<char> = candidate.to_lowercase().chars().collect();
    chars.windows(RUN_LENGTH).any(|window| {
        let forward: String = window.iter().collect();
        let reversed: String = window.iter().rev().collect();
        SEQUENCES
            .iter()
            .any(|sequence| sequence.contains(&forward) || sequence.contains(&reversed))
    })
}

/// Whether any character repeats 4 or more times in a row.
pub fn has_repeated_run(candidate: &str) -> bool {
    let mut previous = None;
    let mut run = 0;
    for c in candidate.chars() {
        if previous == Some(c) {
            run += 1;
        } else {
            previous = Some(c);
            run = 1;
        }
        if run >= RUN_LENGTH {
            return true;
        }
    }
    false
}

/// Informational strength score in `[0, 100]`.
pub fn strength_score(candidate: &str) -> u8 {
    let length = candidate.chars().count();
    let distinct = candidate.chars().collect::<HashSet<_>>().len();
    let classes = CharClass::ALL
        .iter()
        .filter(|class| class.present_in(candidate))
        .count();

    let mut score = (length * 2).min(40) as i32;
    score += classes as i32 * 10;
    score += (distinct * 2).min(20) as i32;

    if is_common(candidate) {
        score -= 50;
    }
    if has_sequential_run(candidate) {
        score -= 20;
    }
    if has_repeated_run(candidate) {
        score -= 20;
    }

    score.clamp(0, 100) as u8
}

/// Label buckets for a strength score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthLabel {
    VeryWeak,
    Weak,
    Acceptable,
    Strong,
    VeryStrong,
}

impl StrengthLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrengthLabel::VeryWeak => "very weak",
            StrengthLabel::Weak => "weak",
            StrengthLabel::Acceptable => "acceptable",
            StrengthLabel::Strong => "strong",
            StrengthLabel::VeryStrong => "very strong",
        }
    }
}

impl std::fmt::Display for StrengthLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn strength_label(score: u8) -> StrengthLabel {
    match score {
        0..=29 => StrengthLabel::VeryWeak,
        30..=49 => StrengthLabel::Weak,
        50..=69 => StrengthLabel::Acceptable,
        70..=89 => StrengthLabel::Strong,
        _ => StrengthLabel::VeryStrong,
    }
}

/// Violation as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationReport {
    pub code: &'static str,
    pub message: String,
}

impl From<&PasswordViolation> for ViolationReport {
    fn from(violation: &PasswordViolation) -> Self {
        Self {
            code: violation.code(),
            message: violation.to_string(),
        }
    }
}

/// Verdict plus strength feedback for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<ViolationReport>,
    pub score: u8,
    pub label: StrengthLabel,
}

impl PasswordReport {
    pub fn evaluate(candidate: &str) -> Self {
        let violation = validate(candidate).err();
        let score = strength_score(candidate);
        Self {
            valid: violation.is_none(),
            violation: violation.as_ref().map(ViolationReport::from),
            score,
            label: strength_label(score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_bounds() {
        assert_eq!(validate("Password1!"), Err(PasswordViolation::TooShort { min: 12 }));

        let long = format!("Aa1!{}", "xk".repeat(70));
        assert_eq!(validate(&long), Err(PasswordViolation::TooLong { max: 128 }));

        let at_max = format!("Aa1!{}", "xk".repeat(62));
        assert_eq!(at_max.chars().count(), 128);
        assert_eq!(validate(&at_max), Ok(()));
    }

    #[test]
    fn test_known_good_password_passes() {
        assert_eq!(validate("Tr0ub4dor&3XYZ"), Ok(()));
    }

    #[test]
    fn test_missing_classes_reported_together() {
        let err = validate("onlylowercaseletters").unwrap_err();
        assert_eq!(
            err,
            PasswordViolation::MissingComplexity {
                missing: vec![CharClass::Uppercase, CharClass::Digit, CharClass::Symbol]
            }
        );
        assert_eq!(
            err.to_string(),
            "Password must contain at least one uppercase letter, one number, one special character"
        );
    }

    #[test]
    fn test_rules_short_circuit_in_order() {
        // Too short wins over missing classes.
        assert!(matches!(validate("abc"), Err(PasswordViolation::TooShort { .. })));
        // Blocklisted, case-insensitively, even though it has every class.
        assert_eq!(validate("pASSWORD123!"), Err(PasswordViolation::Common));
        assert_eq!(validate("Password123!"), Err(PasswordViolation::Common));
        // Sequential before repeated.
        assert_eq!(validate("Abcd!ef9Ghij"), Err(PasswordViolation::Sequential));
        assert_eq!(validate("Qm!7Rzzzzp2$"), Err(PasswordViolation::Repeated));
    }

    #[test]
    fn test_sequential_detection() {
        assert!(has_sequential_run("xx1234xx"));
        assert!(has_sequential_run("xx4321xx"));
        assert!(has_sequential_run("MNOP"));
        assert!(has_sequential_run("trewq"));
        assert!(has_sequential_run("ASDF"));
        assert!(has_sequential_run("mnbv"));
        assert!(!has_sequential_run("135792468"));
        assert!(!has_sequential_run("xyz"));
    }

    #[test]
    fn test_repeated_detection() {
        assert!(has_repeated_run("ab1111cd"));
        assert!(!has_repeated_run("ab111cd111"));
        // Case-sensitive.
        assert!(!has_repeated_run("aAaA"));
    }

    #[test]
    fn test_repeated_single_character_is_very_weak() {
        let score = strength_score("aaaaaaaaaaaa");
        assert_eq!(score, 16);
        assert_eq!(strength_label(score), StrengthLabel::VeryWeak);
    }

    #[test]
    fn test_score_components_and_clamp() {
        assert_eq!(strength_score(""), 0);
        assert_eq!(strength_score("Tr0ub4dor&3XYZ"), 88);
        assert_eq!(strength_label(strength_score("Tr0ub4dor&3XYZ")), StrengthLabel::Strong);
        // Blocklist penalty.
        assert!(strength_score("password123!") < 30);
        // Long, varied passwords saturate at 100.
        assert_eq!(strength_score("Gx7!mQ2#vR9$kP4&wL8*"), 100);
    }

    #[test]
    fn test_label_buckets() {
        assert_eq!(strength_label(0), StrengthLabel::VeryWeak);
        assert_eq!(strength_label(29), StrengthLabel::VeryWeak);
        assert_eq!(strength_label(30), StrengthLabel::Weak);
        assert_eq!(strength_label(50), StrengthLabel::Acceptable);
        assert_eq!(strength_label(70), StrengthLabel::Strong);
        assert_eq!(strength_label(89), StrengthLabel::Strong);
        assert_eq!(strength_label(90), StrengthLabel::VeryStrong);
        assert_eq!(StrengthLabel::VeryStrong.to_string(), "very strong");
    }

    #[test]
    fn test_report() {
        let report = PasswordReport::evaluate("Password1!");
        assert!(!report.valid);
        assert_eq!(report.violation.as_ref().map(|v| v.code), Some("password_too_short"));

        let report = PasswordReport::evaluate("Tr0ub4dor&3XYZ");
        assert!(report.valid);
        assert!(report.violation.is_none());
        assert_eq!(report.label, StrengthLabel::Strong);
    }
}
