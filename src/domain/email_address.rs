use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use regex::Regex;

use unicode_segmentation::UnicodeSegmentation;

const MAX_LEN: usize = 254;
const MAX_SUGGESTIONS: usize = 3;
const MAX_SUGGESTION_DISTANCE: usize = 2;

lazy_static::lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9-]+(\.[a-z0-9-]+)*\.[a-z]{2,}$").unwrap();

    // Providers handing out short-lived, throwaway inboxes
    static ref DISPOSABLE_DOMAINS: HashSet<&'static str> = [
        "10minutemail.com",
        "dispostable.com",
        "fakeinbox.com",
        "getnada.com",
        "guerrillamail.com",
        "guerrillamail.net",
        "mailinator.com",
        "maildrop.cc",
        "mintemail.com",
        "mohmal.com",
        "sharklasers.com",
        "temp-mail.org",
        "tempmail.com",
        "throwaway.email",
        "trashmail.com",
        "yopmail.com",
    ]
    .into_iter()
    .collect();

    static ref DOMAIN_TYPOS: HashMap<&'static str, &'static str> = [
        ("gmial.com", "gmail.com"),
        ("gmai.com", "gmail.com"),
        ("gmal.com", "gmail.com"),
        ("gamil.com", "gmail.com"),
        ("gnail.com", "gmail.com"),
        ("gmail.co", "gmail.com"),
        ("gmail.con", "gmail.com"),
        ("gmail.cm", "gmail.com"),
        ("hotmial.com", "hotmail.com"),
        ("hotmal.com", "hotmail.com"),
        ("hotmai.com", "hotmail.com"),
        ("hotmail.co", "hotmail.com"),
        ("yahooo.com", "yahoo.com"),
        ("yaho.com", "yahoo.com"),
        ("yahoo.co", "yahoo.com"),
        ("outlok.com", "outlook.com"),
        ("outloo.com", "outlook.com"),
        ("outlook.co", "outlook.com"),
        ("iclod.com", "icloud.com"),
        ("icloud.co", "icloud.com"),
    ]
    .into_iter()
    .collect();
}

const COMMON_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "icloud.com",
    "live.com",
    "aol.com",
    "protonmail.com",
];

/// Reasons a user supplied email address is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmailError {
    #[error("Email address is required")]
    Required,
    #[error("Email address is too long")]
    TooLong,
    #[error("Email address has an invalid format")]
    InvalidFormat { suggestions: Vec<String> },
    #[error("Temporary email addresses are not allowed")]
    Disposable,
}

impl EmailError {
    /// Corrected addresses the user may have meant, only ever offered for format failures
    pub fn suggestions(&self) -> &[String] {
        match self {
            Self::InvalidFormat { suggestions } => suggestions,
            _ => &[],
        }
    }
}

/// A validated email-address, trimmed and lower-cased
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Sanitize and validate a raw email string
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let value = raw.trim().to_lowercase();

        if value.is_empty() {
            return Err(EmailError::Required);
        }
        if value.graphemes(true).count() > MAX_LEN {
            return Err(EmailError::TooLong);
        }
        if !EMAIL_REGEX.is_match(&value) {
            let suggestions = suggest_corrections(&value);
            return Err(EmailError::InvalidFormat { suggestions });
        }

        let email = Self(value);
        if is_disposable(email.domain()) {
            return Err(EmailError::Disposable);
        }
        Ok(email)
    }

    /// The part after the `@`
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map(|(_, d)| d).unwrap_or_default()
    }
}

impl FromStr for EmailAddress {
    type Err = EmailError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Check the domain and each of its parent domains against the blocklist
fn is_disposable(domain: &str) -> bool {
    let mut candidate = domain;
    loop {
        if DISPOSABLE_DOMAINS.contains(candidate) {
            return true;
        }
        match candidate.split_once('.') {
            Some((_, parent)) if parent.contains('.') => candidate = parent,
            _ => return false,
        }
    }
}

/// Propose up to three well-formed addresses by fixing a mistyped domain
fn suggest_corrections(value: &str) -> Vec<String> {
    let Some((local, domain)) = value.rsplit_once('@') else {
        return Vec::new();
    };
    let local = local.trim_end_matches('@');
    if local.is_empty() || local.contains(char::is_whitespace) {
        return Vec::new();
    }

    let domain = domain.replace(',', ".").replace("..", ".");
    let domain = domain.trim_matches('.');

    let mut candidates: Vec<(usize, &str)> = Vec::new();
    if let Some(fixed) = DOMAIN_TYPOS.get(domain) {
        candidates.push((0, *fixed));
    }
    for &common in COMMON_DOMAINS {
        let label = common.split('.').next().unwrap_or_default();
        if domain == label {
            candidates.push((0, common));
            continue;
        }
        let distance = edit_distance(domain, common);
        if distance <= MAX_SUGGESTION_DISTANCE {
            candidates.push((distance, common));
        }
    }
    candidates.sort_by_key(|(distance, _)| *distance);

    let mut suggestions: Vec<String> = Vec::new();
    for (_, candidate) in candidates {
        let suggestion = format!("{}@{}", local, candidate);
        if suggestion != value
            && EMAIL_REGEX.is_match(&suggestion)
            && !suggestions.contains(&suggestion)
        {
            suggestions.push(suggestion);
        }
        if suggestions.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    suggestions
}

/// Levenshtein distance over chars
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
