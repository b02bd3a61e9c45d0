//! Validation rules for registration fields.

/// Usernames: 3-20 characters, letters/digits/underscore only.
pub fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    (3..=20).contains(&len)
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Emails: `local@domain.tld` with a dot in the domain and a TLD of at
/// least two characters. Deliberately shallow; real validation happens
/// when mail is actually sent.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty()
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
        && !domain.starts_with('.')
}

/// Passwords: at least 6 characters. Intentionally weak; strengthening
/// the policy is out of scope here.
pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= 6
}
