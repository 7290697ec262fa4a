//! Sender parsing for the `From` header (RFC 5322 §3.4, best effort).

/// The sender of an email as shown in the inbox.
///
/// # Examples
/// - `"\"Jane Doe\" <jane@x.com>"` → `display_name = "Jane Doe"`, `address = "jane@x.com"`
/// - `"jane@x.com"` → `display_name = "jane"`, `address = "jane@x.com"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// Human-readable display name. Never empty unless the input was.
    pub display_name: String,
    /// The bare email address (`user@domain`), or the raw input if unrecognized.
    pub address: String,
}

impl Sender {
    /// Parse a `From` header value.
    ///
    /// Supported formats:
    /// - `"\"Display Name\" <user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"<user@domain.com>"` (name derived from the local part)
    /// - `"user@domain.com"` (name derived from the local part)
    ///
    /// Anything else is kept verbatim as both address and name.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(angle_start) = trimmed.rfind('<') {
            if let Some(len) = trimmed[angle_start..].find('>') {
                let address = trimmed[angle_start + 1..angle_start + len].trim();
                if !address.is_empty() {
                    let name = strip_quotes(&trimmed[..angle_start]);
                    let display_name = if name.is_empty() {
                        local_part(address).unwrap_or(address).to_string()
                    } else {
                        name
                    };
                    return Self {
                        display_name,
                        address: address.to_string(),
                    };
                }
            }
        }

        match local_part(trimmed) {
            Some(local) => Self {
                display_name: local.to_string(),
                address: trimmed.to_string(),
            },
            None => Self {
                display_name: trimmed.to_string(),
                address: trimmed.to_string(),
            },
        }
    }

    /// Format for display: `"Display Name <address>"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() || self.display_name == self.address {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

/// The part before `@`, if there is a non-empty one.
fn local_part(address: &str) -> Option<&str> {
    match address.find('@') {
        Some(pos) if pos > 0 => Some(&address[..pos]),
        _ => None,
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.trim_matches('"').trim().to_string()
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
