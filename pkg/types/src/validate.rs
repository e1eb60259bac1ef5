use anyhow::{Result, bail};

/// Validate a Kubernetes-style DNS label (namespaces, service accounts).
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Validate a DNS subdomain (CSR names, which are the user names).
/// Rules: dot separated labels, each a valid [`validate_name`] label, max 253 chars.
pub fn validate_subdomain(name: &str) -> Result<()> {
    if name.len() > 253 {
        bail!("name '{}' exceeds 253 characters (got {})", name, name.len());
    }
    for label in name.split('.') {
        if let Err(e) = validate_name(label) {
            bail!("invalid name '{}': {}", name, e);
        }
    }
    Ok(())
}
