use std::collections::BTreeSet;

use relink_io::overrides::normalize_key;

/// Consumer mailbox providers. A shared domain on these says nothing about
/// which organization a person belongs to.
pub const DEFAULT_FREE_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "yahoo.co.uk",
    "ymail.com",
    "hotmail.com",
    "hotmail.co.uk",
    "outlook.com",
    "live.com",
    "msn.com",
    "aol.com",
    "icloud.com",
    "me.com",
    "mac.com",
    "gmx.com",
    "gmx.de",
    "gmx.net",
    "web.de",
    "mail.com",
    "protonmail.com",
    "proton.me",
    "yandex.com",
    "yandex.ru",
    "mail.ru",
    "zoho.com",
    "t-online.de",
    "orange.fr",
    "free.fr",
    "qq.com",
    "163.com",
];

/// Lowercased, trimmed e-mail; `None` when blank.
pub fn email(raw: &str) -> Option<String> {
    let e = normalize_key(raw);
    if e.is_empty() {
        None
    } else {
        Some(e)
    }
}

/// Lowercased text after the last `@`.
pub fn email_domain(raw: &str) -> Option<String> {
    let (local, domain) = raw.trim().rsplit_once('@')?;
    let domain = domain.trim().to_lowercase();
    if local.is_empty() || domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

/// Host part of a website value: scheme, `www.`, port and path removed.
pub fn url_host(raw: &str) -> Option<String> {
    let s = raw.trim().to_lowercase();
    let s = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(s.as_str());
    let host = s.split(['/', '?', '#', ':']).next().unwrap_or("");
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() || !host.contains('.') {
        None
    } else {
        Some(host.to_string())
    }
}

/// `first + " " + last`, lowercased, whitespace collapsed.
pub fn full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let joined = format!("{} {}", first.unwrap_or(""), last.unwrap_or(""));
    let name = joined
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeDomains(BTreeSet<String>);

impl FreeDomains {
    pub fn from_list<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            domains
                .into_iter()
                .map(|d| d.as_ref().trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.0.contains(domain)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for FreeDomains {
    fn default() -> Self {
        Self::from_list(DEFAULT_FREE_EMAIL_DOMAINS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalized() {
        assert_eq!(email("  Ann@Example.COM ").as_deref(), Some("ann@example.com"));
        assert_eq!(email("   "), None);
    }

    #[test]
    fn domain_after_last_at() {
        assert_eq!(email_domain("ann@Acme.io").as_deref(), Some("acme.io"));
        assert_eq!(email_domain("odd@name@acme.io").as_deref(), Some("acme.io"));
        assert_eq!(email_domain("no-at-sign"), None);
        assert_eq!(email_domain("@acme.io"), None);
    }

    #[test]
    fn host_from_website() {
        assert_eq!(url_host("https://www.Acme.io/about").as_deref(), Some("acme.io"));
        assert_eq!(url_host("acme.io:8080").as_deref(), Some("acme.io"));
        assert_eq!(url_host("n/a"), None);
    }

    #[test]
    fn names_collapse() {
        assert_eq!(full_name(Some(" Ann "), Some("LEE")).as_deref(), Some("ann lee"));
        assert_eq!(full_name(None, Some("Lee")).as_deref(), Some("lee"));
        assert_eq!(full_name(None, None), None);
    }

    #[test]
    fn free_domains_default() {
        let free = FreeDomains::default();
        assert!(free.contains("gmail.com"));
        assert!(!free.contains("acme.io"));
        let custom = FreeDomains::from_list(["Example.ORG"]);
        assert!(custom.contains("example.org"));
    }
}
