//! robots.txt directives for the seed host
//!
//! The engine fetches `/robots.txt` once at startup (when configured to)
//! and evaluates every page URL against the parsed directives. A failed or
//! non-200 fetch yields an allow-all rule set so the crawl is never blocked
//! on a missing robots file.

use std::time::Duration;

use tracing::debug;
use url::Url;

/// Timeout for the one-off robots.txt fetch. Deliberately short: robots
/// handling must not stall crawl startup.
const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed crawl directives for one host.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    disallow_patterns: Vec<String>,
    allow_patterns: Vec<String>,
    crawl_delay: Option<Duration>,
}

impl RobotsRules {
    /// Parse robots.txt content, keeping the rule group that applies to
    /// `user_agent` (a specific group wins over the `*` wildcard group).
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let ua_lower = user_agent.to_lowercase();
        let mut disallow = Vec::new();
        let mut allow = Vec::new();
        let mut crawl_delay = None;
        let mut current_agent_applies = false;
        let mut found_specific_agent = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((directive, value)) = line.split_once(':') {
                let directive = directive.trim().to_lowercase();
                let value = value.trim();

                match directive.as_str() {
                    "user-agent" => {
                        let agent = value.to_lowercase();
                        if agent == "*" {
                            current_agent_applies = !found_specific_agent;
                        } else if ua_lower.contains(&agent) || agent.contains(&ua_lower) {
                            current_agent_applies = true;
                            found_specific_agent = true;
                            // Specific group supersedes earlier wildcard rules
                            disallow.clear();
                            allow.clear();
                        } else {
                            current_agent_applies = false;
                        }
                    }
                    "disallow" if current_agent_applies => {
                        if !value.is_empty() {
                            disallow.push(value.to_string());
                        }
                    }
                    "allow" if current_agent_applies => {
                        if !value.is_empty() {
                            allow.push(value.to_string());
                        }
                    }
                    "crawl-delay" if current_agent_applies => {
                        if let Ok(delay) = value.parse::<f64>() {
                            crawl_delay = Some(Duration::from_secs_f64(delay));
                        }
                    }
                    _ => {}
                }
            }
        }

        Self {
            disallow_patterns: disallow,
            allow_patterns: allow,
            crawl_delay,
        }
    }

    /// An empty (allow-all) rule set, used when robots.txt cannot be fetched.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether a URL path may be fetched. The longest matching pattern wins;
    /// on a tie, allow wins.
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest_allow = self
            .allow_patterns
            .iter()
            .filter(|p| Self::path_matches(path, p))
            .map(|p| p.len())
            .max()
            .unwrap_or(0);
        let longest_disallow = self
            .disallow_patterns
            .iter()
            .filter(|p| Self::path_matches(path, p))
            .map(|p| p.len())
            .max()
            .unwrap_or(0);
        longest_allow >= longest_disallow
    }

    /// Crawl delay requested for our user agent, if any.
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }

    /// robots.txt pattern match: prefix semantics with `*` wildcards and an
    /// optional `$` end anchor.
    fn path_matches(path: &str, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }

        let (pattern, must_end_match) = match pattern.strip_suffix('$') {
            Some(stripped) => (stripped, true),
            None => (pattern, false),
        };

        if pattern.contains('*') {
            let parts: Vec<&str> = pattern.split('*').collect();
            let mut pos = 0;
            for (i, part) in parts.iter().enumerate() {
                if part.is_empty() {
                    continue;
                }
                match path[pos..].find(part) {
                    Some(found) => {
                        if i == 0 && found != 0 {
                            return false;
                        }
                        pos += found + part.len();
                    }
                    None => return false,
                }
            }
            if must_end_match {
                return pos == path.len();
            }
            return true;
        }

        if must_end_match {
            return path == pattern;
        }
        path.starts_with(pattern)
    }
}

/// robots.txt URL for the seed's origin. Non-default ports are part of the
/// origin and must be preserved.
fn robots_txt_url(seed: &Url) -> Option<String> {
    let host = seed.host_str()?;
    Some(match seed.port() {
        Some(port) => format!("{}://{}:{}/robots.txt", seed.scheme(), host, port),
        None => format!("{}://{}/robots.txt", seed.scheme(), host),
    })
}

/// Fetch and parse robots.txt for the seed's origin. Any failure (network,
/// timeout, non-200) degrades to allow-all.
pub async fn fetch_rules(client: &reqwest::Client, seed: &Url, user_agent: &str) -> RobotsRules {
    let robots_url = match robots_txt_url(seed) {
        Some(url) => url,
        None => return RobotsRules::allow_all(),
    };

    let response = client
        .get(&robots_url)
        .timeout(ROBOTS_FETCH_TIMEOUT)
        .send()
        .await;

    match response {
        Ok(resp) if resp.status().is_success() => match resp.text().await {
            Ok(body) => {
                let rules = RobotsRules::parse(&body, user_agent);
                debug!(
                    url = %robots_url,
                    disallow = rules.disallow_patterns.len(),
                    allow = rules.allow_patterns.len(),
                    "parsed robots.txt"
                );
                rules
            }
            Err(_) => RobotsRules::allow_all(),
        },
        _ => {
            debug!(url = %robots_url, "robots.txt unavailable, allowing all");
            RobotsRules::allow_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_specific_group() {
        let content = r#"
User-agent: *
Disallow: /private/
Crawl-delay: 2

User-agent: webmirror
Disallow: /admin/
Crawl-delay: 1
"#;
        let rules = RobotsRules::parse(content, "webmirror");
        assert!(!rules.is_allowed("/admin/settings"));
        assert!(rules.is_allowed("/private/page")); // our group has no such rule
        assert_eq!(rules.crawl_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_allow_takes_precedence_on_tie() {
        let content = r#"
User-agent: *
Disallow: /private/
Allow: /private/readme.txt
"#;
        let rules = RobotsRules::parse(content, "AnyBot");
        assert!(!rules.is_allowed("/private/secret"));
        assert!(rules.is_allowed("/private/readme.txt"));
        assert!(rules.is_allowed("/public/page"));
    }

    #[test]
    fn test_wildcard_and_end_anchor() {
        let content = r#"
User-agent: *
Disallow: /*.pdf$
"#;
        let rules = RobotsRules::parse(content, "AnyBot");
        assert!(!rules.is_allowed("/docs/manual.pdf"));
        assert!(rules.is_allowed("/docs/manual.pdf.html"));
        assert!(rules.is_allowed("/docs/manual.html"));
    }

    #[test]
    fn test_allow_all_permits_everything() {
        let rules = RobotsRules::allow_all();
        assert!(rules.is_allowed("/anything/at/all"));
    }

    #[test]
    fn test_path_matching() {
        assert!(RobotsRules::path_matches("/admin/test", "/admin/"));
        assert!(!RobotsRules::path_matches("/public/test", "/admin/"));
        assert!(RobotsRules::path_matches("/images/cat.jpg", "/images/*.jpg"));
        assert!(RobotsRules::path_matches("/page.html", "/page.html$"));
        assert!(!RobotsRules::path_matches("/page.html?query", "/page.html$"));
    }

    #[test]
    fn test_robots_url_preserves_origin() {
        let seed = Url::parse("https://example.test/docs/page").unwrap();
        assert_eq!(
            robots_txt_url(&seed).unwrap(),
            "https://example.test/robots.txt"
        );

        let seed = Url::parse("https://example.test:8443/docs/page").unwrap();
        assert_eq!(
            robots_txt_url(&seed).unwrap(),
            "https://example.test:8443/robots.txt"
        );

        let seed = Url::parse("http://example.test:8080/").unwrap();
        assert_eq!(
            robots_txt_url(&seed).unwrap(),
            "http://example.test:8080/robots.txt"
        );
    }
}
