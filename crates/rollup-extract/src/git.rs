// SPDX-License-Identifier: MIT OR Apache-2.0
//! Git remote URL extractor.
//!
//! Normalizes HTTPS and SSH remote forms (`https://host/owner/repo.git`,
//! `git@host:owner/repo.git`) to a single `host/owner/repo` canonical shape,
//! so the same repository referenced two different ways across IaC repos
//! still matches.

use rollup_core::model::{ExternalReference, Node, ReferenceType};

use crate::{metadata_strings, Components, ReferenceExtractor};

pub struct GitUrlExtractor;

const URL_KEYS: &[&str] = &["git_url", "repo_url", "source", "repository"];

struct ParsedGitUrl {
    host: String,
    owner: String,
    repo: String,
}

impl GitUrlExtractor {
    fn parse(identifier: &str) -> Option<ParsedGitUrl> {
        let identifier = identifier.trim();

        let rest = if let Some(r) = identifier.strip_prefix("https://") {
            r
        } else if let Some(r) = identifier.strip_prefix("http://") {
            r
        } else if let Some(r) = identifier.strip_prefix("ssh://git@") {
            r
        } else if let Some(r) = identifier.strip_prefix("git@") {
            // SSH scp-like syntax: git@host:owner/repo.git
            return Self::parse_scp(r);
        } else {
            return None;
        };

        let (host, path) = rest.split_once('/')?;
        Self::from_host_and_path(host, path)
    }

    fn parse_scp(rest: &str) -> Option<ParsedGitUrl> {
        let (host, path) = rest.split_once(':')?;
        Self::from_host_and_path(host, path)
    }

    fn from_host_and_path(host: &str, path: &str) -> Option<ParsedGitUrl> {
        let path = path.trim_end_matches('/').trim_end_matches(".git");
        let mut segments = path.splitn(2, '/');
        let owner = segments.next()?.to_string();
        let repo = segments.next()?.to_string();
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        Some(ParsedGitUrl { host: host.to_string(), owner, repo })
    }

    fn canonical(parsed: &ParsedGitUrl) -> String {
        format!(
            "{}/{}/{}",
            parsed.host.to_lowercase(),
            parsed.owner.to_lowercase(),
            parsed.repo.to_lowercase()
        )
    }
}

impl ReferenceExtractor for GitUrlExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::GitUrl
    }

    fn extract(&self, node: &Node) -> Vec<ExternalReference> {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for key in URL_KEYS {
            for value in metadata_strings(node, key) {
                if let Some(parsed) = Self::parse(value) {
                    let normalized = Self::canonical(&parsed);
                    if seen.insert(normalized.clone()) {
                        let reference =
                            ExternalReference::new(ReferenceType::GitUrl, value, normalized, 1.0)
                                .with_provider("git")
                                .with_attribute("host", &parsed.host)
                                .with_attribute("owner", &parsed.owner)
                                .with_attribute("repo", &parsed.repo);
                        out.push(reference);
                    }
                }
            }
        }
        out
    }

    fn normalize(&self, identifier: &str) -> String {
        match Self::parse(identifier) {
            Some(parsed) => Self::canonical(&parsed),
            None => identifier.trim().trim_end_matches(".git").to_lowercase(),
        }
    }

    fn parse_components(&self, identifier: &str) -> Option<Components> {
        let parsed = Self::parse(identifier)?;
        let mut components = Components::new();
        components.insert("host".into(), parsed.host);
        components.insert("owner".into(), parsed.owner);
        components.insert("repo".into(), parsed.repo);
        Some(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn node(value: &str) -> Node {
        let mut map = BTreeMap::new();
        map.insert("git_url".to_string(), rollup_core::model::MetadataValue::String(value.to_string()));
        Node { id: "n1".into(), r#type: "git_module".into(), name: "m".into(), metadata: map, location: None }
    }

    #[test]
    fn https_and_ssh_forms_normalize_to_the_same_identity() {
        let https = GitUrlExtractor.normalize("https://github.com/acme/widgets.git");
        let ssh = GitUrlExtractor.normalize("git@github.com:acme/widgets.git");
        assert_eq!(https, ssh);
    }

    #[test]
    fn extracts_owner_and_repo_components() {
        let refs = GitUrlExtractor.extract(&node("https://github.com/acme/widgets"));
        assert_eq!(refs[0].attributes.get("owner").unwrap(), "acme");
        assert_eq!(refs[0].attributes.get("repo").unwrap(), "widgets");
    }

    #[test]
    fn rejects_urls_without_owner_repo_path() {
        assert!(GitUrlExtractor.parse_components("https://github.com").is_none());
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = GitUrlExtractor.normalize("https://GitHub.com/Acme/Widgets.git");
        let twice = GitUrlExtractor.normalize(&once);
        assert_eq!(once, twice);
    }
}
