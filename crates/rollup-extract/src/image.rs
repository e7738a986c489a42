// SPDX-License-Identifier: MIT OR Apache-2.0
//! Container image reference extractor.
//!
//! Parses `[registry/]repository[:tag][@digest]`. The canonical form always
//! carries an explicit registry (`docker.io` when absent) and drops `:tag`
//! whenever a `@digest` is present, since the digest alone identifies the
//! image content.

use rollup_core::model::{ExternalReference, Node, ReferenceType};

use crate::{metadata_strings, Components, ReferenceExtractor};

pub struct ContainerImageExtractor;

const IMAGE_KEYS: &[&str] = &["image", "container_image"];
const DEFAULT_REGISTRY: &str = "docker.io";

struct ParsedImage {
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ContainerImageExtractor {
    fn parse(identifier: &str) -> Option<ParsedImage> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }

        let (rest, digest) = match identifier.split_once('@') {
            Some((rest, digest)) => (rest, Some(digest.to_string())),
            None => (identifier, None),
        };

        // A tag separator is the last `:` after the last `/`, so a port
        // number in the registry host isn't mistaken for a tag.
        let last_slash = rest.rfind('/');
        let tag_candidate = rest.rfind(':');
        let (path, tag) = match (tag_candidate, last_slash) {
            (Some(colon), Some(slash)) if colon > slash => {
                (&rest[..colon], Some(rest[colon + 1..].to_string()))
            }
            (Some(colon), None) => (&rest[..colon], Some(rest[colon + 1..].to_string())),
            _ => (rest, None),
        };

        if path.is_empty() {
            return None;
        }

        let segments: Vec<&str> = path.split('/').collect();
        let (registry, repository) = if segments.len() > 1
            && (segments[0].contains('.') || segments[0].contains(':') || segments[0] == "localhost")
        {
            (segments[0].to_string(), segments[1..].join("/"))
        } else {
            (DEFAULT_REGISTRY.to_string(), path.to_string())
        };

        if repository.is_empty() {
            return None;
        }

        Some(ParsedImage { registry, repository, tag, digest })
    }

    fn canonical(parsed: &ParsedImage) -> String {
        let registry = parsed.registry.to_lowercase();
        let repository = parsed.repository.to_lowercase();
        match &parsed.digest {
            Some(digest) => format!("{registry}/{repository}@{digest}"),
            None => {
                let tag = parsed.tag.as_deref().unwrap_or("latest");
                format!("{registry}/{repository}:{tag}")
            }
        }
    }
}

impl ReferenceExtractor for ContainerImageExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::ContainerImage
    }

    fn extract(&self, node: &Node) -> Vec<ExternalReference> {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for key in IMAGE_KEYS {
            for value in metadata_strings(node, key) {
                if let Some(parsed) = Self::parse(value) {
                    let normalized = Self::canonical(&parsed);
                    if seen.insert(normalized.clone()) {
                        let mut reference =
                            ExternalReference::new(ReferenceType::ContainerImage, value, normalized, 1.0)
                                .with_provider("oci")
                                .with_attribute("registry", &parsed.registry)
                                .with_attribute("repository", &parsed.repository);
                        if let Some(tag) = &parsed.tag {
                            reference = reference.with_attribute("tag", tag);
                        }
                        if let Some(digest) = &parsed.digest {
                            reference = reference.with_attribute("digest", digest);
                        }
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
            None => identifier.trim().to_lowercase(),
        }
    }

    fn parse_components(&self, identifier: &str) -> Option<Components> {
        let parsed = Self::parse(identifier)?;
        let mut components = Components::new();
        components.insert("registry".into(), parsed.registry);
        components.insert("repository".into(), parsed.repository);
        if let Some(tag) = parsed.tag {
            components.insert("tag".into(), tag);
        }
        if let Some(digest) = parsed.digest {
            components.insert("digest".into(), digest);
        }
        Some(components)
    }
}
