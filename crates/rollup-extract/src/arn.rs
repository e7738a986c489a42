// SPDX-License-Identifier: MIT OR Apache-2.0
//! AWS ARN extractor.
//!
//! Handles both canonical `service:resource:id` and slash-shaped
//! `service/resource/id` resource portions, ARNs with missing region and/or
//! account (S3, IAM), ARNs embedded inside longer policy-document strings,
//! and array-valued metadata. Wildcards are never emitted as references.

use rollup_core::model::{ExternalReference, Node, ReferenceType};

use crate::{all_metadata_strings, Components, ReferenceExtractor};

/// Valid AWS partitions this extractor recognizes.
const PARTITIONS: &[&str] = &["aws", "aws-cn", "aws-gov"];

pub struct ArnExtractor;

/// One parsed ARN's components.
struct ParsedArn {
    partition: String,
    service: String,
    region: String,
    account: String,
    resource: String,
}

impl ArnExtractor {
    /// Attempt to parse `candidate` (assumed to already start at `"arn:"`)
    /// as an ARN, stopping at the first whitespace/quote/closing-bracket so
    /// that embedded ARNs inside a longer string are isolated correctly.
    fn try_parse(candidate: &str) -> Option<ParsedArn> {
        let end = candidate
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ')' | ']' | ','))
            .unwrap_or(candidate.len());
        let token = &candidate[..end];

        let parts: Vec<&str> = token.splitn(6, ':').collect();
        if parts.len() != 6 || parts[0] != "arn" {
            return None;
        }
        let partition = parts[1].to_lowercase();
        let service = parts[2].to_lowercase();
        let region = parts[3].to_string();
        let account = parts[4].to_string();
        let resource = parts[5].to_string();

        if !PARTITIONS.contains(&partition.as_str()) {
            return None;
        }
        if service.is_empty() || resource.is_empty() {
            return None;
        }
        // Grammar is `^arn:[a-z-]+:[a-z0-9-]+:[a-z0-9-]*:[0-9]*:.+$`: service
        // and region are lowercase-only charsets, not case-insensitive
        // alphanumeric.
        if !service.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return None;
        }
        if !region.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return None;
        }
        if !account.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if resource.contains('*') {
            return None;
        }

        Some(ParsedArn {
            partition,
            service,
            region,
            account,
            resource,
        })
    }

    fn canonical(parsed: &ParsedArn) -> String {
        format!(
            "arn:{}:{}:::{}",
            parsed.partition,
            parsed.service,
            parsed.resource.to_lowercase()
        )
    }
}

impl ReferenceExtractor for ArnExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::Arn
    }

    fn extract(&self, node: &Node) -> Vec<ExternalReference> {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for value in all_metadata_strings(node) {
            // Scan-and-extract: an ARN may appear anywhere within a longer
            // string (e.g. embedded in an IAM policy document).
            let mut rest = value;
            while let Some(idx) = rest.find("arn:") {
                let candidate = &rest[idx..];
                if let Some(parsed) = Self::try_parse(candidate) {
                    let normalized = Self::canonical(&parsed);
                    if seen.insert(normalized.clone()) {
                        let raw_resource_end = candidate
                            .find(|c: char| {
                                c.is_whitespace() || matches!(c, '"' | '\'' | ')' | ']' | ',')
                            })
                            .unwrap_or(candidate.len());
                        let raw = &candidate[..raw_resource_end];
                        let reference = ExternalReference::new(
                            ReferenceType::Arn,
                            raw,
                            normalized,
                            1.0,
                        )
                        .with_provider("aws")
                        .with_attribute("partition", &parsed.partition)
                        .with_attribute("service", &parsed.service)
                        .with_attribute("region", &parsed.region)
                        .with_attribute("account", &parsed.account);
                        out.push(reference);
                    }
                }
                // Advance past this "arn:" occurrence regardless of parse
                // success so a malformed prefix doesn't loop forever.
                rest = &rest[idx + 4..];
            }
        }

        out
    }

    fn normalize(&self, identifier: &str) -> String {
        match Self::try_parse(identifier) {
            Some(parsed) => Self::canonical(&parsed),
            None => identifier.trim().to_lowercase(),
        }
    }

    fn parse_components(&self, identifier: &str) -> Option<Components> {
        let parsed = Self::try_parse(identifier)?;
        let mut components = Components::new();
        components.insert("partition".into(), parsed.partition);
        components.insert("service".into(), parsed.service);
        components.insert("region".into(), parsed.region);
        components.insert("account".into(), parsed.account);
        components.insert("resource".into(), parsed.resource);
        Some(components)
    }
}
