// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cloud storage path extractor.
//!
//! Covers `s3://bucket/key`, `gs://bucket/key`, and Azure blob URLs
//! (`https://account.blob.core.windows.net/container/blob`). Canonical form
//! is `<provider>://<bucket-or-container>/<key>`, lowercased on the bucket
//! portion only — object keys are case-sensitive on every provider.

use rollup_core::model::{ExternalReference, Node, ReferenceType};

use crate::{metadata_strings, Components, ReferenceExtractor};

pub struct StoragePathExtractor;

const PATH_KEYS: &[&str] = &["storage_path", "bucket_path", "s3_uri", "uri"];

struct ParsedStoragePath {
    provider: &'static str,
    bucket: String,
    key: String,
}

impl StoragePathExtractor {
    fn parse(identifier: &str) -> Option<ParsedStoragePath> {
        let identifier = identifier.trim();

        if let Some(rest) = identifier.strip_prefix("s3://") {
            return Self::split_bucket_key("s3", rest);
        }
        if let Some(rest) = identifier.strip_prefix("gs://") {
            return Self::split_bucket_key("gs", rest);
        }
        if let Some(rest) = identifier
            .strip_prefix("https://")
            .filter(|r| r.contains(".blob.core.windows.net/"))
        {
            let (host, path) = rest.split_once('/')?;
            let account = host.split('.').next()?;
            let (container, blob) = path.split_once('/').unwrap_or((path, ""));
            if container.is_empty() {
                return None;
            }
            return Some(ParsedStoragePath {
                provider: "azure",
                bucket: format!("{account}/{container}"),
                key: blob.to_string(),
            });
        }
        None
    }

    fn split_bucket_key(provider: &'static str, rest: &str) -> Option<ParsedStoragePath> {
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return None;
        }
        Some(ParsedStoragePath { provider, bucket: bucket.to_string(), key: key.to_string() })
    }

    fn canonical(parsed: &ParsedStoragePath) -> String {
        format!("{}://{}/{}", parsed.provider, parsed.bucket.to_lowercase(), parsed.key)
    }
}

impl ReferenceExtractor for StoragePathExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::StoragePath
    }

    fn extract(&self, node: &Node) -> Vec<ExternalReference> {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for key in PATH_KEYS {
            for value in metadata_strings(node, key) {
                if let Some(parsed) = Self::parse(value) {
                    let normalized = Self::canonical(&parsed);
                    if seen.insert(normalized.clone()) {
                        let reference =
                            ExternalReference::new(ReferenceType::StoragePath, value, normalized, 1.0)
                                .with_provider(parsed.provider)
                                .with_attribute("bucket", &parsed.bucket)
                                .with_attribute("key", &parsed.key);
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
        components.insert("provider".into(), parsed.provider.to_string());
        components.insert("bucket".into(), parsed.bucket);
        components.insert("key".into(), parsed.key);
        Some(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn node(value: &str) -> Node {
        let mut map = BTreeMap::new();
        map.insert("storage_path".to_string(), rollup_core::model::MetadataValue::String(value.to_string()));
        Node { id: "n1".into(), r#type: "aws_s3_object".into(), name: "o".into(), metadata: map, location: None }
    }

    #[test]
    fn parses_s3_uri() {
        let refs = StoragePathExtractor.extract(&node("s3://my-bucket/path/to/object.json"));
        assert_eq!(refs[0].attributes.get("bucket").unwrap(), "my-bucket");
        assert_eq!(refs[0].attributes.get("key").unwrap(), "path/to/object.json");
    }

    #[test]
    fn object_key_case_is_preserved() {
        let refs = StoragePathExtractor.extract(&node("s3://my-bucket/Path/Object.JSON"));
        assert_eq!(refs[0].attributes.get("key").unwrap(), "Path/Object.JSON");
    }

    #[test]
    fn parses_azure_blob_url() {
        let refs = StoragePathExtractor
            .extract(&node("https://myaccount.blob.core.windows.net/mycontainer/blob.bin"));
        assert_eq!(refs[0].attributes.get("bucket").unwrap(), "myaccount/mycontainer");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = StoragePathExtractor.normalize("s3://My-Bucket/key");
        let twice = StoragePathExtractor.normalize(&once);
        assert_eq!(once, twice);
    }
}
