use serde::{Deserialize, Serialize};

/// Object-storage bucket a user may be granted access to. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub bucket: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Label a list of bucket ids with their bucket names; unknown ids are kept verbatim.
pub fn bucket_labels(ids: &[String], buckets: &[Bucket]) -> Vec<String> {
    ids.iter()
        .map(|id| {
            buckets
                .iter()
                .find(|b| &b.id == id)
                .map(|b| b.bucket.clone())
                .unwrap_or_else(|| id.clone())
        })
        .collect()
}
