use chrono::{DateTime, Utc};
use ingest_common::types::{IngestedPost, Post, PLACEHOLDER_API_SOURCE};

/// Stamp every post with one ingestion time (sampled once) and the source tag
pub fn transform(posts: Vec<Post>) -> Vec<IngestedPost> {
    transform_at(posts, Utc::now())
}

pub fn transform_at(posts: Vec<Post>, ingested_at: DateTime<Utc>) -> Vec<IngestedPost> {
    posts
        .into_iter()
        .map(|post| IngestedPost::from_post(post, ingested_at, PLACEHOLDER_API_SOURCE))
        .collect()
}
