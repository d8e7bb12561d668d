//! Record metadata handed to the export pipeline by a content source.
//!
//! [`RecordInfo`] is the descriptive half of a record: it is validated once at
//! construction and never mutated afterwards. [`RecordMetadata`] pairs it with
//! the record's attachment streams, which are read-once and therefore move-only.

use crate::error::{Result, ValidationError};
use crate::id::{RecordKind, Slug, TeamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// Descriptive metadata of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInfo {
    id: i64,
    kind: RecordKind,
    title: String,
    created_at: DateTime<Utc>,
    author_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

impl RecordInfo {
    /// Build and validate record metadata.
    pub fn new(
        kind: RecordKind,
        id: i64,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
        author_name: impl Into<String>,
    ) -> Result<Self> {
        if id <= 0 {
            return Err(ValidationError::invalid(
                "id",
                format!("must be a positive integer, got {}", id),
            ));
        }

        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::MissingField("title".to_string()));
        }

        let author_name = author_name.into().trim().to_string();
        if author_name.is_empty() {
            return Err(ValidationError::MissingField("author_name".to_string()));
        }

        Ok(RecordInfo {
            id,
            kind,
            title,
            created_at,
            author_name,
            tags: Vec::new(),
            body: None,
        })
    }

    /// Attach tags. Blank tags are dropped and duplicates keep their first position.
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.into().trim().to_string();
            if !tag.is_empty() && !normalized.contains(&tag) {
                normalized.push(tag);
            }
        }
        self.tags = normalized;
        self
    }

    /// Attach the record's main text.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.body = if body.trim().is_empty() { None } else { Some(body) };
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn author_name(&self) -> &str {
        &self.author_name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Whether this metadata describes the record addressed by `slug`.
    pub fn matches(&self, slug: &Slug) -> bool {
        self.kind == slug.kind && self.id == slug.id
    }

    /// Slug of this record within `team_id`.
    pub fn slug(&self, team_id: TeamId) -> Slug {
        Slug::new(self.kind, self.id, team_id)
    }
}

/// A named, read-once attachment stream.
pub struct AttachmentRef {
    filename: String,
    byte_length: Option<u64>,
    content: Box<dyn Read + Send>,
}

impl AttachmentRef {
    pub fn new(filename: impl Into<String>, content: Box<dyn Read + Send>) -> Self {
        AttachmentRef {
            filename: filename.into(),
            byte_length: None,
            content,
        }
    }

    /// Declare the expected length. The pipeline fails the record if the
    /// stream delivers a different number of bytes.
    pub fn with_byte_length(mut self, byte_length: u64) -> Self {
        self.byte_length = Some(byte_length);
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn byte_length(&self) -> Option<u64> {
        self.byte_length
    }

    /// Give up the stream for consumption.
    pub fn into_content(self) -> Box<dyn Read + Send> {
        self.content
    }
}

impl fmt::Debug for AttachmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentRef")
            .field("filename", &self.filename)
            .field("byte_length", &self.byte_length)
            .finish_non_exhaustive()
    }
}

/// Everything a content source yields for one slug.
#[derive(Debug)]
pub struct RecordMetadata {
    info: RecordInfo,
    attachments: Vec<AttachmentRef>,
}

impl RecordMetadata {
    pub fn new(info: RecordInfo, attachments: Vec<AttachmentRef>) -> Self {
        RecordMetadata { info, attachments }
    }

    pub fn info(&self) -> &RecordInfo {
        &self.info
    }

    pub fn attachments(&self) -> &[AttachmentRef] {
        &self.attachments
    }

    pub fn into_parts(self) -> (RecordInfo, Vec<AttachmentRef>) {
        (self.info, self.attachments)
    }
}
