//! Archive manifest types and the manifest builder.
//!
//! The manifest is a JSON-LD graph in the RO-Crate shape used by `.eln`
//! archives. It is the source of truth for an archive's contents:
//! - a metadata descriptor node pointing at the root dataset
//! - the root dataset (`./`), referencing every record
//! - one dataset per record (`experiments/<id>/`), referencing its files
//! - one file node per entry, carrying size and SHA-256
//! - person, organisation and generator nodes
//!
//! Rendering is deterministic: the same records, title and timestamp produce
//! byte-identical output.

use crate::writer::ArchiveEntry;
use crate::{ArchiveError, Result, ARCHIVE_FORMAT_VERSION};
use chrono::{DateTime, Utc};
use eln_common::{RecordInfo, RecordKind, TeamSettings};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Manifest entry path within the archive.
pub const MANIFEST_PATH: &str = "manifest.json";

/// `@id` of the root dataset.
pub const ROOT_ID: &str = "./";

/// JSON-LD context of the manifest.
pub const MANIFEST_CONTEXT: &str = "https://w3id.org/ro/crate/1.1/context";

/// Profile the manifest conforms to.
pub const CONFORMS_TO: &str = "https://w3id.org/ro/crate/1.1";

const GENERATOR_ID: &str = "#generator";
const ORGANIZATION_ID: &str = "#organization";

/// Reference to another node in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    #[serde(rename = "@id")]
    pub id: String,
}

impl IdRef {
    pub fn new(id: impl Into<String>) -> Self {
        IdRef { id: id.into() }
    }
}

/// Metadata descriptor node: describes the manifest itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorNode {
    #[serde(rename = "@id")]
    pub id: String,
    pub conforms_to: IdRef,
    pub about: IdRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Dataset node: the archive root or one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetNode {
    #[serde(rename = "@id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd_publisher: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_organization: Option<IdRef>,
    #[serde(default)]
    pub has_part: Vec<IdRef>,
}

/// File node: one archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    #[serde(rename = "@id")]
    pub id: String,
    pub name: String,
    pub content_size: u64,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonNode {
    #[serde(rename = "@id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationNode {
    #[serde(rename = "@id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareNode {
    #[serde(rename = "@id")]
    pub id: String,
    pub name: String,
    pub version: String,
}

/// One node of the manifest graph, tagged by `@type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ManifestNode {
    CreativeWork(DescriptorNode),
    Dataset(DatasetNode),
    File(FileNode),
    Person(PersonNode),
    Organization(OrganizationNode),
    SoftwareApplication(SoftwareNode),
}

impl ManifestNode {
    pub fn id(&self) -> &str {
        match self {
            ManifestNode::CreativeWork(n) => &n.id,
            ManifestNode::Dataset(n) => &n.id,
            ManifestNode::File(n) => &n.id,
            ManifestNode::Person(n) => &n.id,
            ManifestNode::Organization(n) => &n.id,
            ManifestNode::SoftwareApplication(n) => &n.id,
        }
    }
}

/// The complete manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@graph")]
    pub graph: Vec<ManifestNode>,
}

impl ManifestDocument {
    /// Parse from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize to JSON with consistent formatting.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// The metadata descriptor node.
    pub fn descriptor(&self) -> Option<&DescriptorNode> {
        self.graph.iter().find_map(|node| match node {
            ManifestNode::CreativeWork(n) if n.id == MANIFEST_PATH => Some(n),
            _ => None,
        })
    }

    /// The root dataset node.
    pub fn root(&self) -> Option<&DatasetNode> {
        self.graph.iter().find_map(|node| match node {
            ManifestNode::Dataset(n) if n.id == ROOT_ID => Some(n),
            _ => None,
        })
    }

    /// Record dataset nodes, in graph order.
    pub fn records(&self) -> Vec<&DatasetNode> {
        self.graph
            .iter()
            .filter_map(|node| match node {
                ManifestNode::Dataset(n) if n.id != ROOT_ID => Some(n),
                _ => None,
            })
            .collect()
    }

    /// File nodes, in graph order.
    pub fn files(&self) -> Vec<&FileNode> {
        self.graph
            .iter()
            .filter_map(|node| match node {
                ManifestNode::File(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn find_file(&self, path: &str) -> Option<&FileNode> {
        self.files().into_iter().find(|f| f.id == path)
    }

    /// Total size of all files in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.files().iter().map(|f| f.content_size).sum()
    }

    /// Validate the graph structure.
    ///
    /// Checks that the descriptor and root exist, every reference resolves to
    /// a node of the expected type, and every file belongs to exactly one record.
    pub fn validate(&self) -> Result<()> {
        let corrupted = |msg: String| ArchiveError::CorruptedManifest(msg);

        if self.context != MANIFEST_CONTEXT {
            return Err(corrupted(format!("unexpected @context: {}", self.context)));
        }

        let descriptor = self
            .descriptor()
            .ok_or_else(|| corrupted("metadata descriptor node is missing".to_string()))?;
        if descriptor.about.id != ROOT_ID {
            return Err(corrupted("descriptor does not describe the root dataset".to_string()));
        }

        let root = self
            .root()
            .ok_or_else(|| corrupted("root dataset node is missing".to_string()))?;

        let mut ids = HashSet::new();
        for node in &self.graph {
            if !ids.insert(node.id()) {
                return Err(corrupted(format!("duplicate @id: {}", node.id())));
            }
        }

        let records: HashMap<&str, &DatasetNode> =
            self.records().into_iter().map(|n| (n.id.as_str(), n)).collect();
        for part in &root.has_part {
            if !records.contains_key(part.id.as_str()) {
                return Err(corrupted(format!("root references unknown record {}", part.id)));
            }
        }
        if root.has_part.len() != records.len() {
            return Err(corrupted("record datasets not referenced from the root".to_string()));
        }

        let files: HashMap<&str, &FileNode> =
            self.files().into_iter().map(|f| (f.id.as_str(), f)).collect();
        let mut claimed = HashSet::new();
        for record in records.values() {
            for part in &record.has_part {
                if !files.contains_key(part.id.as_str()) {
                    return Err(corrupted(format!(
                        "record {} references unknown file {}",
                        record.id, part.id
                    )));
                }
                if !claimed.insert(part.id.as_str()) {
                    return Err(corrupted(format!("file {} claimed twice", part.id)));
                }
            }
        }
        if claimed.len() != files.len() {
            return Err(corrupted("file nodes not referenced by any record".to_string()));
        }

        for file in files.values() {
            if file.sha256.len() != 64 || !file.sha256.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(corrupted(format!("file '{}' has invalid checksum", file.id)));
            }
        }

        Ok(())
    }
}

/// Identity of the software that produced the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generator {
    pub name: String,
    pub version: String,
}

impl Generator {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Generator {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Publishing organisation described in the root dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub name: String,
    pub identifier: Option<String>,
    pub url: Option<String>,
}

impl From<&TeamSettings> for Organization {
    fn from(team: &TeamSettings) -> Self {
        Organization {
            name: team.name().to_string(),
            identifier: team.org_id().map(str::to_string),
            url: team.link_href().map(str::to_string),
        }
    }
}

/// One record as it was written to the archive.
#[derive(Debug, Clone)]
pub struct ManifestRecord {
    pub info: RecordInfo,
    pub entries: Vec<ArchiveEntry>,
}

/// Accumulates records during an export and renders the manifest.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    generator: Generator,
    organization: Option<Organization>,
    records: Vec<ManifestRecord>,
}

impl ManifestBuilder {
    pub fn new(generator: Generator) -> Self {
        ManifestBuilder {
            generator,
            organization: None,
            records: Vec::new(),
        }
    }

    pub fn with_organization(mut self, organization: Organization) -> Self {
        self.organization = Some(organization);
        self
    }

    /// Record a written record with its entries, in write order.
    pub fn add_record(&mut self, info: RecordInfo, entries: Vec<ArchiveEntry>) {
        self.records.push(ManifestRecord { info, entries });
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Build the manifest graph.
    pub fn document(&self, root_title: &str, generated_at: DateTime<Utc>) -> ManifestDocument {
        let mut graph = Vec::with_capacity(4 + self.records.len() * 3);

        graph.push(ManifestNode::CreativeWork(DescriptorNode {
            id: MANIFEST_PATH.to_string(),
            conforms_to: IdRef::new(CONFORMS_TO),
            about: IdRef::new(ROOT_ID),
            version: Some(ARCHIVE_FORMAT_VERSION.to_string()),
        }));

        graph.push(ManifestNode::Dataset(DatasetNode {
            id: ROOT_ID.to_string(),
            name: root_title.to_string(),
            identifier: None,
            genre: None,
            date_created: Some(generated_at),
            author: None,
            keywords: None,
            sd_publisher: Some(IdRef::new(GENERATOR_ID)),
            source_organization: self.organization.as_ref().map(|_| IdRef::new(ORGANIZATION_ID)),
            has_part: self
                .records
                .iter()
                .map(|r| IdRef::new(record_node_id(r.info.kind(), r.info.id())))
                .collect(),
        }));

        graph.push(ManifestNode::SoftwareApplication(SoftwareNode {
            id: GENERATOR_ID.to_string(),
            name: self.generator.name.clone(),
            version: self.generator.version.clone(),
        }));

        if let Some(org) = &self.organization {
            graph.push(ManifestNode::Organization(OrganizationNode {
                id: ORGANIZATION_ID.to_string(),
                name: org.name.clone(),
                identifier: org.identifier.clone(),
                url: org.url.clone(),
            }));
        }

        // Authors get ids in order of first appearance.
        let mut authors: Vec<&str> = Vec::new();

        for record in &self.records {
            let info = &record.info;
            let author_index = match authors.iter().position(|a| *a == info.author_name()) {
                Some(index) => index,
                None => {
                    authors.push(info.author_name());
                    authors.len() - 1
                }
            };

            graph.push(ManifestNode::Dataset(DatasetNode {
                id: record_node_id(info.kind(), info.id()),
                name: info.title().to_string(),
                identifier: Some(format!("{}:{}", info.kind(), info.id())),
                genre: Some(info.kind().to_string()),
                date_created: Some(info.created_at()),
                author: Some(IdRef::new(person_id(author_index))),
                keywords: if info.tags().is_empty() {
                    None
                } else {
                    Some(info.tags().join(","))
                },
                sd_publisher: None,
                source_organization: None,
                has_part: record.entries.iter().map(|e| IdRef::new(&e.path)).collect(),
            }));

            for entry in &record.entries {
                graph.push(ManifestNode::File(FileNode {
                    id: entry.path.clone(),
                    name: entry
                        .path
                        .rsplit('/')
                        .next()
                        .unwrap_or(entry.path.as_str())
                        .to_string(),
                    content_size: entry.size_bytes,
                    sha256: entry.sha256.clone(),
                    encoding_format: Some(encoding_format(&entry.path).to_string()),
                }));
            }
        }

        for (index, name) in authors.iter().enumerate() {
            graph.push(ManifestNode::Person(PersonNode {
                id: person_id(index),
                name: name.to_string(),
            }));
        }

        ManifestDocument {
            context: MANIFEST_CONTEXT.to_string(),
            graph,
        }
    }

    /// Render the manifest as pretty-printed JSON.
    pub fn build(&self, root_title: &str, generated_at: DateTime<Utc>) -> Result<Vec<u8>> {
        self.document(root_title, generated_at).to_json_bytes()
    }
}

/// `@id` of a record dataset: its archive directory.
pub fn record_node_id(kind: RecordKind, id: i64) -> String {
    format!("{}/{}/", kind.dir_name(), id)
}

fn person_id(index: usize) -> String {
    format!("#person-{}", index + 1)
}

/// MIME type hint from the file extension.
fn encoding_format(path: &str) -> &'static str {
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}
