//! Streaming export pipeline.
//!
//! Drives one export through `Init → Resolving → Streaming → Finalizing →
//! Done`. Any failure moves the pipeline to `Failed`: the archive writer is
//! aborted (discarding partial output) and the originating error is returned
//! with the offending slug attached. Nothing is retried.
//!
//! Records are streamed one at a time, one attachment at a time; memory use is
//! bounded by the chunk size and the entry index, not by the export size.

use crate::cancel::CancellationToken;
use crate::error::{ExportError, Result};
use crate::logging::generate_run_id;
use crate::naming::{entry_path, EntryNames, RECORD_DOCUMENT};
use crate::resolver::SlugResolver;
use crate::source::{ContentSource, RecordStore};
use crate::stream::{ChunkError, ChunkReader};
use chrono::{DateTime, SubsecRound, Utc};
use eln_archive::{
    ArchiveEntry, ArchiveOptions, ArchiveSink, ArchiveWriter, Compression, Generator,
    ManifestBuilder, Organization,
};
use eln_common::{
    AttachmentRef, ExportRequest, RecordInfo, Slug, TeamSettings, SCHEMA_VERSION,
};
use eln_config::{ArchiveCompression, EmptyExportPolicy, ExportConfig};
use serde::Serialize;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn};

/// Pipeline lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Resolving,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// Per-export settings.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub empty_policy: EmptyExportPolicy,
    pub chunk_size: usize,
    pub read_timeout: Option<Duration>,
    pub record_timeout: Option<Duration>,
    pub compression: Compression,
    /// Root dataset name; defaults to one naming the owner.
    pub archive_title: Option<String>,
    pub generator: Generator,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

impl ExportOptions {
    pub fn from_config(config: &ExportConfig) -> Self {
        ExportOptions {
            empty_policy: config.empty_policy,
            chunk_size: config.chunk_size,
            read_timeout: config.read_timeout(),
            record_timeout: config.record_timeout(),
            compression: match config.compression {
                ArchiveCompression::Deflated => Compression::Deflated,
                ArchiveCompression::Stored => Compression::Stored,
            },
            archive_title: config.archive_title.clone(),
            generator: Generator::new("eln-export", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_empty_policy(mut self, policy: EmptyExportPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_record_timeout(mut self, timeout: Duration) -> Self {
        self.record_timeout = Some(timeout);
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// Outcome of a successful export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary<O> {
    pub run_id: String,
    pub records: usize,
    /// Entries written, including the manifest.
    pub entries: usize,
    /// Uncompressed bytes written, including the manifest.
    pub bytes: u64,
    pub generated_at: DateTime<Utc>,
    pub location: O,
}

/// JSON rendering of a record written next to its attachments.
#[derive(Serialize)]
struct RecordDocument<'a> {
    schema_version: &'static str,
    #[serde(flatten)]
    info: &'a RecordInfo,
    team_id: i64,
    attachments: &'a [String],
}

/// One export run.
pub struct ExportPipeline<'a> {
    store: &'a dyn RecordStore,
    content: &'a dyn ContentSource,
    options: ExportOptions,
    cancel: CancellationToken,
    generated_at: Option<DateTime<Utc>>,
    run_id: String,
    state: PipelineState,
}

impl<'a> ExportPipeline<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        content: &'a dyn ContentSource,
        options: ExportOptions,
    ) -> Self {
        ExportPipeline {
            store,
            content,
            options,
            cancel: CancellationToken::new(),
            generated_at: None,
            run_id: generate_run_id(),
            state: PipelineState::Init,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fix the generation timestamp instead of reading the clock.
    pub fn with_generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Generation timestamp this export uses, fixing it on first call.
    pub fn generated_at(&mut self) -> DateTime<Utc> {
        *self
            .generated_at
            .get_or_insert_with(|| Utc::now().trunc_subsecs(0))
    }

    /// Run the export.
    ///
    /// `open_sink` is called once, after the request has been validated and
    /// resolved; failures before that point leave no output at all.
    pub fn run<S, F>(&mut self, request: &ExportRequest, open_sink: F) -> Result<ExportSummary<S::Output>>
    where
        S: ArchiveSink,
        F: FnOnce() -> io::Result<S>,
    {
        if self.state != PipelineState::Init {
            return Err(ExportError::state(format!(
                "pipeline already ran (state {:?})",
                self.state
            )));
        }

        let generated_at = self.generated_at();
        let span = info_span!(
            "export",
            run_id = %self.run_id,
            owner = %request.owner_id,
            team = %request.team_id,
        );
        let _guard = span.enter();

        info!(include_resources = request.include_resources, "Export started");

        self.state = PipelineState::Resolving;
        let prepared = self.prepare(request);
        let (slugs, organization) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.fail(e, None::<&mut ArchiveWriter<S>>)),
        };

        let sink = match open_sink() {
            Ok(sink) => sink,
            Err(e) => {
                return Err(self.fail(
                    eln_archive::ArchiveError::Io(e).into(),
                    None::<&mut ArchiveWriter<S>>,
                ))
            }
        };

        self.state = PipelineState::Streaming;
        let mut writer = ArchiveWriter::new(
            sink,
            ArchiveOptions::default()
                .with_compression(self.options.compression)
                .with_modified_at(generated_at),
        );
        let mut manifest =
            ManifestBuilder::new(self.options.generator.clone()).with_organization(organization);

        let title = self
            .options
            .archive_title
            .clone()
            .unwrap_or_else(|| format!("Notebook export of user {}", request.owner_id));

        match self.write_archive(&slugs, &mut writer, &mut manifest, &title, generated_at) {
            Ok(location) => {
                self.state = PipelineState::Done;
                let summary = ExportSummary {
                    run_id: self.run_id.clone(),
                    records: manifest.record_count(),
                    entries: writer.entries().len(),
                    bytes: writer.bytes_written(),
                    generated_at,
                    location,
                };
                info!(
                    records = summary.records,
                    entries = summary.entries,
                    bytes = summary.bytes,
                    "Export complete"
                );
                Ok(summary)
            }
            Err(e) => Err(self.fail(e, Some(&mut writer))),
        }
    }

    /// Validate, resolve slugs and read team settings.
    fn prepare(&self, request: &ExportRequest) -> Result<(Vec<Slug>, Organization)> {
        let slugs = SlugResolver::new(self.store)
            .with_empty_policy(self.options.empty_policy)
            .resolve(request)?;

        let row = self.store.team(request.team_id)?;
        let team = TeamSettings::from_row(&row).map_err(|e| {
            ExportError::content(format!("team {} settings: {}", request.team_id, e))
        })?;

        self.check_cancelled(None)?;
        Ok((slugs, Organization::from(&team)))
    }

    fn write_archive<S: ArchiveSink>(
        &mut self,
        slugs: &[Slug],
        writer: &mut ArchiveWriter<S>,
        manifest: &mut ManifestBuilder,
        title: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<S::Output> {
        for slug in slugs {
            self.stream_record(slug, writer, manifest)
                .map_err(|e| e.with_slug(*slug))?;
        }

        self.check_cancelled(None)?;
        self.state = PipelineState::Finalizing;

        let bytes = manifest.build(title, generated_at)?;
        writer.write_manifest(&bytes)?;
        Ok(writer.finalize()?)
    }

    fn stream_record<S: ArchiveSink>(
        &self,
        slug: &Slug,
        writer: &mut ArchiveWriter<S>,
        manifest: &mut ManifestBuilder,
    ) -> Result<()> {
        self.check_cancelled(Some(slug))?;

        let started = Instant::now();
        let deadline = self.options.record_timeout.map(|t| started + t);

        let metadata = self.content.fetch(slug)?;
        if !metadata.info().matches(slug) {
            return Err(ExportError::content(format!(
                "content source returned {}:{} for {}",
                metadata.info().kind(),
                metadata.info().id(),
                slug
            )));
        }

        let (info, attachments) = metadata.into_parts();

        let mut names = EntryNames::new();
        let assigned: Vec<String> = attachments
            .iter()
            .enumerate()
            .map(|(index, attachment)| names.assign(attachment.filename(), index))
            .collect();

        let mut entries = Vec::with_capacity(attachments.len() + 1);

        let document = serde_json::to_vec_pretty(&RecordDocument {
            schema_version: SCHEMA_VERSION,
            info: &info,
            team_id: slug.team_id.0,
            attachments: &assigned,
        })
        .map_err(|e| ExportError::content(format!("record document: {}", e)))?;

        writer.begin_entry(&entry_path(slug, RECORD_DOCUMENT), Some(document.len() as u64))?;
        writer.write_chunk(&document)?;
        entries.push(writer.end_entry()?);

        for (attachment, name) in attachments.into_iter().zip(assigned.iter()) {
            let entry = self.stream_attachment(slug, writer, &entry_path(slug, name), attachment, deadline)?;
            entries.push(entry);
        }

        debug!(
            slug = %slug,
            entries = entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Record streamed"
        );

        manifest.add_record(info, entries);
        Ok(())
    }

    fn stream_attachment<S: ArchiveSink>(
        &self,
        slug: &Slug,
        writer: &mut ArchiveWriter<S>,
        path: &str,
        attachment: AttachmentRef,
        deadline: Option<Instant>,
    ) -> Result<ArchiveEntry> {
        let declared = attachment.byte_length();
        writer.begin_entry(path, declared)?;

        let mut reader = ChunkReader::new(
            attachment.into_content(),
            self.options.chunk_size,
            self.options.read_timeout,
            deadline.is_some(),
        )
        .map_err(|e| ExportError::content(format!("cannot start reading {}: {}", path, e)))?;

        loop {
            self.check_cancelled(Some(slug))?;
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(self.record_timed_out(path));
            }

            match reader.next_chunk(deadline) {
                Ok(Some(chunk)) => writer.write_chunk(chunk)?,
                Ok(None) => break,
                Err(ChunkError::TimedOut(waited)) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(self.record_timed_out(path));
                    }
                    return Err(ExportError::content(format!(
                        "reading {} timed out after {:?}",
                        path, waited
                    )));
                }
                Err(ChunkError::Io(e)) => {
                    return Err(ExportError::content(format!("reading {}: {}", path, e)));
                }
            }
        }

        let entry = writer.end_entry()?;
        if let Some(declared) = declared {
            if entry.size_bytes != declared {
                return Err(ExportError::content(format!(
                    "{} declared {} bytes but {} were read",
                    path, declared, entry.size_bytes
                )));
            }
        }
        Ok(entry)
    }

    fn record_timed_out(&self, path: &str) -> ExportError {
        ExportError::content(format!(
            "record time limit of {:?} exceeded while writing {}",
            self.options.record_timeout.unwrap_or_default(),
            path
        ))
    }

    fn check_cancelled(&self, slug: Option<&Slug>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled {
                slug: slug.copied(),
            });
        }
        Ok(())
    }

    /// Move to `Failed`, discard partial output and hand back the error.
    fn fail<S: ArchiveSink>(
        &mut self,
        err: ExportError,
        writer: Option<&mut ArchiveWriter<S>>,
    ) -> ExportError {
        let from = self.state;
        self.state = PipelineState::Failed;

        if let Some(writer) = writer {
            if let Err(abort_err) = writer.abort() {
                warn!(error = %abort_err, "Abort after failure did not complete");
            }
        }

        error!(
            kind = %err.kind(),
            slug = ?err.slug(),
            state = ?from,
            error = %err,
            "Export failed"
        );
        err
    }
}
