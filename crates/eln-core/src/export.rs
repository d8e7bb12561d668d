//! Export into a file in an output directory.

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::naming::output_file_name;
use crate::pipeline::{ExportOptions, ExportPipeline, ExportSummary};
use crate::source::{ContentSource, RecordStore};
use eln_archive::FileSink;
use eln_common::ExportRequest;
use std::path::{Path, PathBuf};

/// Export `request` to `output_dir/export-<timestamp>-userid-<owner>.eln`.
///
/// The archive is staged next to its destination and only appears under its
/// final name once it is complete; a failed or cancelled export leaves no file
/// behind. An existing file with the same name is never overwritten.
pub fn export_to_dir(
    store: &dyn RecordStore,
    content: &dyn ContentSource,
    options: ExportOptions,
    request: &ExportRequest,
    output_dir: &Path,
    cancel: CancellationToken,
) -> Result<ExportSummary<PathBuf>> {
    let mut pipeline = ExportPipeline::new(store, content, options).with_cancellation(cancel);
    let destination = output_dir.join(output_file_name(request.owner_id, pipeline.generated_at()));

    pipeline.run(request, || FileSink::create(destination))
}
