//! Zstandard TSV to Parquet conversion
//!
//! The archive is decoded as one forward stream, split into tab-separated
//! rows and written as Parquet row groups of `batch_rows` rows, so memory use
//! follows the batch size rather than the archive size. The output is written
//! to `<destination>.part` and renamed only after the writer closed cleanly.

use arrow::array::{ArrayRef, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use preloader_common::{LocalArchive, PreloaderError, Result, TransformedOutput};
use std::fmt::Display;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::fsops::{self, PartFile};

#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, archive: &LocalArchive, destination: &Path) -> Result<TransformedOutput>;
}

/// Converts `.tsv.zst` archives into nullable UTF-8 Parquet columns
#[derive(Debug, Clone)]
pub struct TsvToParquetTransformer {
    columns: Arc<[String]>,
    batch_rows: usize,
}

impl TsvToParquetTransformer {
    pub fn new(columns: Vec<String>, batch_rows: usize) -> Result<Self> {
        if columns.is_empty() {
            return Err(PreloaderError::config("at least one column is required"));
        }
        if batch_rows == 0 {
            return Err(PreloaderError::config("processor.chunk_size must be greater than 0"));
        }
        Ok(Self {
            columns: columns.into(),
            batch_rows,
        })
    }

    fn schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

#[async_trait]
impl Transformer for TsvToParquetTransformer {
    async fn transform(&self, archive: &LocalArchive, destination: &Path) -> Result<TransformedOutput> {
        let output = TransformedOutput {
            path: destination.to_path_buf(),
        };
        if fsops::exists(destination).await? {
            info!(output = %destination.display(), "Parquet file already exists, skipping");
            return Ok(output);
        }

        info!(archive = %archive.file_name(), output = %destination.display(), "Converting archive to Parquet");
        let job = ConversionJob {
            source: archive.path.clone(),
            destination: destination.to_path_buf(),
            schema: self.schema(),
            columns: self.columns.len(),
            batch_rows: self.batch_rows,
        };
        let rows = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| PreloaderError::processing(&archive.path, format!("conversion task failed: {e}")))??;

        info!(archive = %archive.file_name(), rows, "Finished converting archive");
        Ok(output)
    }
}

/// Owned inputs of one blocking conversion
struct ConversionJob {
    source: PathBuf,
    destination: PathBuf,
    schema: SchemaRef,
    columns: usize,
    batch_rows: usize,
}

impl ConversionJob {
    fn processing_error<E: Display>(&self) -> impl Fn(E) -> PreloaderError + '_ {
        move |e| PreloaderError::processing(&self.source, e.to_string())
    }

    /// Returns the number of rows written
    fn run(self) -> Result<u64> {
        let part = PartFile::create(&self.destination)?;

        let input = File::open(&self.source)?;
        let decoder = zstd::stream::read::Decoder::new(input).map_err(self.processing_error())?;
        let mut rows = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .quoting(false)
            .flexible(true)
            .from_reader(decoder);

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_max_row_group_size(self.batch_rows)
            .build();
        let out = BufWriter::new(File::create(part.part_path())?);
        let mut writer = ArrowWriter::try_new(out, self.schema.clone(), Some(props))
            .map_err(|e| PreloaderError::processing(&self.source, format!("parquet writer init failed: {e}")))?;

        let mut builders: Vec<StringBuilder> = (0..self.columns).map(|_| StringBuilder::new()).collect();
        let mut record = csv::StringRecord::new();
        let mut pending = 0usize;
        let mut total: u64 = 0;

        while rows.read_record(&mut record).map_err(self.processing_error())? {
            if record.len() != self.columns {
                let line = record.position().map(|p| p.line()).unwrap_or(total + 1);
                return Err(PreloaderError::processing(
                    &self.source,
                    format!("line {line}: expected {} fields, found {}", self.columns, record.len()),
                ));
            }
            for (builder, field) in builders.iter_mut().zip(record.iter()) {
                if field.is_empty() {
                    builder.append_null();
                } else {
                    builder.append_value(field);
                }
            }
            pending += 1;
            total += 1;

            if pending == self.batch_rows {
                self.flush_batch(&mut writer, &mut builders)?;
                pending = 0;
            }
        }
        if pending > 0 {
            self.flush_batch(&mut writer, &mut builders)?;
        }

        let out = writer
            .into_inner()
            .map_err(|e| PreloaderError::processing(&self.source, format!("parquet close failed: {e}")))?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        part.commit()?;
        Ok(total)
    }

    fn flush_batch(&self, writer: &mut ArrowWriter<BufWriter<File>>, builders: &mut [StringBuilder]) -> Result<()> {
        let arrays: Vec<ArrayRef> = builders
            .iter_mut()
            .map(|builder| Arc::new(builder.finish()) as ArrayRef)
            .collect();
        let batch = RecordBatch::try_new(self.schema.clone(), arrays).map_err(self.processing_error())?;
        debug!(rows = batch.num_rows(), "Writing row group");
        writer
            .write(&batch)
            .map_err(|e| PreloaderError::processing(&self.source, format!("parquet write failed: {e}")))
    }
}
