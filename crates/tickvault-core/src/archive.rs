//! Day archives: `{outdir}/{YYYY-MM-DD}.csv.gz`.
//!
//! The same layout holds ticker reference data and trade prints; only the
//! header differs.
//!
//! Rows stream into `{YYYY-MM-DD}.csv.gz.partial`. Only [`ArchiveWriter::commit`]
//! renames the file into place, after the gzip trailer is written and the file
//! is synced, so the final name always denotes a complete day. A writer dropped
//! before commit removes its partial file.

use std::path::{Path, PathBuf};

use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use thiserror::Error;
use time::Date;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use crate::domain::{format_date, TickerRecord};

const ARCHIVE_EXTENSION: &str = "csv.gz";
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode csv row: {0}")]
    Csv(#[from] csv::Error),
}

impl ArchiveError {
    fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.display().to_string(),
            source,
        }
    }
}

/// Final location of the archive for `date`.
pub fn archive_path(outdir: &Path, date: Date) -> PathBuf {
    outdir.join(format!("{}.{ARCHIVE_EXTENSION}", format_date(date)))
}

/// In-progress location of the archive for `date`.
pub fn partial_path(outdir: &Path, date: Date) -> PathBuf {
    outdir.join(format!(
        "{}.{ARCHIVE_EXTENSION}{PARTIAL_SUFFIX}",
        format_date(date)
    ))
}

/// Removes the partial file unless disarmed.
#[derive(Debug)]
struct PartialFileGuard {
    path: PathBuf,
    armed: bool,
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Streaming gzip CSV writer for one day.
pub struct ArchiveWriter {
    encoder: GzipEncoder<File>,
    guard: PartialFileGuard,
    final_path: PathBuf,
    rows: usize,
}

impl ArchiveWriter {
    /// Creates (or truncates) the partial file and writes `columns` as header.
    pub async fn create(outdir: &Path, date: Date, columns: &[&str]) -> Result<Self, ArchiveError> {
        tokio::fs::create_dir_all(outdir)
            .await
            .map_err(|source| ArchiveError::io("create", outdir, source))?;
        let partial = partial_path(outdir, date);
        let file = File::create(&partial)
            .await
            .map_err(|source| ArchiveError::io("create", &partial, source))?;

        let mut writer = Self {
            encoder: GzipEncoder::new(file),
            guard: PartialFileGuard {
                path: partial,
                armed: true,
            },
            final_path: archive_path(outdir, date),
            rows: 0,
        };
        writer.write_fields(columns).await?;
        Ok(writer)
    }

    pub async fn write_record(&mut self, record: &TickerRecord) -> Result<(), ArchiveError> {
        self.write_row(&record.to_row()).await
    }

    /// Appends one data row.
    pub async fn write_row<I, T>(&mut self, fields: I) -> Result<(), ArchiveError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.write_fields(fields).await?;
        self.rows += 1;
        Ok(())
    }

    /// Data rows written so far, header excluded.
    pub const fn rows(&self) -> usize {
        self.rows
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Finishes the gzip stream, syncs and renames the archive into place.
    pub async fn commit(mut self) -> Result<PathBuf, ArchiveError> {
        let partial = self.guard.path.clone();
        self.encoder
            .shutdown()
            .await
            .map_err(|source| ArchiveError::io("finish", &partial, source))?;
        self.encoder
            .get_mut()
            .sync_all()
            .await
            .map_err(|source| ArchiveError::io("sync", &partial, source))?;

        tokio::fs::rename(&partial, &self.final_path)
            .await
            .map_err(|source| ArchiveError::io("rename", &partial, source))?;
        self.guard.armed = false;

        Ok(std::mem::take(&mut self.final_path))
    }

    async fn write_fields<I, T>(&mut self, fields: I) -> Result<(), ArchiveError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let bytes = encode_row(fields)?;
        self.encoder
            .write_all(&bytes)
            .await
            .map_err(|source| ArchiveError::io("write", &self.guard.path, source))
    }
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("partial_path", &self.guard.path)
            .field("final_path", &self.final_path)
            .field("rows", &self.rows)
            .finish()
    }
}

/// First-column values of a committed archive, header excluded.
///
/// Used to rebuild a day's surviving ticker set from its reference archive.
pub async fn archived_tickers(path: &Path) -> Result<Vec<String>, ArchiveError> {
    let file = File::open(path)
        .await
        .map_err(|source| ArchiveError::io("open", path, source))?;
    let mut bytes = Vec::new();
    GzipDecoder::new(BufReader::new(file))
        .read_to_end(&mut bytes)
        .await
        .map_err(|source| ArchiveError::io("read", path, source))?;

    let mut tickers = Vec::new();
    for record in csv::Reader::from_reader(bytes.as_slice()).records() {
        if let Some(ticker) = record?.get(0).filter(|ticker| !ticker.is_empty()) {
            tickers.push(ticker.to_owned());
        }
    }
    Ok(tickers)
}

fn encode_row<I, T>(fields: I) -> Result<Vec<u8>, ArchiveError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::Writer::from_writer(Vec::with_capacity(256));
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|error| ArchiveError::Csv(csv::Error::from(error.into_error())))
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::domain::{TradeEvent, TICKER_COLUMNS, TRADE_COLUMNS};

    async fn read_gzip(path: &Path) -> String {
        let file = File::open(path).await.expect("archive should open");
        let mut decoder = GzipDecoder::new(BufReader::new(file));
        let mut text = String::new();
        decoder
            .read_to_string(&mut text)
            .await
            .expect("archive should decompress");
        text
    }

    #[test]
    fn paths_are_named_by_date() {
        let outdir = Path::new("tickers");
        assert_eq!(
            archive_path(outdir, date!(2021 - 01 - 04)),
            PathBuf::from("tickers/2021-01-04.csv.gz")
        );
        assert_eq!(
            partial_path(outdir, date!(2021 - 01 - 04)),
            PathBuf::from("tickers/2021-01-04.csv.gz.partial")
        );
    }

    #[tokio::test]
    async fn commit_renames_complete_archive_into_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        let day = date!(2021 - 01 - 04);

        let mut writer = ArchiveWriter::create(dir.path(), day, &TICKER_COLUMNS)
            .await
            .expect("writer should open");
        assert!(partial_path(dir.path(), day).exists());
        assert!(!archive_path(dir.path(), day).exists());

        writer
            .write_record(&TickerRecord {
                name: Some(String::from("Apple Inc.")),
                ..TickerRecord::new("AAPL")
            })
            .await
            .expect("row should write");
        assert_eq!(writer.rows(), 1);

        let path = writer.commit().await.expect("commit should succeed");
        assert_eq!(path, archive_path(dir.path(), day));
        assert!(!partial_path(dir.path(), day).exists());

        let text = read_gzip(&path).await;
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(TICKER_COLUMNS.join(",").as_str()));
        let row = lines.next().expect("data row");
        assert!(row.starts_with("AAPL,,,,Apple Inc.,"));
        assert_eq!(row.split(',').count(), TICKER_COLUMNS.len());
        assert_eq!(lines.next(), None);
    }

    #[tokio::test]
    async fn dropped_writer_leaves_nothing_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let day = date!(2021 - 01 - 05);

        let writer = ArchiveWriter::create(dir.path(), day, &TICKER_COLUMNS)
            .await
            .expect("writer should open");
        drop(writer);

        assert!(!partial_path(dir.path(), day).exists());
        assert!(!archive_path(dir.path(), day).exists());
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let bytes = encode_row(["BRK.A", "Berkshire Hathaway, Inc.", ""]).expect("row encodes");
        assert_eq!(bytes, b"BRK.A,\"Berkshire Hathaway, Inc.\",\n");
    }

    #[tokio::test]
    async fn trade_archives_carry_their_own_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outdir = dir.path().join("trades");
        let day = date!(2021 - 01 - 06);

        let mut writer = ArchiveWriter::create(&outdir, day, &TRADE_COLUMNS)
            .await
            .expect("writer should create its directory");
        writer
            .write_row(&TradeEvent::new("AAPL").to_row())
            .await
            .expect("row should write");
        let path = writer.commit().await.expect("commit should succeed");

        let text = read_gzip(&path).await;
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![TRADE_COLUMNS.join(",").as_str(), "AAPL,,0,0,,,0,0,0,0,0,0,0"]
        );
    }

    #[tokio::test]
    async fn archived_tickers_reads_back_the_first_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        let day = date!(2021 - 01 - 07);

        let mut writer = ArchiveWriter::create(dir.path(), day, &TICKER_COLUMNS)
            .await
            .expect("writer should open");
        for ticker in ["AAPL", "BRK.A", "MSFT"] {
            writer
                .write_record(&TickerRecord {
                    name: Some(format!("{ticker}, Inc.")),
                    ..TickerRecord::new(ticker)
                })
                .await
                .expect("row should write");
        }
        let path = writer.commit().await.expect("commit should succeed");

        assert_eq!(
            archived_tickers(&path).await.expect("archive should read"),
            vec!["AAPL", "BRK.A", "MSFT"]
        );
    }
}
