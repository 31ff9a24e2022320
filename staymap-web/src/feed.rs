//! Output feed export, written once when the crawl completes.

use crate::record::HotelRecord;
use staymap_common::Result;
use staymap_config::FeedFormat;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write `records` to `path`, replacing any previous feed.
///
/// The data goes to a sibling `.tmp` file first and is renamed into place,
/// so readers never observe a half-written feed.
pub fn write_feed(path: &Path, format: FeedFormat, records: &[HotelRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        match format {
            FeedFormat::Json => {
                serde_json::to_writer_pretty(&mut out, records).map_err(std::io::Error::from)?;
                out.write_all(b"\n")?;
            }
            FeedFormat::Jsonlines => {
                for record in records {
                    serde_json::to_writer(&mut out, record).map_err(std::io::Error::from)?;
                    out.write_all(b"\n")?;
                }
            }
        }
        out.flush()?;
    }
    fs::rename(&tmp, path)?;

    tracing::info!(
        target: "feed",
        path = %path.display(),
        format = ?format,
        records = records.len(),
        "feed.written"
    );
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "feed".into());
    name.push(".tmp");
    path.with_file_name(name)
}
