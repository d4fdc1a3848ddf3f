use crate::error::{ReviewError, Result};
use crate::hashing::paper_id_from_title;
use crate::schema::{ExtractedContent, PaperMetadata, ReviewRecord};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Appends `value` as a single JSON line. Existing lines are never rewritten.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Reads every non-blank line of a JSONL file. The first malformed line is an
/// error; use [`crate::qc::validate_jsonl`] to report bad lines instead.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|e| {
            ReviewError::InvalidInput(format!("{} line {}: {}", path.display(), idx + 1, e))
        })?;
        items.push(item);
    }
    Ok(items)
}

pub fn read_records(path: &Path) -> Result<Vec<ReviewRecord>> {
    read_jsonl(path)
}

/// Writes through a sibling temp file and a rename so readers never see a
/// half-written file.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| ReviewError::InvalidInput(format!("not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads the paper list CSV (`paper_title,paper_url,source_type[,abstract]`).
/// Rows without a title are skipped.
pub fn read_paper_list(path: &Path) -> Result<Vec<PaperMetadata>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut papers = Vec::new();
    for row in reader.deserialize() {
        let paper: PaperMetadata = row?;
        if paper.paper_title.is_empty() {
            debug!("Skipping paper list row with an empty title");
            continue;
        }
        papers.push(paper);
    }
    info!("Loaded {} paper(s) from {}", papers.len(), path.display());
    Ok(papers)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub paper_id: String,
    pub paper_title: String,
    pub paper_url: String,
    pub source_type: String,
}

impl From<&PaperMetadata> for ManifestEntry {
    fn from(paper: &PaperMetadata) -> Self {
        Self {
            paper_id: paper_id_from_title(&paper.paper_title),
            paper_title: paper.paper_title.clone(),
            paper_url: paper.paper_url.clone(),
            source_type: paper.source_type.clone(),
        }
    }
}

pub fn manifest_path(dir: &Path, run_id: &str) -> PathBuf {
    dir.join(format!("manifest_{}.json", run_id))
}

/// Writes `manifest_<run_id>.json` under `dir` and returns its path.
pub fn write_manifest(dir: &Path, run_id: &str, papers: &[PaperMetadata]) -> Result<PathBuf> {
    let entries: Vec<ManifestEntry> = papers.iter().map(ManifestEntry::from).collect();
    let path = manifest_path(dir, run_id);
    atomic_write(&path, serde_json::to_string_pretty(&entries)?.as_bytes())?;
    info!("Wrote manifest with {} entries to {}", entries.len(), path.display());
    Ok(path)
}

/// Concatenates the non-blank lines of `inputs` into `output`, in order.
/// Lines are copied verbatim; nothing is re-serialized. Returns the line count.
pub fn aggregate_jsonl(inputs: &[PathBuf], output: &Path) -> Result<usize> {
    let mut buffer = String::new();
    let mut count = 0;
    for input in inputs {
        let reader = BufReader::new(File::open(input)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            buffer.push_str(line.trim_end());
            buffer.push('\n');
            count += 1;
        }
    }
    atomic_write(output, buffer.as_bytes())?;
    info!("Aggregated {} line(s) from {} file(s) into {}", count, inputs.len(), output.display());
    Ok(count)
}

/// Reads every non-blank line as untyped JSON, used by the means report.
pub fn read_values(path: &Path) -> Result<Vec<Value>> {
    read_jsonl(path)
}

/// Loads `<paper_id>.json` produced by the extraction step.
pub fn read_extracted_content(dir: &Path, paper_id: &str) -> Result<ExtractedContent> {
    let path = dir.join(format!("{}.json", paper_id));
    let text = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&text)?)
}

/// [`read_extracted_content`] where a paper with no extraction output gets
/// empty content. Unreadable or malformed files are still errors.
pub fn load_extracted_content(dir: &Path, paper_id: &str) -> Result<ExtractedContent> {
    match read_extracted_content(dir, paper_id) {
        Err(ReviewError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            warn!(
                "No extracted content for {} in {}; reviewing from metadata only",
                paper_id,
                dir.display()
            );
            Ok(ExtractedContent::default())
        }
        other => other,
    }
}
