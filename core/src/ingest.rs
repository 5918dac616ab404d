/// Ingestion driver: apply a directory of webhook payload files to the store
///
/// Files are classified by name ("message" / "status"). All message files are
/// processed before any status file so that a status arriving in the same
/// batch as its message finds it. A file that fails to parse is logged and
/// skipped; only storage failures abort the run.
use crate::error::{ChatError, Result};
use crate::message_store::{InsertOutcome, MessageStore, StatusOutcome};
use crate::normalizer::{normalize_slice, Normalized};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which phase a payload file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Message,
    Status,
}

/// Counts reported after a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub processed_messages: u64,
    pub updated_statuses: u64,
    pub total_messages: u64,
    pub conversations_count: u64,
    pub unmatched_statuses: u64,
    pub skipped_files: u64,
}

/// Phases a file name takes part in. A name containing both words is
/// processed in both phases.
pub fn classify_file(name: &str) -> Vec<FileKind> {
    let mut kinds = Vec::new();
    if name.contains("message") {
        kinds.push(FileKind::Message);
    }
    if name.contains("status") {
        kinds.push(FileKind::Status);
    }
    kinds
}

/// `*.json` files in `dir` for each phase, in file name order
fn collect_files(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    if !dir.is_dir() {
        return Err(ChatError::NotFound(format!(
            "payload directory {} not found",
            dir.display()
        )));
    }

    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".json"))
        .collect();
    names.sort();

    let mut message_files = Vec::new();
    let mut status_files = Vec::new();
    for name in names {
        for kind in classify_file(&name) {
            match kind {
                FileKind::Message => message_files.push(dir.join(&name)),
                FileKind::Status => status_files.push(dir.join(&name)),
            }
        }
    }
    Ok((message_files, status_files))
}

/// Run one ingestion pass over `dir`
pub fn ingest_dir(store: &MessageStore, dir: &Path) -> Result<IngestReport> {
    let (message_files, status_files) = collect_files(dir)?;
    info!(
        "Found {} message files and {} status files in {}",
        message_files.len(),
        status_files.len(),
        dir.display()
    );

    let mut report = IngestReport::default();
    // A file listed in both phases is skipped only if neither phase took it
    let mut accepted: HashSet<&Path> = HashSet::new();
    let mut rejected: HashSet<&Path> = HashSet::new();

    for path in &message_files {
        match read_normalized(path, FileKind::Message) {
            Some(Normalized::Message(record)) => {
                accepted.insert(path.as_path());
                if store.insert_if_absent(&record)? == InsertOutcome::Inserted {
                    info!("Inserted message: {} from {}", record.id, record.contact_name);
                    report.processed_messages += 1;
                }
            }
            _ => {
                rejected.insert(path.as_path());
            }
        }
    }

    for path in &status_files {
        match read_normalized(path, FileKind::Status) {
            Some(Normalized::Status(update)) => {
                accepted.insert(path.as_path());
                match store.apply_status(&update)? {
                    StatusOutcome::Applied(record) => {
                        info!("Updated status for message {} to {}", record.id, update.status);
                        report.updated_statuses += 1;
                    }
                    StatusOutcome::NotFound => {
                        warn!("No message found for status update: {}", update.message_id);
                        report.unmatched_statuses += 1;
                    }
                }
            }
            _ => {
                rejected.insert(path.as_path());
            }
        }
    }
    report.skipped_files = rejected.difference(&accepted).count() as u64;

    store.flush()?;
    report.total_messages = store.count() as u64;
    report.conversations_count = store.conversation_count()? as u64;

    info!(
        "Ingestion done: {} inserted, {} statuses applied, {} total messages, {} conversations",
        report.processed_messages,
        report.updated_statuses,
        report.total_messages,
        report.conversations_count
    );
    Ok(report)
}

/// Read and normalize one file. Returns `None` (after logging) when the file
/// is unreadable, malformed, or not of the expected kind.
fn read_normalized(path: &Path, expected: FileKind) -> Option<Normalized> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            return None;
        }
    };

    let normalized = match normalize_slice(&raw) {
        Ok(n) => n,
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            return None;
        }
    };

    let matches = matches!(
        (&normalized, expected),
        (Normalized::Message(_), FileKind::Message) | (Normalized::Status(_), FileKind::Status)
    );
    if !matches {
        if let Normalized::Unrecognized(reason) = &normalized {
            warn!("Skipping {}: {}", path.display(), reason);
        } else {
            warn!(
                "Skipping {}: {} payload in {:?} phase",
                path.display(),
                normalized.kind(),
                expected
            );
        }
        return None;
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_file() {
        assert_eq!(classify_file("conversation_1_message_1.json"), vec![FileKind::Message]);
        assert_eq!(classify_file("conversation_1_status_1.json"), vec![FileKind::Status]);
        assert!(classify_file("notes.json").is_empty());
        assert_eq!(
            classify_file("message_status.json"),
            vec![FileKind::Message, FileKind::Status]
        );
    }
}
