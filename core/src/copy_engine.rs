// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use filetime::FileTime;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::definitions::JobStatus;
use crate::errors::CopyError;

const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct CopySettings {
    /// Skip files whose destination copy has the same size and is at least as new.
    pub update_only: bool,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self { update_only: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopySummary {
    pub files_copied: usize,
    pub files_unchanged: usize,
    pub directories_created: usize,
    pub failed_items: usize,
    pub total_items: usize,
}

impl std::fmt::Display for CopySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files copied: {}, files unchanged: {}, directories created: {}, failed items: {}",
            self.files_copied, self.files_unchanged, self.directories_created, self.failed_items
        )
    }
}

/// One transfer from a mounted volume to the destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyJob {
    pub id: Uuid,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub status: JobStatus,
    pub bytes_copied: u64,
    pub last_error: Option<CopyError>,
    pub summary: CopySummary,
}

impl CopyJob {
    fn new(id: Uuid, source: &Path, destination: &Path) -> Self {
        Self {
            id,
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            status: JobStatus::Pending,
            bytes_copied: 0,
            last_error: None,
            summary: CopySummary::default(),
        }
    }
}

/// Starts copy jobs on the blocking thread pool.
#[derive(Debug, Clone, Default)]
pub struct CopyEngine {
    settings: CopySettings,
}

impl CopyEngine {
    pub fn new(settings: CopySettings) -> Self {
        Self { settings }
    }

    pub fn start(&self, id: Uuid, source: &Path, destination: &Path) -> CopyHandle {
        let cancel = CancellationToken::new();
        let bytes = Arc::new(AtomicU64::new(0));
        let job = CopyJob::new(id, source, destination);
        let fallback = job.clone();
        let settings = self.settings;
        let (task_cancel, task_bytes) = (cancel.clone(), bytes.clone());
        let join = tokio::task::spawn_blocking(move || copy_tree(job, settings, &task_cancel, &task_bytes));
        CopyHandle { cancel, bytes, join, fallback }
    }
}

/// Control side of a running copy job.
pub struct CopyHandle {
    cancel: CancellationToken,
    bytes: Arc<AtomicU64>,
    join: JoinHandle<CopyJob>,
    fallback: CopyJob,
}

impl CopyHandle {
    /// Asks the engine to stop after the file currently being transferred.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn bytes_copied(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Waits for the terminal state of the job. Must not be called again once it returned.
    pub async fn wait(&mut self) -> CopyJob {
        match (&mut self.join).await {
            Ok(job) => job,
            Err(e) => {
                warn!("Copy task for job {} ended abnormally: {}", self.fallback.id, e);
                let mut job = self.fallback.clone();
                job.status = JobStatus::Failed;
                job.bytes_copied = self.bytes_copied();
                job.last_error = Some(CopyError::DestinationUnavailable {
                    path: job.destination.clone(),
                    reason: e.to_string(),
                });
                job
            }
        }
    }
}

/// Logs progress whenever the completed share crosses a new 10% step.
struct Progress {
    total: u64,
    last_step: u64,
}

impl Progress {
    fn update(&mut self, job: &Uuid, copied: u64) {
        if self.total == 0 {
            return;
        }
        let step = (copied.min(self.total) * 10 / self.total).min(10);
        if step > self.last_step {
            self.last_step = step;
            info!("Job {}: {}% copied", job, step * 10);
        }
    }
}

enum ItemOutcome {
    Copied,
    Unchanged,
    DirectoryCreated,
    DirectoryExisted,
}

fn is_out_of_space(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(code) if code == libc::ENOSPC || code == libc::EDQUOT)
}

fn is_up_to_date(source: &Metadata, target: &Path) -> bool {
    let Ok(existing) = fs::metadata(target) else {
        return false;
    };
    existing.is_file()
        && existing.len() == source.len()
        && FileTime::from_last_modification_time(&existing) >= FileTime::from_last_modification_time(source)
}

/// Copies the contents in chunks so the live byte counter moves during large files.
fn copy_contents(source: &Path, target: &Path, bytes: &AtomicU64, progress: &mut dyn FnMut(u64)) -> io::Result<u64> {
    let mut reader = File::open(source)?;
    let mut writer = File::create(target)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n])?;
        written += n as u64;
        let total = bytes.fetch_add(n as u64, Ordering::Relaxed) + n as u64;
        progress(total);
    }
    writer.sync_all()?;
    Ok(written)
}

fn preserve_times(source: &Metadata, target: &Path) -> io::Result<()> {
    filetime::set_file_times(
        target,
        FileTime::from_last_access_time(source),
        FileTime::from_last_modification_time(source),
    )
}

/// Walks `job.source` and mirrors it under `job.destination`. Runs on a blocking thread.
pub(crate) fn copy_tree(
    mut job: CopyJob,
    settings: CopySettings,
    cancel: &CancellationToken,
    bytes: &AtomicU64,
) -> CopyJob {
    job.status = JobStatus::Running;
    if let Err(e) = fs::create_dir_all(&job.destination) {
        let error = if is_out_of_space(&e) {
            CopyError::DestinationFull(job.destination.clone())
        } else {
            CopyError::DestinationUnavailable { path: job.destination.clone(), reason: e.to_string() }
        };
        warn!("Job {}: {}", job.id, error);
        job.last_error = Some(error);
        job.status = JobStatus::Failed;
        return job;
    }

    if let Err(e) = fs::read_dir(&job.source) {
        let error = CopyError::SourceUnavailable { path: job.source.clone(), reason: e.to_string() };
        warn!("Job {}: {}", job.id, error);
        job.last_error = Some(error);
        job.status = JobStatus::Failed;
        return job;
    }

    let mut entries = Vec::new();
    let mut total_bytes = 0u64;
    for entry in WalkDir::new(&job.source).min_depth(1).follow_links(false).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() {
                    total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
                }
                entries.push(entry);
            }
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| job.source.clone());
                job.summary.total_items += 1;
                record_failure(&mut job, CopyError::PerItemFailure { path, reason: e.to_string() });
            }
        }
    }
    info!(
        "Job {}: copying {} items ({} bytes) from {:?} to {:?}",
        job.id,
        entries.len(),
        total_bytes,
        job.source,
        job.destination
    );

    let mut progress = Progress { total: total_bytes, last_step: 0 };
    let mut directories = Vec::new();
    let mut cancelled = false;

    for entry in &entries {
        if cancel.is_cancelled() {
            info!("Job {}: cancellation requested, not starting further transfers", job.id);
            cancelled = true;
            break;
        }
        if !job.destination.is_dir() {
            job.last_error = Some(CopyError::DestinationUnavailable {
                path: job.destination.clone(),
                reason: "destination directory disappeared".to_string(),
            });
            break;
        }

        let source = entry.path();
        let Ok(relative) = source.strip_prefix(&job.source) else {
            continue;
        };
        let target = job.destination.join(relative);
        job.summary.total_items += 1;

        let outcome = copy_item(&job.id, entry, &target, settings, bytes, &mut progress, &mut directories);
        match outcome {
            Ok(ItemOutcome::Copied) => job.summary.files_copied += 1,
            Ok(ItemOutcome::Unchanged) => job.summary.files_unchanged += 1,
            Ok(ItemOutcome::DirectoryCreated) => job.summary.directories_created += 1,
            Ok(ItemOutcome::DirectoryExisted) => {}
            Err(e) if is_out_of_space(&e) => {
                job.last_error = Some(CopyError::DestinationFull(job.destination.clone()));
                break;
            }
            Err(e) => {
                if !job.destination.is_dir() {
                    job.last_error = Some(CopyError::DestinationUnavailable {
                        path: job.destination.clone(),
                        reason: e.to_string(),
                    });
                    break;
                }
                record_failure(&mut job, CopyError::PerItemFailure { path: source.to_path_buf(), reason: e.to_string() });
            }
        }
    }

    // Directory times last, after their contents stopped changing.
    for (metadata, target) in directories.iter().rev() {
        if let Err(e) = preserve_times(metadata, target) {
            debug!("Job {}: cannot set times on {:?}: {}", job.id, target, e);
        }
    }

    job.bytes_copied = bytes.load(Ordering::Relaxed);
    // Directories do not count as transferred content.
    let transferred = job.summary.files_copied + job.summary.files_unchanged;
    job.status = match &job.last_error {
        Some(error) if error.is_fatal() => {
            warn!("Job {}: aborting transfer: {}", job.id, error);
            JobStatus::Failed
        }
        _ if cancelled => JobStatus::Cancelled,
        _ if job.summary.failed_items > 0 && transferred == 0 => JobStatus::Failed,
        _ => JobStatus::Succeeded,
    };
    info!("Job {}: copy {} ({}, {} bytes)", job.id, job.status, job.summary, job.bytes_copied);
    job
}

fn record_failure(job: &mut CopyJob, error: CopyError) {
    warn!("Job {}: {}", job.id, error);
    job.summary.failed_items += 1;
    job.last_error = Some(error);
}

fn copy_item(
    job: &Uuid,
    entry: &walkdir::DirEntry,
    target: &Path,
    settings: CopySettings,
    bytes: &AtomicU64,
    progress: &mut Progress,
    directories: &mut Vec<(Metadata, PathBuf)>,
) -> io::Result<ItemOutcome> {
    let file_type = entry.file_type();
    let metadata = entry.metadata().map_err(io::Error::from)?;

    if file_type.is_dir() {
        let existed = target.is_dir();
        fs::create_dir_all(target)?;
        directories.push((metadata, target.to_path_buf()));
        return Ok(if existed { ItemOutcome::DirectoryExisted } else { ItemOutcome::DirectoryCreated });
    }

    if !file_type.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "not a regular file or directory, skipped",
        ));
    }

    if settings.update_only && is_up_to_date(&metadata, target) {
        debug!("Job {}: {:?} is up to date", job, target);
        progress.total = progress.total.saturating_sub(metadata.len());
        progress.update(job, bytes.load(Ordering::Relaxed));
        return Ok(ItemOutcome::Unchanged);
    }

    if let Err(e) = copy_contents(entry.path(), target, bytes, &mut |total: u64| progress.update(job, total)) {
        discard_partial(job, target);
        return Err(e);
    }
    if let Err(e) = preserve_times(&metadata, target) {
        warn!("Job {}: cannot preserve timestamps of {:?}: {}", job, target, e);
    }
    Ok(ItemOutcome::Copied)
}

/// Never leave a truncated file behind. Returns false if a partial copy is still in place.
fn discard_partial(job: &Uuid, target: &Path) -> bool {
    match fs::remove_file(target) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!("Job {}: cannot remove partial copy {:?}: {}", job, target, e);
            false
        }
    }
}
