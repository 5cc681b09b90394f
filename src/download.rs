//! Archive downloading for the dataset mirror.
//!
//! Provides async downloading of the dataset's tar.gz archives with progress
//! reporting, SHA-256 integrity verification, and atomic file placement.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use crate::error::{Aspset510Error, Result};
use crate::extract::extract_tgz;

/// Dataset partitions, each distributed as separate archives.
pub const ALL_PARTITIONS: [&str; 2] = ["trainval", "test"];

/// Archive fields within each partition.
pub const ALL_FIELDS: [&str; 3] = ["cameras", "joints_3d", "videos"];

/// Current dataset release version.
pub const CURRENT_VERSION: &str = "v1";

/// Name of the SHA-256 checksum manifest hosted alongside the archives.
pub const CHECKSUM_MANIFEST: &str = "checksums.sha256";

/// Directory nested inside every archive, stripped during extraction.
pub const ARCHIVE_ROOT_DIR: &str = "ASPset-510";

/// One downloadable dataset archive.
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    /// Archive file name (e.g. `aspset510_v1_trainval-cameras.tar.gz`).
    pub filename: String,
    /// Full download URL.
    pub remote_url: String,
    /// Expected SHA-256 checksum, if listed in the mirror's manifest.
    pub checksum: Option<String>,
    /// Partition the archive belongs to.
    pub partition: String,
    /// Field the archive contains.
    pub field: String,
}

/// Options controlling [`DatasetDownloader::download_and_extract_archives`].
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Skip archives whose partition/field has already been extracted.
    pub skip_existing: bool,
    /// Skip downloading archives that already exist locally.
    pub skip_download_existing: bool,
    /// Skip archive integrity verification.
    pub skip_checksum: bool,
    /// Skip extracting files from the archives.
    pub skip_extraction: bool,
    /// Show progress bars.
    pub show_progress: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            skip_existing: true,
            skip_download_existing: true,
            skip_checksum: false,
            skip_extraction: false,
            show_progress: false,
        }
    }
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Set message for progress indicator
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    /// Set length for progress indicator
    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    /// Set position for progress indicator
    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    /// Finish progress indicator with message
    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

/// Join an archive file name to the mirror base URL.
#[must_use]
pub fn archive_url(base_url: &str, filename: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{filename}")
    } else {
        format!("{base_url}/{filename}")
    }
}

/// Parse a checksum manifest of `<sha256> <filename>` lines.
///
/// # Errors
/// Returns an error for malformed lines.
pub fn parse_checksum_manifest(text: &str) -> Result<HashMap<String, String>> {
    let mut checksums = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(checksum), Some(filename), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Aspset510Error::integrity(format!(
                "malformed checksum manifest line: '{line}'"
            )));
        };
        checksums.insert(filename.to_string(), checksum.to_lowercase());
    }
    Ok(checksums)
}

/// Build the archive list for the cartesian product of partitions and fields.
///
/// Archives without a manifest entry get `checksum: None` and a warning.
#[must_use]
pub fn collect_archives(
    base_url: &str,
    partitions: &[&str],
    fields: &[&str],
    version: &str,
    checksums: &HashMap<String, String>,
) -> Vec<ArchiveInfo> {
    let mut archives = Vec::new();
    for &partition in partitions {
        for &field in fields {
            let filename = format!("aspset510_{version}_{partition}-{field}.tar.gz");
            let checksum = checksums.get(&filename).cloned();
            if checksum.is_none() {
                warn!(%filename, "no checksum listed in manifest; integrity will not be verified");
            }
            archives.push(ArchiveInfo {
                remote_url: archive_url(base_url, &filename),
                filename,
                checksum,
                partition: partition.to_string(),
                field: field.to_string(),
            });
        }
    }
    archives
}

/// Whether the files of a partition/field archive have been extracted.
#[must_use]
pub fn extracted_files_exist(data_dir: &Path, partition: &str, field: &str) -> bool {
    data_dir.join(partition).join(field).is_dir()
}

/// Compute the SHA-256 checksum of a file, streaming its contents.
pub fn compute_sha256_checksum(file_path: &Path, progress: Option<&ProgressIndicator>) -> Result<String> {
    let file = fs::File::open(file_path)
        .map_err(|e| Aspset510Error::file_io_error("open file for checksum", file_path, &e))?;
    let file_size = file
        .metadata()
        .map_err(|e| Aspset510Error::file_io_error("stat file", file_path, &e))?
        .len();
    if let Some(pb) = progress {
        pb.set_length(file_size);
    }

    let mut hasher = Sha256::new();
    let mut reader = std::io::BufReader::new(file);
    let mut buffer = vec![0u8; 64 * 1024];
    let mut hashed = 0u64;
    loop {
        let bytes_read = std::io::Read::read(&mut reader, &mut buffer)
            .map_err(|e| Aspset510Error::file_io_error("read file for checksum", file_path, &e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        hashed += bytes_read as u64;
        if let Some(pb) = progress {
            pb.set_position(hashed);
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a file against an expected SHA-256 checksum.
///
/// # Errors
/// Returns an integrity error if the checksums do not match.
pub fn check_file_integrity(
    file_path: &Path,
    expected_checksum: &str,
    progress: Option<&ProgressIndicator>,
) -> Result<()> {
    let actual = compute_sha256_checksum(file_path, progress)?;
    if actual != expected_checksum.to_lowercase() {
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<unknown>");
        return Err(Aspset510Error::integrity(format!(
            "file integrity check failed for {file_name}"
        )));
    }
    Ok(())
}

/// Dataset archive downloader with progress reporting
#[derive(Debug)]
pub struct DatasetDownloader {
    client: Client,
}

impl DatasetDownloader {
    /// Create a new dataset downloader
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(24 * 60 * 60))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Aspset510Error::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client })
    }

    /// Fetch and parse the mirror's checksum manifest.
    ///
    /// A missing manifest (HTTP 404) yields an empty map rather than an
    /// error, so that unsigned mirrors remain usable.
    pub async fn fetch_checksum_manifest(&self, base_url: &str) -> Result<HashMap<String, String>> {
        let url = archive_url(base_url, CHECKSUM_MANIFEST);
        debug!(%url, "fetching checksum manifest");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Aspset510Error::network_error(format!("Failed to fetch {url}"), e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!(%url, "mirror has no checksum manifest");
            return Ok(HashMap::new());
        }
        if !response.status().is_success() {
            return Err(Aspset510Error::network_error(
                format!("HTTP error {} for {url}", response.status()),
                std::io::Error::other("HTTP error"),
            ));
        }
        let text = response
            .text()
            .await
            .map_err(|e| Aspset510Error::network_error(format!("Failed to read {url}"), e))?;
        parse_checksum_manifest(&text)
    }

    /// Download all requested archives and extract them into `data_dir`.
    ///
    /// Archives are stored in `archive_dir` and kept after extraction. See
    /// [`DownloadOptions`] for the skip behaviour.
    ///
    /// # Errors
    /// - Network errors during download
    /// - Integrity verification failures
    /// - File system errors during extraction
    pub async fn download_and_extract_archives(
        &self,
        data_dir: &Path,
        archive_dir: &Path,
        base_url: &str,
        partitions: &[&str],
        fields: &[&str],
        options: &DownloadOptions,
    ) -> Result<()> {
        fs::create_dir_all(data_dir)
            .map_err(|e| Aspset510Error::file_io_error("create data directory", data_dir, &e))?;
        fs::create_dir_all(archive_dir)
            .map_err(|e| Aspset510Error::file_io_error("create archive directory", archive_dir, &e))?;

        let checksums = if options.skip_checksum {
            HashMap::new()
        } else {
            self.fetch_checksum_manifest(base_url).await?
        };
        let archives = collect_archives(base_url, partitions, fields, CURRENT_VERSION, &checksums);

        for archive in &archives {
            let archive_file = archive_dir.join(&archive.filename);
            if options.skip_existing
                && extracted_files_exist(data_dir, &archive.partition, &archive.field)
            {
                info!(filename = %archive.filename, "already extracted, skipping");
                continue;
            }
            if !options.skip_download_existing || !archive_file.exists() {
                let progress = Self::create_progress(options.show_progress);
                progress.set_message(format!("Downloading {}", archive.filename));
                self.download_file(&archive.remote_url, &archive_file, &progress)
                    .await?;
                progress.finish_with_message(format!("Downloaded {}", archive.filename));
            }
            if !options.skip_checksum {
                if let Some(checksum) = &archive.checksum {
                    let progress = Self::create_progress(options.show_progress);
                    progress.set_message(format!("Checking {}", archive.filename));
                    check_file_integrity(&archive_file, checksum, Some(&progress))?;
                    progress.finish_with_message(format!("Verified {}", archive.filename));
                }
            }
            if !options.skip_extraction {
                info!(filename = %archive.filename, "extracting");
                extract_tgz(&archive_file, data_dir, ARCHIVE_ROOT_DIR)?;
            }
        }
        Ok(())
    }

    /// Download a single file with progress reporting.
    ///
    /// The file is streamed to a `.part` sibling and renamed into place once
    /// complete, so an interrupted download never leaves a truncated archive
    /// behind. Failed downloads remove the `.part` file.
    pub async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<()> {
        debug!(%url, path = %local_path.display(), "downloading");

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Aspset510Error::file_io_error("create directory", parent, &e))?;
        }
        let part_path = partial_download_path(local_path);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Aspset510Error::network_error(format!("Failed to download {url}"), e))?;
        if !response.status().is_success() {
            return Err(Aspset510Error::network_error(
                format!("HTTP error {} for {url}", response.status()),
                std::io::Error::other("HTTP error"),
            ));
        }

        let result = Self::stream_to_file(response, &part_path, progress).await;
        let downloaded = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                Self::remove_partial_file(&part_path);
                return Err(e);
            },
        };

        if let Err(e) = fs::rename(&part_path, local_path) {
            Self::remove_partial_file(&part_path);
            return Err(Aspset510Error::file_io_error("move downloaded file", local_path, &e));
        }
        debug!(bytes = downloaded, path = %local_path.display(), "download complete");
        Ok(())
    }

    async fn stream_to_file(
        response: reqwest::Response,
        part_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<u64> {
        let total_size = response.content_length();
        if let Some(total) = total_size {
            progress.set_length(total);
        }

        let mut file = tokio::fs::File::create(part_path)
            .await
            .map_err(|e| Aspset510Error::file_io_error("create file", part_path, &e))?;
        let mut stream = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));

        let mut downloaded = 0u64;
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| Aspset510Error::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }
            file.write_all(&buffer[..bytes_read])
                .await
                .map_err(|e| Aspset510Error::file_io_error("write to file", part_path, &e))?;
            downloaded += bytes_read as u64;
            if total_size.is_some() {
                progress.set_position(downloaded);
            } else {
                progress.set_message(format!(
                    "Downloaded {:.1} MiB",
                    downloaded as f64 / (1024.0 * 1024.0)
                ));
            }
        }
        if let Some(total) = total_size {
            if downloaded != total {
                return Err(Aspset510Error::network_error(
                    "Failed to read download stream",
                    std::io::Error::other(format!(
                        "connection closed after {downloaded} of {total} bytes"
                    )),
                ));
            }
        }
        file.flush()
            .await
            .map_err(|e| Aspset510Error::file_io_error("flush file", part_path, &e))?;
        Ok(downloaded)
    }

    fn remove_partial_file(part_path: &Path) {
        if let Err(e) = fs::remove_file(part_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %part_path.display(), error = %e, "failed to remove partial download");
            }
        }
    }

    fn create_progress(show_progress: bool) -> ProgressIndicator {
        if !show_progress {
            return ProgressIndicator::NoOp;
        }
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }
}

fn partial_download_path(local_path: &Path) -> PathBuf {
    let mut name = local_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    local_path.with_file_name(name)
}
