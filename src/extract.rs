//! Extraction of dataset tar.gz archives.

use std::fs;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use crate::error::{Aspset510Error, Result};

/// Extract a gzipped tar archive into `data_dir`.
///
/// Dataset archives nest their contents under a common top-level directory;
/// passing it as `gobble_prefix` strips it so that files land directly in
/// `data_dir`.
///
/// # Errors
/// Returns an error if the archive cannot be read, or if an entry escapes
/// `data_dir` via `..` or an absolute path.
pub fn extract_tgz(archive_file: &Path, data_dir: &Path, gobble_prefix: &str) -> Result<()> {
    let file = fs::File::open(archive_file)
        .map_err(|e| Aspset510Error::file_io_error("open archive", archive_file, &e))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let entries = archive
        .entries()
        .map_err(|e| Aspset510Error::file_io_error("read archive", archive_file, &e))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| Aspset510Error::file_io_error("read archive entry", archive_file, &e))?;
        let entry_path = entry
            .path()
            .map_err(|e| Aspset510Error::file_io_error("read archive entry path", archive_file, &e))?
            .into_owned();
        let Some(rel_path) = gobble(&entry_path, gobble_prefix)? else {
            continue;
        };

        let dest = data_dir.join(&rel_path);
        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&dest)
                .map_err(|e| Aspset510Error::file_io_error("create directory", &dest, &e))?;
            continue;
        }
        if !entry.header().entry_type().is_file() {
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Aspset510Error::file_io_error("create directory", parent, &e))?;
        }
        debug!(path = %rel_path.display(), "extracting");
        entry
            .unpack(&dest)
            .map_err(|e| Aspset510Error::file_io_error("extract file", &dest, &e))?;
    }
    Ok(())
}

// Strips the gobble prefix and validates the remaining path. Returns None for
// the prefix directory entry itself.
fn gobble(entry_path: &Path, gobble_prefix: &str) -> Result<Option<PathBuf>> {
    let rel_path = if gobble_prefix.is_empty() {
        entry_path
    } else {
        match entry_path.strip_prefix(gobble_prefix) {
            Ok(stripped) => stripped,
            Err(_) => {
                return Err(Aspset510Error::dataset(format!(
                    "archive entry '{}' is not under the expected '{gobble_prefix}' directory",
                    entry_path.display()
                )))
            },
        }
    };
    if rel_path.as_os_str().is_empty() {
        return Ok(None);
    }
    for component in rel_path.components() {
        match component {
            Component::Normal(_) => {},
            _ => {
                return Err(Aspset510Error::dataset(format!(
                    "archive entry '{}' escapes the extraction directory",
                    entry_path.display()
                )))
            },
        }
    }
    Ok(Some(rel_path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn build_archive(path: &Path, files: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_extract_with_gobble_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("cameras.tar.gz");
        build_archive(
            &archive,
            &[
                ("ASPset-510/trainval/cameras/04ac/04ac-left.json", b"{}"),
                ("ASPset-510/splits.csv", b"04ac,0026,train\n"),
            ],
        );

        let data_dir = dir.path().join("data");
        extract_tgz(&archive, &data_dir, "ASPset-510").unwrap();

        assert!(data_dir.join("trainval/cameras/04ac/04ac-left.json").is_file());
        assert_eq!(
            fs::read_to_string(data_dir.join("splits.csv")).unwrap(),
            "04ac,0026,train\n"
        );
    }

    #[test]
    fn test_extract_rejects_unexpected_layout() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.tar.gz");
        build_archive(&archive, &[("elsewhere/file.txt", b"x")]);
        let result = extract_tgz(&archive, &dir.path().join("data"), "ASPset-510");
        assert!(result.is_err());
    }

    #[test]
    fn test_gobble_skips_prefix_entry() {
        assert!(gobble(Path::new("ASPset-510"), "ASPset-510").unwrap().is_none());
        assert!(gobble(Path::new("ASPset-510/../x"), "ASPset-510").is_err());
    }
}
