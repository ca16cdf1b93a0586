//! Artifact ingestion
//!
//! Materializes an uploaded bundle under its storage area: the values
//! document at the bundle root, and the optional support archive extracted
//! under `mnt/`. Archive entries are confined to the bundle root - any entry
//! whose normalized path is absolute or climbs out via `..` is rejected
//! before a single byte is written.
//!
//! Ingestion is not atomic across the two inputs; the lifecycle layer
//! removes the whole subtree when any upload step fails.

use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::debug;

use crate::error::{Error, Result};

/// File name of the ingested values document inside a bundle's storage area
pub const VALUES_FILE: &str = "values.yaml";

/// Subdirectory mirroring the uploaded archive's internal structure
pub const ARCHIVE_DIR: &str = "mnt";

/// Writes and removes bundle storage areas under a fixed root directory
#[derive(Debug, Clone)]
pub struct Ingestor {
    root: PathBuf,
}

impl Ingestor {
    /// Create an ingestor rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage area for one bundle
    pub fn bundle_dir(&self, bundle_id: &str) -> PathBuf {
        self.root.join(bundle_id)
    }

    /// Path of the bundle's ingested values document
    pub fn values_path(&self, bundle_id: &str) -> PathBuf {
        self.bundle_dir(bundle_id).join(VALUES_FILE)
    }

    /// Root of the bundle's extracted archive contents
    pub fn archive_root(&self, bundle_id: &str) -> PathBuf {
        self.bundle_dir(bundle_id).join(ARCHIVE_DIR)
    }

    /// Validate and write the values document for `bundle_id`.
    ///
    /// The upload must carry a `.yaml`/`.yml` name and parse as a YAML
    /// mapping (or an empty document).
    pub fn ingest_values(&self, bundle_id: &str, filename: &str, content: &[u8]) -> Result<()> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if ext != "yaml" && ext != "yml" {
            return Err(Error::invalid(format!(
                "values document must be a .yaml file, got {filename:?}"
            )));
        }

        let parsed: serde_yaml::Value = serde_yaml::from_slice(content)
            .map_err(|e| Error::invalid(format!("values document is not well-formed YAML: {e}")))?;
        if !matches!(
            parsed,
            serde_yaml::Value::Mapping(_) | serde_yaml::Value::Null
        ) {
            return Err(Error::invalid(
                "values document must be a YAML mapping at the top level",
            ));
        }

        let dir = self.bundle_dir(bundle_id);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io("creating bundle storage area", e))?;
        std::fs::write(self.values_path(bundle_id), content)
            .map_err(|e| Error::io("writing values document", e))?;
        Ok(())
    }

    /// Extract a gzipped tar archive under the bundle's `mnt/` subtree,
    /// preserving relative paths and file modes.
    pub fn ingest_archive(&self, bundle_id: &str, filename: &str, content: &[u8]) -> Result<()> {
        if !filename.ends_with(".tar.gz") && !filename.ends_with(".tgz") {
            return Err(Error::invalid(format!(
                "support archive must be a .tar.gz file, got {filename:?}"
            )));
        }

        let root = self.archive_root(bundle_id);
        std::fs::create_dir_all(&root).map_err(|e| Error::io("creating archive root", e))?;

        let mut archive = Archive::new(GzDecoder::new(content));
        archive.set_preserve_permissions(true);

        let entries = archive
            .entries()
            .map_err(|e| Error::invalid(format!("unreadable archive: {e}")))?;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| Error::invalid(format!("corrupt archive entry: {e}")))?;
            let path = entry
                .path()
                .map_err(|e| Error::invalid(format!("undecodable archive entry path: {e}")))?
                .into_owned();
            let rel = confine_entry_path(&path)?;
            let dest = root.join(&rel);

            match entry.header().entry_type() {
                EntryType::Directory => {
                    std::fs::create_dir_all(&dest)
                        .map_err(|e| Error::io("creating archive directory", e))?;
                }
                EntryType::Regular => {
                    if let Some(parent) = dest.parent() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| Error::io("creating archive directory", e))?;
                    }
                    entry
                        .unpack(&dest)
                        .map_err(|e| Error::io("extracting archive entry", e))?;
                }
                other => {
                    // Links could point outside the bundle root; nothing a
                    // bundle legitimately needs them for.
                    debug!(entry_type = ?other, path = %rel.display(), "skipping archive entry");
                }
            }
        }
        Ok(())
    }

    /// Parse the bundle's values document into a JSON object for the install
    /// values merge. An empty document yields an empty object.
    pub fn read_values(&self, bundle_id: &str) -> Result<serde_json::Value> {
        let raw = std::fs::read(self.values_path(bundle_id))
            .map_err(|e| Error::io("reading values document", e))?;
        let parsed: serde_yaml::Value = serde_yaml::from_slice(&raw)
            .map_err(|e| Error::invalid(format!("stored values document is malformed: {e}")))?;
        if matches!(parsed, serde_yaml::Value::Null) {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        serde_json::to_value(&parsed)
            .map_err(|e| Error::invalid(format!("values document is not JSON-representable: {e}")))
    }

    /// Remove the bundle's whole storage subtree; Ok when already absent
    pub fn remove_bundle(&self, bundle_id: &str) -> Result<()> {
        let dir = self.bundle_dir(bundle_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("removing bundle storage area", e)),
        }
    }
}

/// Normalize an archive entry path, rejecting anything that would land
/// outside the extraction root.
fn confine_entry_path(path: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::invalid(format!(
                    "archive entry {path:?} escapes the bundle storage area"
                )))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(Error::invalid("archive entry has an empty path"));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn ingestor() -> (tempfile::TempDir, Ingestor) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ingestor = Ingestor::new(dir.path());
        (dir, ingestor)
    }

    /// Build a gzipped tar archive from (path, mode, content) triples
    fn archive_of(entries: &[(&str, u32, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, mode, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(*mode);
            header.set_entry_type(tar::EntryType::Regular);
            // Write the entry name into the header directly rather than through
            // `append_data`/`set_path`, which reject `..` at write time - this
            // fixture must be able to forge a path-traversal entry so the code
            // under test is the thing that rejects it.
            let name = path.as_bytes();
            let gnu = header.as_gnu_mut().unwrap();
            gnu.name[..name.len()].copy_from_slice(name);
            header.set_cksum();
            builder.append(&header, *content).unwrap();
        }
        let encoder = builder.into_inner().unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_values_ingest_writes_document() {
        let (_dir, ingestor) = ingestor();
        ingestor
            .ingest_values("b1", "values.yaml", b"replica: 1\n")
            .unwrap();
        let written = std::fs::read_to_string(ingestor.values_path("b1")).unwrap();
        assert_eq!(written, "replica: 1\n");
    }

    #[test]
    fn test_values_ingest_rejects_wrong_extension() {
        let (_dir, ingestor) = ingestor();
        let err = ingestor
            .ingest_values("b1", "values.json", b"{}")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!ingestor.bundle_dir("b1").exists());
    }

    #[test]
    fn test_values_ingest_rejects_malformed_yaml() {
        let (_dir, ingestor) = ingestor();
        let err = ingestor
            .ingest_values("b1", "values.yaml", b"a: [unclosed")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_values_ingest_rejects_non_mapping_document() {
        let (_dir, ingestor) = ingestor();
        let err = ingestor
            .ingest_values("b1", "values.yaml", b"- just\n- a\n- list\n")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_archive_extracts_under_mnt_preserving_modes() {
        let (_dir, ingestor) = ingestor();
        let archive = archive_of(&[
            ("conf/app.toml", 0o644, b"key = 1\n".as_slice()),
            ("bin/run.sh", 0o755, b"#!/bin/sh\n".as_slice()),
        ]);
        ingestor
            .ingest_archive("b1", "support.tar.gz", &archive)
            .unwrap();

        let conf = ingestor.archive_root("b1").join("conf/app.toml");
        assert_eq!(std::fs::read_to_string(&conf).unwrap(), "key = 1\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let script = ingestor.archive_root("b1").join("bin/run.sh");
            let mode = std::fs::metadata(&script).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_archive_rejects_wrong_extension() {
        let (_dir, ingestor) = ingestor();
        let err = ingestor
            .ingest_archive("b1", "support.zip", b"PK")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_archive_rejects_path_traversal() {
        let (_dir, ingestor) = ingestor();
        let archive = archive_of(&[("../escape.txt", 0o644, b"pwned".as_slice())]);
        let err = ingestor
            .ingest_archive("b1", "support.tar.gz", &archive)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!ingestor.root.join("escape.txt").exists());
    }

    #[test]
    fn test_archive_rejects_garbage_bytes() {
        let (_dir, ingestor) = ingestor();
        let err = ingestor
            .ingest_archive("b1", "support.tar.gz", b"not a gzip stream")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_read_values_merges_to_json() {
        let (_dir, ingestor) = ingestor();
        ingestor
            .ingest_values("b1", "values.yaml", b"replica: 1\nname: demo\n")
            .unwrap();
        let values = ingestor.read_values("b1").unwrap();
        assert_eq!(values["replica"], 1);
        assert_eq!(values["name"], "demo");
    }

    #[test]
    fn test_read_values_empty_document_is_empty_object() {
        let (_dir, ingestor) = ingestor();
        ingestor.ingest_values("b1", "values.yaml", b"").unwrap();
        let values = ingestor.read_values("b1").unwrap();
        assert!(values.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_remove_bundle_is_idempotent() {
        let (_dir, ingestor) = ingestor();
        ingestor
            .ingest_values("b1", "values.yaml", b"a: 1\n")
            .unwrap();
        ingestor.remove_bundle("b1").unwrap();
        assert!(!ingestor.bundle_dir("b1").exists());
        // Absent subtree is fine.
        ingestor.remove_bundle("b1").unwrap();
    }

    #[test]
    fn test_confine_entry_path() {
        assert_eq!(
            confine_entry_path(Path::new("./a/b.txt")).unwrap(),
            PathBuf::from("a/b.txt")
        );
        assert!(confine_entry_path(Path::new("../b.txt")).is_err());
        assert!(confine_entry_path(Path::new("/etc/passwd")).is_err());
        assert!(confine_entry_path(Path::new("a/../../b.txt")).is_err());
        assert!(confine_entry_path(Path::new("")).is_err());
    }
}
