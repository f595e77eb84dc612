//! Persistent content-addressed store of per-label knowledge.
//!
//! Layout: one directory per label (safely encoded), holding `parser.v{N}`,
//! `validation.v{N}` and `meta.v{N}` JSON files plus a `current` file naming
//! the live version. Every write goes through a temp file and an atomic
//! rename, so a crash either fully publishes an entry or leaves the previous
//! one live. Entries that fail structural checks on load are quarantined by
//! renaming the label directory, never deleted.

use crate::data::{KnowledgeEntry, ParserPack, ValidationPack};
use crate::exceptions::{ExtractError, ExtractResult};
use crate::logging::{report_progress, ProgressEvent};
use crate::parser_gen::PATTERN_SIZE_LIMIT;
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Sidecar metadata persisted next to the packs
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetaFile {
    label: String,
    version: u32,
    gabarito_digest: Uuid,
    created_at: DateTime<Utc>,
}

/// Durable `{label -> (parser_pack, validation_pack, version)}` store.
///
/// `put` is serialized per label; `get` always observes a fully-published
/// entry because the `current` pointer is flipped last and old version files
/// are left in place.
pub struct ParserRepository {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ParserRepository {
    /// Open (and create if needed) a repository rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> ExtractResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Fetch the live knowledge entry for `label`.
    ///
    /// A corrupt entry is quarantined and reported as a miss so the caller
    /// falls back to the cold path and relearns the label.
    pub fn get(&self, label: &str) -> ExtractResult<Option<KnowledgeEntry>> {
        let dir = self.label_dir(label);
        if !dir.join("current").exists() {
            return Ok(None);
        }
        match self.load_entry(label, &dir) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                log::warn!("quarantining knowledge for '{}': {}", label, e);
                self.quarantine(&dir)?;
                Ok(None)
            }
        }
    }

    /// Publish `entry` if its version is strictly higher than the live one.
    ///
    /// Returns `Ok(true)` on publish, `Ok(false)` when superseded (no-op).
    pub fn put(&self, entry: &KnowledgeEntry) -> ExtractResult<bool> {
        validate_parser_pack(&entry.parser)?;
        let lock = self.label_lock(&entry.label);
        let _guard = lock.lock().expect("repository label lock poisoned");

        let dir = self.label_dir(&entry.label);
        fs::create_dir_all(&dir)?;

        if let Some(live) = read_current(&dir) {
            if entry.version <= live {
                log::debug!(
                    "put for '{}' v{} superseded by live v{}",
                    entry.label,
                    entry.version,
                    live
                );
                return Ok(false);
            }
        }

        let meta = MetaFile {
            label: entry.label.clone(),
            version: entry.version,
            gabarito_digest: entry.gabarito_digest,
            created_at: entry.created_at,
        };
        write_atomic(
            &dir.join(format!("parser.v{}", entry.version)),
            &serde_json::to_vec_pretty(&entry.parser)?,
        )?;
        write_atomic(
            &dir.join(format!("validation.v{}", entry.version)),
            &serde_json::to_vec_pretty(&entry.validation)?,
        )?;
        write_atomic(
            &dir.join(format!("meta.v{}", entry.version)),
            &serde_json::to_vec_pretty(&meta)?,
        )?;
        // The entry goes live only when `current` flips
        write_atomic(
            &dir.join("current"),
            entry.version.to_string().as_bytes(),
        )?;

        report_progress(ProgressEvent::RepositoryPublish {
            label: entry.label.clone(),
            version: entry.version,
        });
        Ok(true)
    }

    /// Forget everything known about `label`
    pub fn clear(&self, label: &str) -> ExtractResult<()> {
        let lock = self.label_lock(label);
        let _guard = lock.lock().expect("repository label lock poisoned");
        let dir = self.label_dir(label);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load_entry(&self, label: &str, dir: &Path) -> ExtractResult<KnowledgeEntry> {
        let version = read_current(dir)
            .ok_or_else(|| ExtractError::corruption(label, "unreadable current pointer"))?;

        let parser: ParserPack = read_json(&dir.join(format!("parser.v{}", version)), label)?;
        let validation: ValidationPack =
            read_json(&dir.join(format!("validation.v{}", version)), label)?;
        let meta: MetaFile = read_json(&dir.join(format!("meta.v{}", version)), label)?;

        if meta.version != version {
            return Err(ExtractError::corruption(
                label,
                format!("meta names v{} but current names v{}", meta.version, version),
            ));
        }
        validate_parser_pack(&parser)
            .map_err(|e| ExtractError::corruption(label, e.to_string()))?;

        Ok(KnowledgeEntry {
            label: label.to_string(),
            version,
            parser,
            validation,
            gabarito_digest: meta.gabarito_digest,
            created_at: meta.created_at,
        })
    }

    fn quarantine(&self, dir: &Path) -> ExtractResult<()> {
        let mut name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("entry")
            .to_string();
        name.push_str(&format!(".quarantine-{}", Uuid::new_v4().simple()));
        let target = dir.with_file_name(name);
        fs::rename(dir, &target)?;
        log::info!("quarantined {} -> {}", dir.display(), target.display());
        Ok(())
    }

    fn label_dir(&self, label: &str) -> PathBuf {
        self.root.join(encode_label(label))
    }

    fn label_lock(&self, label: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("repository lock map poisoned");
        locks
            .entry(label.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Encode a label into a filesystem-safe directory name
fn encode_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

fn read_current(dir: &Path) -> Option<u32> {
    fs::read_to_string(dir.join("current"))
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, label: &str) -> ExtractResult<T> {
    let bytes = fs::read(path)
        .map_err(|e| ExtractError::corruption(label, format!("{}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ExtractError::corruption(label, format!("{}: {}", path.display(), e)))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> ExtractResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| ExtractError::configuration("repository path has no parent"))?;
    let tmp = dir.join(format!(
        ".tmp-{}-{}",
        Uuid::new_v4().simple(),
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file")
    ));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Structural checks applied both at publish time and on load: every pattern
/// must compile under the size limit and carry at least one capture group
fn validate_parser_pack(pack: &ParserPack) -> ExtractResult<()> {
    for (field, pattern) in &pack.patterns {
        let re = RegexBuilder::new(pattern)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|e| {
                ExtractError::serialization(format!(
                    "pattern for '{}' does not compile: {}",
                    field, e
                ))
            })?;
        if re.captures_len() < 2 {
            return Err(ExtractError::serialization(format!(
                "pattern for '{}' has no capture group",
                field
            )));
        }
    }
    Ok(())
}
