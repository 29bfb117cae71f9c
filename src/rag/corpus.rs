use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{RagError, RagResult};
use crate::rag::index::{Metric, VectorIndex};
use crate::rag::store::DocumentStore;

/// Where a corpus pair lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusPaths {
    pub index_path: PathBuf,
    pub store_path: PathBuf,
}

/// A position-aligned (index, store) pair. Only constructible with equal
/// counts, and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    index: VectorIndex,
    store: DocumentStore,
}

impl Corpus {
    pub fn from_parts(index: VectorIndex, store: DocumentStore) -> RagResult<Self> {
        if index.count() != store.count() {
            return Err(RagError::Misaligned {
                index_count: index.count(),
                store_count: store.count(),
            });
        }
        Ok(Self { index, store })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn count(&self) -> usize {
        self.index.count()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Persist both halves so that either the new pair or the previous pair
    /// is on disk afterwards, never a mix.
    ///
    /// Both files are staged as `.tmp` siblings, then a `.commit` journal
    /// next to the index records which targets already existed before any
    /// rename happens. While the journal exists the commit is unfinished and
    /// [`Corpus::load`] rolls it back from the `.bak` siblings.
    pub fn save(&self, paths: &CorpusPaths) -> RagResult<()> {
        recover_interrupted_commit(paths)?;

        let mut staged = vec![stage(&paths.index_path, |p| self.index.save(p))?];
        match stage(&paths.store_path, |p| self.store.save(p)) {
            Ok(s) => staged.push(s),
            Err(e) => {
                discard(&staged);
                return Err(e);
            }
        }

        let journal = journal_path(paths);
        let existed: Vec<bool> = staged.iter().map(|s| s.target.exists()).collect();
        if let Err(e) = write_journal(&journal, &existed) {
            let _ = fs::remove_file(&journal);
            discard(&staged);
            return Err(e.into());
        }

        if let Err(e) = commit(&staged) {
            tracing::error!(error = %e, "corpus commit failed, restoring previous pair");
            if let Err(restore) = recover_interrupted_commit(paths) {
                tracing::error!(error = %restore, "failed to restore previous pair");
            }
            return Err(e.into());
        }

        // Removing the journal is the commit point.
        fs::remove_file(&journal)?;
        sync_parent(&journal);

        for s in &staged {
            if s.backup.exists() {
                if let Err(e) = fs::remove_file(&s.backup) {
                    tracing::warn!(path = %s.backup.display(), error = %e, "failed to remove backup");
                }
            }
        }

        tracing::info!(
            index = %paths.index_path.display(),
            store = %paths.store_path.display(),
            count = self.count(),
            dimension = self.dimension(),
            "corpus saved"
        );
        Ok(())
    }

    /// Loads an aligned pair. An unfinished commit left behind by an
    /// interrupted [`Corpus::save`] is rolled back first.
    pub fn load(paths: &CorpusPaths, metric: Metric) -> RagResult<Self> {
        recover_interrupted_commit(paths)?;
        let index = VectorIndex::load(&paths.index_path)?.with_metric(metric);
        let store = DocumentStore::load(&paths.store_path)?;
        let corpus = Self::from_parts(index, store)?;
        tracing::info!(
            index = %paths.index_path.display(),
            count = corpus.count(),
            dimension = corpus.dimension(),
            metric = ?metric,
            "corpus loaded"
        );
        Ok(corpus)
    }
}

struct Staged {
    tmp: PathBuf,
    target: PathBuf,
    backup: PathBuf,
}

impl Staged {
    fn for_target(target: &Path) -> Self {
        Self {
            tmp: sibling(target, ".tmp"),
            target: target.to_path_buf(),
            backup: sibling(target, ".bak"),
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn journal_path(paths: &CorpusPaths) -> PathBuf {
    sibling(&paths.index_path, ".commit")
}

fn stage(target: &Path, write: impl FnOnce(&Path) -> RagResult<()>) -> RagResult<Staged> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let staged = Staged::for_target(target);
    if let Err(e) = write(&staged.tmp) {
        let _ = fs::remove_file(&staged.tmp);
        return Err(e);
    }
    Ok(staged)
}

fn discard(staged: &[Staged]) {
    for s in staged {
        let _ = fs::remove_file(&s.tmp);
    }
}

/// One `0`/`1` flag per target, in index, store order, then a newline.
fn write_journal(path: &Path, existed: &[bool]) -> std::io::Result<()> {
    let mut line: String = existed.iter().map(|e| if *e { '1' } else { '0' }).collect();
    line.push('\n');
    let mut file = fs::File::create(path)?;
    file.write_all(line.as_bytes())?;
    file.sync_all()?;
    sync_parent(path);
    Ok(())
}

/// `None` when the journal was cut short, which can only happen before the
/// first rename.
fn read_journal(path: &Path, expected: usize) -> std::io::Result<Option<Vec<bool>>> {
    let content = fs::read_to_string(path)?;
    let Some(flags) = content.strip_suffix('\n') else {
        return Ok(None);
    };
    let existed: Option<Vec<bool>> = flags
        .chars()
        .map(|c| match c {
            '1' => Some(true),
            '0' => Some(false),
            _ => None,
        })
        .collect();
    Ok(existed.filter(|e| e.len() == expected))
}

fn commit(staged: &[Staged]) -> std::io::Result<()> {
    for s in staged {
        if s.target.exists() {
            fs::rename(&s.target, &s.backup)?;
        }
        fs::rename(&s.tmp, &s.target)?;
    }
    if let Some(s) = staged.first() {
        sync_parent(&s.target);
    }
    Ok(())
}

/// Undo whatever part of a journaled commit reached the disk. Idempotent, so
/// a crash during recovery is repaired by the next call.
fn recover_interrupted_commit(paths: &CorpusPaths) -> RagResult<()> {
    let journal = journal_path(paths);
    if !journal.exists() {
        return Ok(());
    }
    let staged = [
        Staged::for_target(&paths.index_path),
        Staged::for_target(&paths.store_path),
    ];
    tracing::warn!(journal = %journal.display(), "rolling back unfinished corpus commit");

    match read_journal(&journal, staged.len())? {
        Some(existed) => {
            for (s, existed) in staged.iter().zip(existed).rev() {
                restore(s, existed)?;
            }
        }
        None => discard(&staged),
    }

    fs::remove_file(&journal)?;
    sync_parent(&journal);
    Ok(())
}

fn restore(s: &Staged, existed: bool) -> std::io::Result<()> {
    if s.tmp.exists() {
        // Not swapped in yet; the backup rename may still have happened.
        if existed && !s.target.exists() && s.backup.exists() {
            fs::rename(&s.backup, &s.target)?;
        }
        fs::remove_file(&s.tmp)?;
    } else if existed {
        if s.backup.exists() {
            fs::rename(&s.backup, &s.target)?;
        }
    } else if s.target.exists() {
        fs::remove_file(&s.target)?;
    }
    Ok(())
}

/// Makes renames in `path`'s directory durable. Not every platform can open
/// a directory for syncing, so failures are ignored.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = fs::File::open(parent).and_then(|dir| dir.sync_all());
    }
}
