//! Corpus enumeration.
//!
//! Walks a cvelistV5-style tree (`<root>/<year>/<Nxxx>/<CVE-id>.json`) and
//! yields every document exactly three levels deep, in lexicographic order
//! of partition, sub-partition, and filename. The walk performs no parsing;
//! unreadable or malformed documents surface only when a consumer opens them.
//!
//! Two walks over an unchanged corpus yield identical sequences, which is
//! what makes audit manifests deterministic.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CorpusConfig;

/// One corpus document, located but not yet read.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    /// Year partition, e.g. `"1999"`.
    pub partition: String,
    /// Sub-partition within the year, e.g. `"0xxx"`.
    pub subdir: String,
    /// Document filename, e.g. `"CVE-1999-0001.json"`.
    pub filename: String,
    pub path: PathBuf,
}

impl CorpusFile {
    /// Path relative to the corpus root, as recorded in manifests.
    /// Always `/`-separated regardless of platform.
    pub fn relative_path(&self) -> String {
        format!("{}/{}/{}", self.partition, self.subdir, self.filename)
    }
}

pub struct CorpusWalker {
    root: PathBuf,
    exclude: GlobSet,
}

impl CorpusWalker {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        Self::with_root(&config.root, &config.exclude_globs)
    }

    pub fn with_root(root: &Path, exclude_globs: &[String]) -> Result<Self> {
        if !root.exists() {
            bail!("corpus root does not exist: {}", root.display());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in exclude_globs {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            root: root.to_path_buf(),
            exclude: builder.build()?,
        })
    }

    /// Lazily enumerate every `*.json` document. Restartable: each call
    /// starts a fresh walk.
    pub fn walk(&self) -> impl Iterator<Item = Result<CorpusFile>> + '_ {
        WalkDir::new(&self.root)
            .min_depth(3)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| self.to_corpus_file(entry).transpose())
    }

    /// Number of documents a walk would yield. Used for progress totals.
    pub fn count(&self) -> Result<u64> {
        let mut total = 0u64;
        for file in self.walk() {
            file?;
            total += 1;
        }
        Ok(total)
    }

    fn to_corpus_file(
        &self,
        entry: walkdir::Result<walkdir::DirEntry>,
    ) -> Result<Option<CorpusFile>> {
        let entry = entry?;
        if !entry.file_type().is_file() {
            return Ok(None);
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Ok(None);
        }

        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut components = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string());
        let (Some(partition), Some(subdir), Some(filename)) =
            (components.next(), components.next(), components.next())
        else {
            return Ok(None);
        };

        let rel_str = format!("{}/{}/{}", partition, subdir, filename);
        if self.exclude.is_match(&rel_str) {
            return Ok(None);
        }

        Ok(Some(CorpusFile {
            partition,
            subdir,
            filename,
            path: path.to_path_buf(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();

        for (year, sub, name) in [
            ("2000", "1xxx", "CVE-2000-1001.json"),
            ("1999", "0xxx", "CVE-1999-0002.json"),
            ("1999", "0xxx", "CVE-1999-0001.json"),
            ("1999", "1xxx", "CVE-1999-1300.json"),
        ] {
            let dir = root.join(year).join(sub);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(name), "{}").unwrap();
        }

        // Entries the walk must skip: stray files above document depth,
        // non-json documents, and anything nested deeper.
        fs::write(root.join("delta.json"), "{}").unwrap();
        fs::write(root.join("1999").join("notes.txt"), "x").unwrap();
        fs::write(root.join("1999").join("0xxx").join("index.txt"), "x").unwrap();
        let deep = root.join("1999").join("0xxx").join("nested");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("CVE-1999-9999.json"), "{}").unwrap();

        tmp
    }

    #[test]
    fn walk_is_lexicographic_and_depth_pinned() {
        let tmp = fixture();
        let walker = CorpusWalker::with_root(tmp.path(), &[]).unwrap();

        let files: Vec<String> = walker
            .walk()
            .map(|f| f.unwrap().relative_path())
            .collect();

        assert_eq!(
            files,
            vec![
                "1999/0xxx/CVE-1999-0001.json",
                "1999/0xxx/CVE-1999-0002.json",
                "1999/1xxx/CVE-1999-1300.json",
                "2000/1xxx/CVE-2000-1001.json",
            ]
        );
    }

    #[test]
    fn walk_is_restartable_and_deterministic() {
        let tmp = fixture();
        let walker = CorpusWalker::with_root(tmp.path(), &[]).unwrap();

        let first: Vec<String> = walker.walk().map(|f| f.unwrap().relative_path()).collect();
        let second: Vec<String> = walker.walk().map(|f| f.unwrap().relative_path()).collect();
        assert_eq!(first, second);
        assert_eq!(walker.count().unwrap(), first.len() as u64);
    }

    #[test]
    fn exclude_globs_filter_documents() {
        let tmp = fixture();
        let walker =
            CorpusWalker::with_root(tmp.path(), &["**/CVE-1999-0002.json".to_string()]).unwrap();

        let files: Vec<String> = walker.walk().map(|f| f.unwrap().relative_path()).collect();
        assert!(!files.iter().any(|f| f.contains("CVE-1999-0002")));
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn missing_root_is_an_error() {
        assert!(CorpusWalker::with_root(Path::new("/nonexistent/corpus"), &[]).is_err());
    }
}
