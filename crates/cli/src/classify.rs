//! `upsync classify`: run the classifier on plain path lists.

use std::path::Path;

use anyhow::{Context, Result};

use upsync_core::classifier::{classify, status_overlap};
use upsync_core::PathSet;

use crate::style::{self, Bucket};
use crate::triage::bucket_table;

pub fn run(
    user: Option<&Path>,
    modified: Option<&Path>,
    deleted: Option<&Path>,
    json: bool,
) -> Result<()> {
    let user = read_path_list(user)?;
    let modified = read_path_list(modified)?;
    let deleted = read_path_list(deleted)?;

    let overlap = status_overlap(&modified, &deleted);
    let result = classify(&user, &modified, &deleted);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if !overlap.is_empty() {
        eprintln!(
            "{}",
            style::warn(&format!(
                "{} path(s) listed as both modified and deleted; they appear in two buckets",
                overlap.len()
            ))
        );
    }

    if result.is_empty() {
        println!("{}", style::success("No modified or deleted paths given"));
        return Ok(());
    }

    let table = bucket_table(&[
        (Bucket::MissingFromRemote, &result.missing_from_remote),
        (Bucket::SafeUpdate, &result.safe_update),
        (Bucket::Conflict, &result.conflict),
        (Bucket::DeletedByUser, &result.deleted_by_user),
    ]);
    println!("{}", table);
    Ok(())
}

/// Read a newline-delimited path list. A missing argument is an empty set.
fn read_path_list(path: Option<&Path>) -> Result<PathSet> {
    let Some(path) = path else {
        return Ok(PathSet::new());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read path list {}", path.display()))?;
    Ok(parse_path_list(&contents))
}

fn parse_path_list(contents: &str) -> PathSet {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix("./").unwrap_or(line).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_list() {
        let set = parse_path_list("a.js\n\n  ./b/c.js \r\na.js\n");
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["a.js", "b/c.js"]);
    }

    #[test]
    fn test_missing_list_is_empty() {
        assert!(read_path_list(None).unwrap().is_empty());
    }

    #[test]
    fn test_read_path_list_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("modified.txt");
        std::fs::write(&file, "x.js\ny.js\n").unwrap();
        let set = read_path_list(Some(&file)).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("y.js"));
    }

    #[test]
    fn test_unreadable_list_errors() {
        let err = read_path_list(Some(Path::new("/nonexistent/list.txt"))).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to read path list"));
    }
}
