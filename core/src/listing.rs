/// Directory enumeration used by the browser listing and the bulk generator
use log::debug;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub name: String,
    pub is_directory: bool,
    pub full_path: PathBuf,
}

/// Lists the direct children of `dir`, directories first, then by name.
pub fn list_directory(dir: &Path) -> Result<Vec<DirectoryEntry>, std::io::Error> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        entries.push(DirectoryEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_directory: path.is_dir(),
            full_path: path,
        });
    }
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(entries)
}

/// Recursively collects every regular file below `root`. Directories are
/// walked but never returned. Links to directories are not followed, so a
/// link back up the tree cannot loop; links to files are collected.
pub fn collect_files(root: &Path) -> Result<Vec<DirectoryEntry>, std::io::Error> {
    let mut files = Vec::new();
    collect_recursive(root, &mut files)?;
    files.sort_by(|a, b| a.full_path.cmp(&b.full_path));
    Ok(files)
}

fn collect_recursive(
    current: &Path,
    files: &mut Vec<DirectoryEntry>,
) -> Result<(), std::io::Error> {
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            collect_recursive(&path, files)?;
        } else if file_type.is_symlink() && path.is_dir() {
            debug!("not following directory link {}", path.to_string_lossy());
        } else if path.is_file() {
            files.push(DirectoryEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: false,
                full_path: path,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lists_directories_first() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("z")).unwrap();

        let entries = list_directory(dir.path()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a.txt", "b.txt"]);
        assert!(entries[0].is_directory);
        assert_eq!(entries[1].full_path, dir.path().join("a.txt"));
    }

    #[test]
    fn collects_nested_files_only() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("写真/2024")).unwrap();
        fs::write(dir.path().join("写真/2024/夏.jpg"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| !f.is_directory));
        assert!(files.iter().any(|f| f.name == "夏.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn directory_links_are_not_followed() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("album")).unwrap();
        fs::write(dir.path().join("album/花.jpg"), "x").unwrap();
        symlink(dir.path(), dir.path().join("album/loop")).unwrap();
        symlink(dir.path().join("album/花.jpg"), dir.path().join("alias.jpg")).unwrap();

        let files = collect_files(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["花.jpg", "alias.jpg"]);

        // Browsing still shows the link as a directory.
        let listed = list_directory(&dir.path().join("album")).unwrap();
        assert!(listed.iter().any(|e| e.name == "loop" && e.is_directory));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(collect_files(&dir.path().join("missing")).is_err());
    }
}
