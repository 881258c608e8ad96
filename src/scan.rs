use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;
use walkdir::WalkDir;

const JPEG_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

pub fn is_jpeg(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| JPEG_EXTENSIONS.iter().any(|j| ext.eq_ignore_ascii_case(j)))
        .unwrap_or(false)
}

/// Lists the JPEG files of `dir` in file-name order.
///
/// Only a missing or unreadable `dir` is an error. Entries below it that
/// cannot be read are logged and skipped.
pub fn collect_images(dir: &Utf8Path, recursive: bool) -> Result<Vec<Utf8PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("Image directory not found: {dir}");
    }

    let walker = if recursive {
        WalkDir::new(dir)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files = Vec::new();
    for entry in walker.follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(e).with_context(|| format!("Failed to read image directory: {dir}"));
            }
            Err(e) => {
                warn!("Skipping unreadable entry in {dir}: {e}");
                continue;
            }
        };

        if entry.file_type().is_file() {
            let Ok(file_path) = Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) else {
                warn!("Skipping non-UTF8 path: {:?}", entry.path());
                continue;
            };

            if is_jpeg(&file_path) {
                files.push(file_path);
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Utf8Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_is_jpeg() {
        assert!(is_jpeg(Utf8Path::new("a.jpg")));
        assert!(is_jpeg(Utf8Path::new("dir/B.JPEG")));
        assert!(is_jpeg(Utf8Path::new("c.Jpg")));
        assert!(!is_jpeg(Utf8Path::new("d.png")));
        assert!(!is_jpeg(Utf8Path::new("e.heic")));
        assert!(!is_jpeg(Utf8Path::new("jpg")));
    }

    #[test]
    fn test_collect_images() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        touch(dir, "b.JPG");
        touch(dir, "a.jpeg");
        touch(dir, "notes.txt");
        touch(dir, "clip.mov");
        fs::create_dir(dir.join("nested")).unwrap();
        touch(&dir.join("nested"), "c.jpg");

        let names = |files: Vec<Utf8PathBuf>| -> Vec<String> {
            files
                .iter()
                .map(|f| f.strip_prefix(dir).unwrap().to_string())
                .collect()
        };

        let flat = collect_images(dir, false).unwrap();
        assert_eq!(names(flat), vec!["a.jpeg", "b.JPG"]);

        let deep = collect_images(dir, true).unwrap();
        assert_eq!(names(deep), vec!["a.jpeg", "b.JPG", "nested/c.jpg"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_images_skips_unreadable_entries() {
        use std::os::unix::fs::symlink;

        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        touch(dir, "a.jpg");
        symlink(dir.join("gone"), dir.join("b.jpg")).unwrap();
        fs::create_dir(dir.join("nested")).unwrap();
        touch(&dir.join("nested"), "c.jpg");
        symlink(dir.join("nested/gone"), dir.join("nested/d.jpg")).unwrap();

        let flat = collect_images(dir, false).unwrap();
        assert_eq!(flat, vec![dir.join("a.jpg")]);

        let deep = collect_images(dir, true).unwrap();
        assert_eq!(deep, vec![dir.join("a.jpg"), dir.join("nested/c.jpg")]);
    }

    #[test]
    fn test_collect_images_missing_dir() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap().join("missing");
        assert!(collect_images(&dir, false).is_err());
    }
}
