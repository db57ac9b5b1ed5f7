use crate::types::FileStamp;
use anyhow::{Context, Result};
use regex::Regex;
use std::{
    fs,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::LazyLock,
    time::SystemTime,
};
use walkdir::WalkDir;

/// Hậu tố bản copy kiểu " (1)", " (23)".
static COPY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\(\d+\)").expect("valid copy suffix regex"));

/// Bỏ file ẩn / file tạm (.DS_Store, ~$...)
fn is_hidden_or_temp(p: &Path) -> bool {
    p.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.starts_with('.') || s.starts_with("~$"))
        .unwrap_or(false)
}

/// mtime unix (milliseconds)
fn mtime_unix_ms(meta: &fs::Metadata) -> Result<i64> {
    let m = meta.modified()?;
    let dur = m.duration_since(SystemTime::UNIX_EPOCH)?;
    Ok(dur.as_millis() as i64)
}

/// Hash nhanh: 64KB đầu + 64KB cuối
pub fn quick_hash_file(path: &Path, size: u64) -> Result<String> {
    const CHUNK: usize = 64 * 1024; // 64KB

    let mut f = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(&size.to_le_bytes());

    // head
    let head_len = (size as usize).min(CHUNK);
    let mut buf = vec![0u8; head_len];
    f.read_exact(&mut buf)
        .with_context(|| format!("read head {}", path.display()))?;
    hasher.update(&buf);

    // tail
    if (size as usize) > CHUNK {
        let tail_len = (size as usize).min(CHUNK);
        f.seek(SeekFrom::End(-(tail_len as i64)))
            .with_context(|| format!("seek tail {}", path.display()))?;
        let mut tail = vec![0u8; tail_len];
        f.read_exact(&mut tail)
            .with_context(|| format!("read tail {}", path.display()))?;
        hasher.update(&tail);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Tạo FileStamp từ path
pub fn stat_file(p: &Path) -> Result<FileStamp> {
    let meta = fs::metadata(p).with_context(|| format!("metadata {}", p.display()))?;
    let size = meta.len();
    let mt_ms = mtime_unix_ms(&meta)?;
    let qh = quick_hash_file(p, size)?;

    Ok(FileStamp {
        path: p.to_path_buf(),
        size,
        mtime_unix_ms: mt_ms,
        quick_hash: qh,
    })
}

/// Size in bytes of a regular file.
pub fn file_size(p: &Path) -> std::io::Result<u64> {
    let meta = fs::metadata(p)?;
    if !meta.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", p.display()),
        ));
    }
    Ok(meta.len())
}

/// Copy-group id: stem without " (N)" copy suffixes, then size, then extension.
///
/// `apple (1).png` (512 bytes) => `apple_size=512.png`. With a content hash the
/// first 16 hex digits are added: `apple_size=512_hash=0123abcd....png`.
pub fn copy_group_id(rel_path: &Path, size: u64, quick_hash: Option<&str>) -> String {
    let stem = rel_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = rel_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let base = COPY_SUFFIX
        .split(&stem)
        .find(|part| !part.is_empty())
        .unwrap_or(&stem)
        .to_string();

    let base = match rel_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.join(base).to_string_lossy().replace('\\', "/"),
        None => base,
    };

    match quick_hash {
        Some(h) => format!("{}_size={}_hash={}{}", base, size, &h[..h.len().min(16)], ext),
        None => format!("{}_size={}{}", base, size, ext),
    }
}

/// A file under the target root.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Relative to the target root, '/' separated.
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// Liệt kê file trong target dir, theo thứ tự tên file.
///
/// Non-recursive mode only looks at the top level; subdirectories are returned
/// separately so the caller can report them.
pub fn list_files(root: &Path, recursive: bool) -> Result<(Vec<ScannedFile>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut skipped_dirs = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_or_temp(e.path()));

    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        let p = entry.path();

        if entry.file_type().is_dir() {
            if !recursive {
                skipped_dirs.push(p.to_path_buf());
            }
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = p
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", p.display(), root.display()))?;

        files.push(ScannedFile {
            rel_path: rel.to_string_lossy().replace('\\', "/"),
            abs_path: p.to_path_buf(),
        });
    }

    Ok((files, skipped_dirs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_group_id_strips_copy_suffix() {
        let a = copy_group_id(Path::new("one-two three_four (1).xyz"), 10, None);
        let b = copy_group_id(Path::new("one-two three_four (2).xyz"), 10, None);
        let c = copy_group_id(Path::new("one-two three four (4).xyz"), 10, None);
        let d = copy_group_id(Path::new("one-two three_four (5).abc"), 10, None);
        let e = copy_group_id(Path::new("one-two three_four (3).xyz"), 11, None);

        assert_eq!(a, "one-two three_four_size=10.xyz");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, e);
    }

    #[test]
    fn copy_group_id_keeps_parent_and_hash_prefix() {
        let id = copy_group_id(
            Path::new("sub/apple (1).png"),
            512,
            Some("0123456789abcdef0123456789abcdef"),
        );
        assert_eq!(id, "sub/apple_size=512_hash=0123456789abcdef.png");
    }

    #[test]
    fn quick_hash_depends_on_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let c = dir.path().join("c.bin");
        fs::write(&a, vec![1u8; 200_000]).unwrap();
        fs::write(&b, vec![1u8; 200_000]).unwrap();
        let mut other = vec![1u8; 200_000];
        other[199_999] = 2;
        fs::write(&c, other).unwrap();

        let ha = stat_file(&a).unwrap().quick_hash;
        assert_eq!(ha, stat_file(&b).unwrap().quick_hash);
        assert_ne!(ha, stat_file(&c).unwrap().quick_hash);
    }

    #[test]
    fn list_files_top_level_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.jpg"), b"b").unwrap();
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.jpg"), b"c").unwrap();

        let (files, skipped) = list_files(dir.path(), false).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(names, ["a.jpg", "b.jpg"]);
        assert_eq!(skipped.len(), 1);

        let (files, skipped) = list_files(dir.path(), true).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(names, ["a.jpg", "b.jpg", "sub/c.jpg"]);
        assert!(skipped.is_empty());
    }

    #[test]
    fn file_size_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(file_size(dir.path()).is_err());
        let f = dir.path().join("x");
        fs::write(&f, b"12345").unwrap();
        assert_eq!(file_size(&f).unwrap(), 5);
    }
}
