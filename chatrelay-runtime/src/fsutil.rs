use anyhow::Context;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Write `bytes` to a uniquely named sibling of `dst` and rename it into place.
///
/// Concurrent writers of the same `dst` never share a temp file; the last
/// rename wins and readers only ever see a complete file.
pub fn write_atomic(dst: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = match dst.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("create directory: {}", parent.display()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".chatrelay-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp: {}", tmp.path().display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("flush temp: {}", tmp.path().display()))?;

    tmp.persist(dst)
        .map_err(|e| anyhow::Error::new(e.error))
        .with_context(|| format!("replace {}", dst.display()))?;
    Ok(())
}
