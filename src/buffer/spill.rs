//! # File spill (part of C6)
//!
//! Persists sealed-but-unsent chunks to disk on close, and rehydrates
//! them back into the flush queue on startup, so an upstream outage
//! that outlives the process doesn't lose buffered events.
//!
//! Filename scheme: `<prefix>#<tag>#<base64 chunk id>#<created-at
//! millis>.msgpack`, one file per chunk, matching Fluentd's own
//! client-side backup naming convention.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;

use crate::chunk::Chunk;
use crate::error::{Error, Result};

fn file_name(prefix: &str, tag: &str, chunk_id: [u8; 16], created_at_millis: u128) -> String {
    let chunk_b64 = BASE64.encode(chunk_id);
    format!("{prefix}#{tag}#{chunk_b64}#{created_at_millis}.msgpack")
}

/// Spill one sealed chunk to `dir` under `prefix`.
pub async fn write_chunk(
    dir: &Path,
    prefix: &str,
    tag: &str,
    chunk_id: [u8; 16],
    payload: &[u8],
) -> Result<()> {
    let created_at_millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let path = dir.join(file_name(prefix, tag, chunk_id, created_at_millis));
    tokio::fs::write(&path, payload)
        .await
        .map_err(Error::TransientIo)?;
    tracing::debug!(tag, path = %path.display(), "chunk spilled to disk");
    Ok(())
}

/// Parse `<prefix>#<tag>#<chunk id>#<created at>.msgpack`, returning
/// `(tag, chunk_id)` when `name` matches `prefix` and the wire format.
fn parse_file_name(name: &str, prefix: &str) -> Option<(String, [u8; 16])> {
    let stem = name.strip_suffix(".msgpack")?;
    let mut parts = stem.splitn(4, '#');
    let found_prefix = parts.next()?;
    if found_prefix != prefix {
        return None;
    }
    let tag = parts.next()?.to_string();
    let chunk_b64 = parts.next()?;
    let _created_at = parts.next()?;

    let decoded = BASE64.decode(chunk_b64).ok()?;
    let chunk_id: [u8; 16] = decoded.try_into().ok()?;
    Some((tag, chunk_id))
}

/// Read back every spilled chunk matching `prefix` under `dir`.
/// Missing directories are treated as "nothing to rehydrate", not an
/// error: a fresh `file_backup_dir` need not exist yet.
pub async fn rehydrate(dir: &Path, prefix: &str) -> Result<Vec<Chunk>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::TransientIo(e)),
    };

    let mut chunks = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(Error::TransientIo)? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some((tag, chunk_id)) = parse_file_name(name, prefix) else {
            continue;
        };

        let bytes = tokio::fs::read(entry.path()).await.map_err(Error::TransientIo)?;
        chunks.push(Chunk::from_spilled(tag, chunk_id, Bytes::from(bytes)));
        tokio::fs::remove_file(entry.path()).await.map_err(Error::TransientIo)?;
    }
    Ok(chunks)
}

/// Delete every spill file matching `prefix` under `dir`, without
/// rehydrating them. Backs `Ingester::clear_backup_files`.
pub async fn clear(dir: &Path, prefix: &str) -> Result<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::TransientIo(e)),
    };

    while let Some(entry) = entries.next_entry().await.map_err(Error::TransientIo)? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if parse_file_name(name, prefix).is_some() {
            tokio::fs::remove_file(entry.path()).await.map_err(Error::TransientIo)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_name_matches_the_prefix_tag_chunk_created_at_scheme() {
        let name = file_name("myapp", "app.log", [0u8; 16], 1_700_000_000_000);
        assert_eq!(
            name,
            "myapp#app.log#AAAAAAAAAAAAAAAAAAAAAA==#1700000000000.msgpack"
        );
    }

    #[test]
    fn parse_file_name_round_trips_a_generated_name() {
        let chunk_id = [5u8; 16];
        let name = file_name("myapp", "app.log", chunk_id, 42);
        let (tag, parsed_id) = parse_file_name(&name, "myapp").unwrap();
        assert_eq!(tag, "app.log");
        assert_eq!(parsed_id, chunk_id);
    }

    #[test]
    fn parse_file_name_rejects_a_different_prefix() {
        let name = file_name("myapp", "app.log", [5u8; 16], 42);
        assert!(parse_file_name(&name, "otherapp").is_none());
    }

    #[tokio::test]
    async fn write_then_rehydrate_round_trips_bytes_and_removes_the_file() {
        let dir = tempdir().unwrap();
        let chunk_id = [9u8; 16];
        write_chunk(dir.path(), "myapp", "app.log", chunk_id, &[1, 2, 3])
            .await
            .unwrap();

        let mut chunks = rehydrate(dir.path(), "myapp").await.unwrap();
        assert_eq!(chunks.len(), 1);
        let chunk = chunks.remove(0);
        assert_eq!(chunk.tag(), "app.log");
        assert_eq!(chunk.chunk_id(), chunk_id);
        assert_eq!(chunk.as_bytes(), &[1, 2, 3]);

        assert!(rehydrate(dir.path(), "myapp").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rehydrate_on_a_missing_directory_returns_empty() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(rehydrate(&missing, "myapp").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_removes_matching_files_but_leaves_others() {
        let dir = tempdir().unwrap();
        write_chunk(dir.path(), "myapp", "app.log", [1u8; 16], &[1])
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("unrelated.txt"), b"keep me")
            .await
            .unwrap();

        clear(dir.path(), "myapp").await.unwrap();

        assert!(rehydrate(dir.path(), "myapp").await.unwrap().is_empty());
        assert!(dir.path().join("unrelated.txt").exists());
    }
}
