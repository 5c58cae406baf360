//! Quick content hash used to key cached pose tracks by their source video.
//!
//! Small files are hashed whole. Larger files hash the first and last chunk plus the
//! file size (little-endian u64), which is stable across copies and cheap for long videos.

use crate::constants::HASH_CHUNK_SIZE;
use crate::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Hash in-memory video bytes
#[must_use]
pub fn quick_video_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    if bytes.len() <= HASH_CHUNK_SIZE * 2 {
        hasher.update(bytes);
    } else {
        hasher.update(&bytes[..HASH_CHUNK_SIZE]);
        hasher.update(&bytes[bytes.len() - HASH_CHUNK_SIZE..]);
        hasher.update((bytes.len() as u64).to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Hash a video file on disk without reading its middle section
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read
pub async fn quick_video_hash_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let size = file.metadata().await?.len();
    let chunk = HASH_CHUNK_SIZE as u64;

    let mut hasher = Sha256::new();
    if size <= chunk * 2 {
        let mut all = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        file.read_to_end(&mut all).await?;
        hasher.update(&all);
    } else {
        let mut buf = vec![0u8; HASH_CHUNK_SIZE];
        file.read_exact(&mut buf).await?;
        hasher.update(&buf);
        file.seek(std::io::SeekFrom::Start(size - chunk)).await?;
        file.read_exact(&mut buf).await?;
        hasher.update(&buf);
        hasher.update(size.to_le_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}
