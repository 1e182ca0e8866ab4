#![allow(dead_code)]

use std::path::Path;

use url::Url;
use vidcore::core::Platform;
use vidcore::{DownloadRequest, MediaArtifact, MediaKind, Requester};

pub const MIB: u64 = 1024 * 1024;

pub fn request(kind: MediaKind) -> DownloadRequest {
    DownloadRequest::builder()
        .requester(Requester::new(1001, 2002))
        .url(Url::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap())
        .quality(match kind {
            MediaKind::Video => "22",
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
        })
        .kind(kind)
        .platform(Platform::Youtube)
        .build()
}

/// File of `size` bytes with a repeating pattern, so misplaced ranges show up
pub fn patterned_artifact(dir: &Path, name: &str, size: usize, kind: MediaKind) -> (MediaArtifact, Vec<u8>) {
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    let path = dir.join(name);
    std::fs::write(&path, &data).unwrap();
    (MediaArtifact::new(path, size as u64, kind), data)
}

/// Sparse zero-filled file; cheap even for hundreds of MiB
pub fn sparse_artifact(dir: &Path, name: &str, size: u64, kind: MediaKind) -> MediaArtifact {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(size).unwrap();
    MediaArtifact::new(path, size, kind)
}
