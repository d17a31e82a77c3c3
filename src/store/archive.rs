//! Gzip'd tar blobs for cached workspace paths

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io;
use std::path::Path;

/// Pack `relative` (a file or directory under `root`) into a tar.gz blob
///
/// Entries keep their workspace-relative paths so that [`unpack`] restores
/// them in place.
pub fn pack(root: &Path, relative: &Path) -> io::Result<Vec<u8>> {
    let source = root.join(relative);
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    if source.is_dir() {
        builder.append_dir_all(relative, &source)?;
    } else {
        builder.append_path_with_name(&source, relative)?;
    }

    builder.into_inner()?.finish()
}

/// Unpack a blob produced by [`pack`] into `root`
pub fn unpack(blob: &[u8], root: &Path) -> io::Result<()> {
    std::fs::create_dir_all(root)?;
    let mut archive = tar::Archive::new(GzDecoder::new(blob));
    archive.set_overwrite(true);
    archive.unpack(root)
}
