//! Filesystem asset loader
//!
//! Resolves audio and texture references against the assets directory and
//! checks that the bytes are usable before handing them to the preloader:
//! audio must open with rodio's decoder, textures must carry a PNG or JPEG
//! signature.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use frostbeat_media::{AssetKind, AssetLoader, MediaError};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];

pub struct FsAssetLoader {
    root: PathBuf,
}

impl FsAssetLoader {
    pub fn new(root: &Path) -> Self {
        tracing::info!("Assets directory: {}", root.display());
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Absolute references are used as-is, everything else is relative to the root
    fn resolve(&self, id: &str) -> PathBuf {
        let path = Path::new(id);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl AssetLoader for FsAssetLoader {
    fn load(&self, kind: AssetKind, id: &str) -> frostbeat_media::Result<Arc<[u8]>> {
        let path = self.resolve(id);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MediaError::NotFound(path.display().to_string()),
            _ => MediaError::Io(e),
        })?;

        match kind {
            AssetKind::Audio => {
                if let Err(e) = rodio::Decoder::new(Cursor::new(bytes.clone())) {
                    return Err(MediaError::Decode {
                        id: id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
            AssetKind::Texture => {
                if !bytes.starts_with(PNG_SIGNATURE) && !bytes.starts_with(JPEG_SIGNATURE) {
                    return Err(MediaError::Decode {
                        id: id.to_string(),
                        reason: "not a PNG or JPEG image".to_string(),
                    });
                }
            }
        }

        tracing::debug!("Loaded {} '{}' ({} bytes)", kind, id, bytes.len());
        Ok(Arc::from(bytes))
    }
}
