use crate::error::UploadError;
use crate::fs_scan;
use crate::types::{DestinationIds, NextUploadDescriptor};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Performs the actual transfer and picks destination ids.
pub trait Uploader {
    fn upload(&self, descriptor: &NextUploadDescriptor) -> Result<DestinationIds, UploadError>;
}

/// Uploads into a local (or mounted) directory: `<destination_root>/<album>/`.
pub struct DirectoryUploader {
    target_root: PathBuf,
    destination_root: PathBuf,
    default_album: Option<String>,
}

impl DirectoryUploader {
    pub fn new(
        target_root: impl Into<PathBuf>,
        destination_root: impl Into<PathBuf>,
        default_album: Option<String>,
    ) -> Self {
        Self {
            target_root: target_root.into(),
            destination_root: destination_root.into(),
            default_album,
        }
    }

    fn transfer_err(path: &Path) -> impl FnOnce(std::io::Error) -> UploadError + '_ {
        move |source| UploadError::Transfer {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl Uploader for DirectoryUploader {
    fn upload(&self, d: &NextUploadDescriptor) -> Result<DestinationIds, UploadError> {
        let album = d
            .destination_album_id
            .clone()
            .or_else(|| self.default_album.clone())
            .ok_or_else(|| UploadError::NoAlbum(d.local_path.clone()))?;

        let src = self.target_root.join(&d.local_path);
        let file_name = src
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "item".to_string());

        let album_dir = self.destination_root.join(&album);
        fs::create_dir_all(&album_dir).map_err(Self::transfer_err(&album_dir))?;

        // prefix index: cùng tên file ở thư mục khác không đè nhau
        let dest = album_dir.join(format!("{:06}_{}", d.catalog_index, file_name));
        let partial = dest.with_extension("partial");

        let copied = fs::copy(&src, &partial).map_err(Self::transfer_err(&src))?;
        fs::rename(&partial, &dest).map_err(Self::transfer_err(&dest))?;

        let hash = fs_scan::quick_hash_file(&dest, copied).map_err(|e| {
            UploadError::Transfer {
                path: dest.clone(),
                source: std::io::Error::other(format!("{e:#}")),
            }
        })?;

        info!(
            catalog_index = d.catalog_index,
            src = %src.display(),
            dest = %dest.display(),
            "uploaded"
        );

        Ok(DestinationIds {
            destination_album_id: Some(album),
            destination_item_id: format!("{}-{}", d.catalog_index, &hash[..16]),
        })
    }
}
