//! Receipt image persistence.
//!
//! Images live as `<billId>.<ext>` directly under the image root, with at most
//! one file per bill id. The bill id doubles as a filename, so it is checked
//! for path separators before anything touches the filesystem.

use crate::models::LEGACY_IMAGE_PREFIX;
use crate::services::database::BillRepository;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use service_core::error::AppError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Public URL prefix under which stored images are served.
pub const IMAGES_URL_PREFIX: &str = "/receipts-images";

/// Normalized extensions a stored image may have.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpeg", "png", "gif", "webp"];

static DATA_URL_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^data:image/([a-z0-9\-+]+);base64,").expect("data URL pattern is valid")
});

/// Reject empty ids and ids that could escape the image root.
pub fn validate_bill_id(bill_id: &str) -> Result<(), AppError> {
    if bill_id.is_empty() {
        return Err(AppError::bad_request("Bill ID is required"));
    }
    if bill_id.contains('/') || bill_id.contains('\\') || bill_id.contains("..") {
        return Err(AppError::bad_request("Invalid bill ID"));
    }
    Ok(())
}

/// A data URL split into its (lower-cased) image subtype and base64 payload.
#[derive(Debug, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub subtype: String,
    pub payload: &'a str,
}

impl DataUrl<'_> {
    pub fn mime_type(&self) -> String {
        format!("image/{}", self.subtype)
    }
}

/// Split `data:image/<subtype>;base64,<payload>`. `None` when the prefix does
/// not match.
pub fn parse_data_url(input: &str) -> Option<DataUrl<'_>> {
    let captures = DATA_URL_PREFIX.captures(input)?;
    let prefix = captures.get(0)?;
    let subtype = captures.get(1)?.as_str().to_lowercase();
    Some(DataUrl {
        subtype,
        payload: &input[prefix.end()..],
    })
}

/// True for a well-formed base64 image data URL with a non-empty payload.
pub fn is_image_data_url(input: &str) -> bool {
    parse_data_url(input).is_some_and(|url| !url.payload.trim().is_empty())
}

/// Map an image subtype onto the whitelist, folding `jpg` into `jpeg`.
pub fn normalize_extension(subtype: &str) -> Result<&'static str, AppError> {
    let subtype = subtype.to_lowercase();
    let normalized = if subtype == "jpg" { "jpeg" } else { subtype.as_str() };
    ALLOWED_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| *ext == normalized)
        .ok_or_else(|| {
            AppError::bad_request("Invalid image format. Allowed formats: jpeg, png, gif, webp")
        })
}

/// A validated image ready to be written.
#[derive(Debug)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Validate and decode an uploaded image.
///
/// Input without a recognizable `data:image/...;base64,` prefix is treated as
/// bare base64 of a JPEG.
pub fn decode_image(image_data: &str, max_bytes: usize) -> Result<DecodedImage, AppError> {
    let (extension, payload) = match parse_data_url(image_data) {
        Some(url) => (normalize_extension(&url.subtype)?, url.payload),
        None if image_data.starts_with(LEGACY_IMAGE_PREFIX) => {
            return Err(AppError::bad_request(
                "Invalid image format. Allowed formats: jpeg, png, gif, webp",
            ));
        }
        None => ("jpeg", image_data),
    };

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    // Reject on length before decoding: 4 base64 chars carry 3 bytes.
    if compact.len() / 4 * 3 > max_bytes + 3 {
        return Err(size_error(max_bytes));
    }

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| AppError::bad_request(format!("Invalid base64 image data: {}", e)))?;

    if bytes.is_empty() {
        return Err(AppError::bad_request("Image data is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(size_error(max_bytes));
    }

    Ok(DecodedImage { extension, bytes })
}

fn size_error(max_bytes: usize) -> AppError {
    AppError::bad_request(format!(
        "Image size exceeds maximum allowed size of {}MB",
        max_bytes / (1024 * 1024)
    ))
}

/// Filesystem-backed image store rooted at one directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    max_image_bytes: usize,
}

impl ImageStore {
    pub async fn new(root: impl Into<PathBuf>, max_image_bytes: usize) -> Result<Self, AppError> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).await?;
        }
        Ok(Self {
            root,
            max_image_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, bill_id: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{}", bill_id, extension))
    }

    /// Persist `image_data` as the only image of `bill_id` and return its URL.
    pub async fn store(&self, bill_id: &str, image_data: &str) -> Result<String, AppError> {
        validate_bill_id(bill_id)?;
        if image_data.is_empty() {
            return Err(AppError::bad_request("Image data is required"));
        }

        let image = decode_image(image_data, self.max_image_bytes)?;

        // A re-upload in another format must not leave the old file behind.
        self.remove_all(bill_id).await?;

        let file_name = format!("{}.{}", bill_id, image.extension);
        let size = image.bytes.len();
        fs::write(self.root.join(&file_name), image.bytes)
            .await
            .map_err(|e| {
                tracing::error!(bill_id = %bill_id, error = %e, "Failed to write image");
                AppError::from(e)
            })?;

        metrics::counter!("receipt_images_stored_total", "format" => image.extension)
            .increment(1);
        tracing::info!(
            bill_id = %bill_id,
            format = image.extension,
            size = size,
            "Image stored"
        );

        Ok(format!("{}/{}", IMAGES_URL_PREFIX, file_name))
    }

    /// Remove every image of `bill_id`. Missing files are not an error.
    pub async fn delete(&self, bill_id: &str) -> Result<(), AppError> {
        validate_bill_id(bill_id)?;
        let removed = self.remove_all(bill_id).await?;
        if removed > 0 {
            metrics::counter!("receipt_images_deleted_total").increment(removed as u64);
            tracing::info!(bill_id = %bill_id, removed = removed, "Images deleted");
        }
        Ok(())
    }

    /// Delete the images of a bill that was never saved.
    ///
    /// Refused when a bill with this id exists, since that bill owns the file.
    pub async fn delete_orphan(
        &self,
        bill_id: &str,
        bills: &BillRepository,
    ) -> Result<(), AppError> {
        validate_bill_id(bill_id)?;
        if bills.exists(bill_id).await? {
            tracing::warn!(bill_id = %bill_id, "Refusing to delete image of an existing bill");
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Cannot delete image for existing bill"
            )));
        }
        self.delete(bill_id).await
    }

    /// Existing image files of `bill_id`, in whitelist order.
    pub async fn files_for(&self, bill_id: &str) -> Result<Vec<PathBuf>, AppError> {
        let mut found = Vec::new();
        for ext in ALLOWED_EXTENSIONS {
            let path = self.path_for(bill_id, ext);
            if fs::try_exists(&path).await? {
                found.push(path);
            }
        }
        Ok(found)
    }

    async fn remove_all(&self, bill_id: &str) -> Result<usize, AppError> {
        let mut removed = 0;
        for ext in ALLOWED_EXTENSIONS {
            match fs::remove_file(self.path_for(bill_id, ext)).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}
