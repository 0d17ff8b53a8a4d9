use anyhow::Context;
use bytes::Bytes;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Stores a recipe image and returns its public URI.
#[instrument(skip(st, image), fields(size = image.body.len(), content_type = %image.content_type))]
pub async fn upload_recipe_image(
    st: &AppState,
    owner_id: Uuid,
    image: UploadItem,
) -> AppResult<String> {
    let ext = ext_from_mime(&image.content_type).ok_or_else(|| {
        AppError::Validation("Only jpg, png and webp images are allowed".into())
    })?;
    if image.body.is_empty() {
        return Err(AppError::Validation("Image file is empty".into()));
    }
    if image.body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::Validation("Image must be 5 MB or smaller".into()));
    }

    let key = format!("recipes/{}/{}.{}", owner_id, Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, image.body, &image.content_type)
        .await
        .with_context(|| format!("upload recipe image {key}"))?;

    info!(%owner_id, %key, "recipe image stored");
    Ok(st.storage.public_url(&key))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod image_tests {
    use super::*;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/heic"), None);
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn upload_uses_owner_prefixed_key() {
        let state = AppState::fake();
        let owner = Uuid::new_v4();
        let url = upload_recipe_image(
            &state,
            owner,
            UploadItem {
                body: Bytes::from_static(b"\x89PNG"),
                content_type: "image/png".into(),
            },
        )
        .await
        .unwrap();
        assert!(url.starts_with(&format!("https://fake.local/recipes/{owner}/")));
        assert!(url.ends_with(".png"));
    }

    #[tokio::test]
    async fn upload_rejects_wrong_type_and_oversize() {
        let state = AppState::fake();
        let owner = Uuid::new_v4();
        let gif = UploadItem {
            body: Bytes::from_static(b"GIF89a"),
            content_type: "image/gif".into(),
        };
        assert!(matches!(
            upload_recipe_image(&state, owner, gif).await,
            Err(AppError::Validation(_))
        ));

        let huge = UploadItem {
            body: Bytes::from(vec![0u8; MAX_IMAGE_BYTES + 1]),
            content_type: "image/jpeg".into(),
        };
        assert!(matches!(
            upload_recipe_image(&state, owner, huge).await,
            Err(AppError::Validation(_))
        ));
    }
}
