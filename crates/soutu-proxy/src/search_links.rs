//! Reverse image search links for an issued media URL

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

const GOOGLE_LENS: &str = "https://lens.google.com/uploadbyurl?url=";
const YANDEX_IMAGES: &str = "https://yandex.ru/images/search?rpt=imageview&url=";

/// Search engine entry points for one image URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLinks {
    /// Google Lens upload-by-URL
    pub google_lens: String,
    /// Yandex image search
    pub yandex: String,
}

impl SearchLinks {
    /// Build links for `image_url`, encoded as a query component
    #[must_use]
    pub fn for_image(image_url: &str) -> Self {
        let encoded: String = form_urlencoded::byte_serialize(image_url.as_bytes()).collect();
        Self {
            google_lens: format!("{GOOGLE_LENS}{encoded}"),
            yandex: format!("{YANDEX_IMAGES}{encoded}"),
        }
    }
}
