//! Path utilities for recognising image MIME types from URLs and file names.
//!
//! Used when a provider serves an image without a usable `Content-Type` and
//! the type has to be inferred from the URL or file name.

/// Supported image extensions and their MIME types.
const IMAGE_MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("svg", "image/svg+xml"),
    ("tbn", "image/jpeg"),
];

/// Infer an image MIME type from a URL or file path.
///
/// Query strings and fragments are ignored. Returns `None` when the extension
/// is missing or not a known image type.
///
/// # Examples
///
/// ```
/// use curator_common::paths::image_mime_type;
///
/// assert_eq!(image_mime_type("https://img.example/p/poster.JPG?w=500"), Some("image/jpeg"));
/// assert_eq!(image_mime_type("/metadata/folder.png"), Some("image/png"));
/// assert_eq!(image_mime_type("https://img.example/p/poster"), None);
/// ```
pub fn image_mime_type(url_or_path: &str) -> Option<&'static str> {
    let without_query = url_or_path
        .split(['?', '#'])
        .next()
        .unwrap_or(url_or_path);
    let file_name = without_query.rsplit('/').next().unwrap_or(without_query);
    let (_, ext) = file_name.rsplit_once('.')?;
    mime_for_extension(ext)
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    IMAGE_MIME_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_mime_type_from_urls() {
        assert_eq!(image_mime_type("http://host/a/b.gif"), Some("image/gif"));
        assert_eq!(image_mime_type("http://host/a/b.png#frag"), Some("image/png"));
        assert_eq!(image_mime_type("http://host/a.dir/b"), None);
        assert_eq!(image_mime_type("http://host/a/b.html"), None);
    }
}
