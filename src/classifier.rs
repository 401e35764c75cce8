use image::ImageFormat;

/// Suffixes accepted as images during extraction, matched case-sensitively.
pub const IMAGE_SUFFIXES: [&str; 10] = [
    "jpg", "jpeg", "png", "gif", "bmp", "JPG", "JPEG", "PNG", "GIF", "BMP",
];

/// Suffix-only image check used while extracting references. Never looks at bytes.
pub fn is_image_reference(reference: &str) -> bool {
    IMAGE_SUFFIXES
        .iter()
        .any(|suffix| reference.ends_with(suffix))
}

/// `//host/path` becomes `http://host/path`; anything else is returned unchanged.
pub fn normalize_scheme_relative(reference: &str) -> String {
    if reference.starts_with("//") {
        format!("http:{}", reference)
    } else {
        reference.to_string()
    }
}

/// Format name of the image encoded in `bytes`, lower-cased (`png`, `jpeg`, `webp`, ...).
pub fn sniff_extension(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes).ok().map(format_name)
}

fn format_name(format: ImageFormat) -> String {
    format!("{:?}", format).to_lowercase()
}

/// Best-effort extension taken from the reference text: whatever follows the last `.`.
pub fn declared_extension(reference: &str) -> &str {
    reference.rsplit('.').next().unwrap_or(reference)
}

/// Extension for a downloaded image. The sniffed format wins over the declared suffix.
pub fn resolve_extension(reference: &str, bytes: &[u8]) -> String {
    match sniff_extension(bytes) {
        Some(extension) => extension,
        None => {
            tracing::debug!(reference, "image format not recognised, using declared suffix");
            declared_extension(reference).to_string()
        }
    }
}
