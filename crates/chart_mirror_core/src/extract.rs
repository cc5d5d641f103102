//! Image reference extraction.
//!
//! Rendered manifests are scanned line by line. Any line containing
//! `image:` is treated as an image reference and sanitized into a bare
//! `repository:tag` token. The substring test is loose: keys
//! such as `sidecar_image:` or a comment mentioning `image:` also match, and
//! their sanitized text is kept as is.

/// Marker that makes a line an image candidate.
const IMAGE_MARKER: &str = "image:";

/// Returns true when `line` contains an image reference.
#[must_use]
pub fn is_image_line(line: &str) -> bool {
    line.contains(IMAGE_MARKER)
}

/// Reduce an image line to its reference.
///
/// Removes up to two double quotes, surrounding whitespace, one leading YAML
/// list marker and a leading `image: ` key.
///
/// # Examples
///
/// ```
/// use chart_mirror_core::extract::sanitize_image_line;
///
/// assert_eq!(sanitize_image_line("  - image: \"nginx:1.19\""), "nginx:1.19");
/// assert_eq!(sanitize_image_line("        image: busybox"), "busybox");
/// ```
#[must_use]
pub fn sanitize_image_line(line: &str) -> String {
    let unquoted = line.replacen('"', "", 2);
    let trimmed = unquoted.trim();
    let trimmed = trimmed.strip_prefix('-').unwrap_or(trimmed).trim();
    let trimmed = trimmed.strip_prefix("image: ").unwrap_or(trimmed);
    trimmed.trim().to_owned()
}

/// Newline-delimited accumulator of extracted references.
///
/// Order is preserved and repeats are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageBuffer {
    text: String,
}

impl ImageBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one reference followed by a newline.
    pub fn push(&mut self, image: &str) {
        self.text.push_str(image);
        self.text.push('\n');
    }

    /// Append every reference held by `other`.
    pub fn extend(&mut self, other: &Self) {
        self.text.push_str(&other.text);
    }

    /// The raw newline-delimited buffer.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns true when nothing has been extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The non-empty lines of the buffer, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.text
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// Scan `document` and append every image reference to `buffer`.
///
/// Returns the number of references appended.
pub fn extract_images(document: &str, buffer: &mut ImageBuffer) -> usize {
    let mut found = 0;
    for line in document.lines().filter(|line| is_image_line(line)) {
        buffer.push(&sanitize_image_line(line));
        found += 1;
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::list_item_quoted("  - image: \"nginx:1.19\"", "nginx:1.19")]
    #[case::indented("        image: busybox", "busybox")]
    #[case::registry_port("    image: registry.local:5000/app/api:2.0", "registry.local:5000/app/api:2.0")]
    #[case::trailing_space("image: redis:7   ", "redis:7")]
    #[case::empty_value("  - image: \"\"", "image:")]
    #[case::no_space_after_key("image:busybox", "image:busybox")]
    #[case::other_key("  sidecar_image: envoy:1.0", "sidecar_image: envoy:1.0")]
    #[case::three_quotes("image: \"a\"b\"", "ab\"")]
    fn sanitizes_image_lines(#[case] line: &str, #[case] expected: &str) {
        assert!(is_image_line(line));
        assert_eq!(sanitize_image_line(line), expected);
    }

    #[rstest]
    #[case("kind: Deployment")]
    #[case("imagePullPolicy: Always")]
    #[case("image")]
    fn ignores_lines_without_marker(#[case] line: &str) {
        assert!(!is_image_line(line));
    }

    #[test]
    fn extraction_preserves_order_and_repeats() {
        let mut buffer = ImageBuffer::new();
        let first = "containers:\n- image: \"nginx:1.19\"\n  imagePullPolicy: Always\n- image: redis:7\n";
        let second = "initContainers:\n  - image: nginx:1.19\n";

        assert_eq!(extract_images(first, &mut buffer), 2);
        assert_eq!(extract_images(second, &mut buffer), 1);

        assert_eq!(buffer.as_str(), "nginx:1.19\nredis:7\nnginx:1.19\n");
        assert_eq!(buffer.names(), vec!["nginx:1.19", "redis:7", "nginx:1.19"]);
    }

    #[test]
    fn names_skip_empty_references() {
        let mut buffer = ImageBuffer::new();
        buffer.push("");
        buffer.push("a");
        assert_eq!(buffer.as_str(), "\na\n");
        assert_eq!(buffer.names(), vec!["a"]);
    }

    #[test]
    fn extend_appends_in_order() {
        let mut first = ImageBuffer::new();
        first.push("a");
        let mut second = ImageBuffer::new();
        second.push("b");
        first.extend(&second);
        assert_eq!(first.names(), vec!["a", "b"]);
        assert!(!first.is_empty());
        assert!(ImageBuffer::new().is_empty());
    }
}
