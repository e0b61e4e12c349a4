const USAGE_TXT: &str = include_str!("../templates/usage.txt");

/// Plain-text usage help served at `/`.
pub fn usage() -> &'static str {
    USAGE_TXT
}
