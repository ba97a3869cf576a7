//! Helpers for post-processing agent text.

use regex_lite::Regex;
use std::sync::LazyLock;

static PNG_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9_-]+\.png").ok());

/// PNG file names mentioned in `text`, unique, in order of first appearance.
pub fn png_artifacts(text: &str) -> Vec<String> {
    let Some(re) = PNG_NAME.as_ref() else {
        return Vec::new();
    };
    let mut seen = Vec::new();
    for m in re.find_iter(text) {
        let name = m.as_str().to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Remove every occurrence of `sentinel` and trim the result.
pub fn strip_sentinel(text: &str, sentinel: &str) -> String {
    if sentinel.is_empty() {
        return text.trim().to_string();
    }
    text.replace(sentinel, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_png_names_in_order() {
        let text = "Saved revenue_chart.png and margins-2024.png. See revenue_chart.png again.";
        assert_eq!(png_artifacts(text), ["revenue_chart.png", "margins-2024.png"]);
    }

    #[test]
    fn ignores_other_extensions() {
        assert!(png_artifacts("report.pdf and data.csv").is_empty());
        assert_eq!(png_artifacts("path/to/plot.png"), ["plot.png"]);
    }

    #[test]
    fn strips_sentinel() {
        assert_eq!(strip_sentinel("All done.\nTERMINATE", "TERMINATE"), "All done.");
        assert_eq!(strip_sentinel("  nothing  ", ""), "nothing");
    }
}
