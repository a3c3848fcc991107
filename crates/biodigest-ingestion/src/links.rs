//! Code and dataset link extraction from abstracts and author comments.

use once_cell::sync::Lazy;
use regex::Regex;

static CODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"https?://github\.com/[\w\-/]+",
        r"https?://gitlab\.com/[\w\-/]+",
        r"https?://[\w\-\.]+\.github\.io/[\w\-/]+",
    ])
});

static DATASET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"https?://[\w\-\.]*huggingface\.co/datasets/[\w\-/]+",
        r"https?://[\w\-\.]*kaggle\.com/[\w\-/]+",
        r"https?://[\w\-\.]*zenodo\.org/[\w\-/]+",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = p, error = %e, "Invalid link pattern");
                None
            }
        })
        .collect()
}

/// Links found in a paper's free text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedLinks {
    pub code: Vec<String>,
    pub datasets: Vec<String>,
}

/// Find code and dataset URLs, deduplicated in first-seen order.
pub fn extract_links(text: &str) -> ExtractedLinks {
    ExtractedLinks {
        code: find_all(&CODE_PATTERNS, text),
        datasets: find_all(&DATASET_PATTERNS, text),
    }
}

fn find_all(patterns: &[Regex], text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for re in patterns {
        for m in re.find_iter(text) {
            let url = m.as_str().trim_end_matches(['.', '/']).to_string();
            if !found.contains(&url) {
                found.push(url);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_links() {
        let text = "Code at https://github.com/lab/eeg-net and https://lab.github.io/eeg-net/ \
                    plus a mirror https://gitlab.com/lab/eeg-net. Again: https://github.com/lab/eeg-net";
        let links = extract_links(text);
        assert_eq!(links.code, vec![
            "https://github.com/lab/eeg-net".to_string(),
            "https://gitlab.com/lab/eeg-net".to_string(),
            "https://lab.github.io/eeg-net".to_string(),
        ]);
        assert!(links.datasets.is_empty());
    }

    #[test]
    fn test_dataset_links() {
        let text = "Data: https://huggingface.co/datasets/org/ecg-1m, https://zenodo.org/records/123";
        let links = extract_links(text);
        assert_eq!(links.datasets.len(), 2);
        assert!(links.datasets[0].contains("huggingface.co/datasets/org/ecg-1m"));
    }

    #[test]
    fn test_no_links() {
        assert_eq!(extract_links("no urls here"), ExtractedLinks::default());
    }
}
