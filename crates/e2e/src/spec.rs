//! Declarative YAML test cases

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};

/// One acceptance test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

/// A single step in a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a path relative to the site root
    Navigate { url: String },

    Click { selector: String },

    /// Replace the value of an input field
    Fill { selector: String, value: String },

    /// Wait for an element to appear
    Wait {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Assert an element is present (or absent)
    AssertElement {
        selector: String,
        #[serde(default = "default_present")]
        present: bool,
        #[serde(default)]
        text_contains: Option<String>,
    },

    /// Assert the page text contains a string
    AssertText { text: String },

    /// Assert the current URL contains a string
    AssertUrl { contains: String },

    Screenshot { name: String },

    Log { message: String },
}

fn default_present() -> bool {
    true
}

impl TestStep {
    /// Short label used in results and logs
    pub fn label(&self) -> String {
        match self {
            TestStep::Navigate { url } => format!("navigate:{}", url),
            TestStep::Click { selector } => format!("click:{}", selector),
            TestStep::Fill { selector, .. } => format!("fill:{}", selector),
            TestStep::Wait { selector, .. } => format!("wait:{}", selector),
            TestStep::AssertElement { selector, present, .. } => {
                if *present {
                    format!("see:{}", selector)
                } else {
                    format!("dont_see:{}", selector)
                }
            }
            TestStep::AssertText { text } => format!("see_text:{}", truncate(text, 30)),
            TestStep::AssertUrl { contains } => format!("url:{}", contains),
            TestStep::Screenshot { name } => format!("screenshot:{}", name),
            TestStep::Log { message } => format!("log:{}", truncate(message, 30)),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl TestSpec {
    /// Parse a test spec from YAML
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load a test spec from a file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("test name must not be empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("test '{}' has no steps", self.name)));
        }
        Ok(())
    }

    /// Load all test specs from a directory, sorted by name.
    ///
    /// A missing directory yields no tests.
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        if !dir.exists() {
            return Ok(specs);
        }

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}

/// Sample test case written by `init`
pub const SAMPLE_SPEC: &str = r#"name: home-page
description: Home page shows the site title and main menu
tags:
  - smoke
steps:
  - action: navigate
    url: /
  - action: assert_element
    selector: .site-title
  - action: assert_element
    selector: '#site-navigation'
  - action: screenshot
    name: home-page
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_spec() {
        let spec = TestSpec::from_yaml(SAMPLE_SPEC).unwrap();
        assert_eq!(spec.name, "home-page");
        assert_eq!(spec.steps.len(), 4);
        assert_eq!(
            spec.steps[1],
            TestStep::AssertElement {
                selector: ".site-title".to_string(),
                present: true,
                text_contains: None,
            }
        );
    }

    #[test]
    fn test_parse_search_flow() {
        let yaml = r#"
name: search-form
tags: [search]
steps:
  - action: navigate
    url: /
  - action: fill
    selector: '.search-field'
    value: hello
  - action: click
    selector: '.search-submit'
  - action: assert_url
    contains: '?s=hello'
  - action: assert_element
    selector: '.no-results'
    present: false
  - action: wait
    selector: article
    timeout_ms: 2000
"#;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.steps.len(), 6);
        assert_eq!(spec.steps[4].label(), "dont_see:.no-results");
        assert_eq!(
            spec.steps[5],
            TestStep::Wait {
                selector: "article".to_string(),
                timeout_ms: Some(2000)
            }
        );
    }

    #[test]
    fn test_reject_empty_steps() {
        let err = TestSpec::from_yaml("name: empty\nsteps: []\n").unwrap_err();
        assert!(matches!(err, E2eError::SpecParse(_)));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let yaml = "name: x\nsteps:\n  - action: teleport\n    to: /\n";
        assert!(TestSpec::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_all_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.yml"), SAMPLE_SPEC).unwrap();
        std::fs::write(
            dir.path().join("nested/a.yaml"),
            "name: about\nsteps:\n  - action: navigate\n    url: /about/\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let specs = TestSpec::load_all(dir.path()).unwrap();
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["about", "home-page"]);
        assert_eq!(TestSpec::filter_by_tag(&specs, "smoke").len(), 1);

        assert!(TestSpec::load_all(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("héllo wörld", 4), "héll");
        assert_eq!(truncate("short", 30), "short");
    }
}
