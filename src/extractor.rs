use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classifier::is_image_reference;

/// Asset classes localized by the pipeline, in the order a snapshot processes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetClass {
    Css,
    Js,
    Image,
}

impl AssetClass {
    /// Subdirectory of the snapshot holding this class.
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetClass::Css => "css",
            AssetClass::Js => "js",
            AssetClass::Image => "images",
        }
    }

    /// Extension written for every asset of the class, `None` when it depends on the bytes.
    pub fn fixed_extension(self) -> Option<&'static str> {
        match self {
            AssetClass::Css => Some("css"),
            AssetClass::Js => Some("js"),
            AssetClass::Image => None,
        }
    }

    /// Patterns used to find this class inside page HTML.
    pub fn page_patterns(self) -> PatternSet {
        match self {
            AssetClass::Css => PatternSet::Stylesheets,
            AssetClass::Js => PatternSet::Scripts,
            AssetClass::Image => PatternSet::PageImages,
        }
    }

    /// Relative path used in rewritten text, e.g. `./css/<name>`.
    pub fn local_reference(self, local_name: &str) -> String {
        format!("./{}/{}", self.dir_name(), local_name)
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetClass::Css => "css",
            AssetClass::Js => "js",
            AssetClass::Image => "image",
        };
        f.write_str(name)
    }
}

/// A fixed group of surface patterns plus the filter applied to what they capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternSet {
    Stylesheets,
    Scripts,
    PageImages,
    /// JSON-like image keys inside fetched JavaScript.
    ScriptImages,
}

static STYLESHEET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"<link href="(.*?)""#,
        r#"<link rel="stylesheet" href="(.*?)""#,
        r#"<link type="text/css" rel="stylesheet" href="(.*?)""#,
    ])
});

static SCRIPT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"<script src="(.*?)""#,
        r#"<script type="text/javascript" src="(.*?)""#,
    ])
});

static PAGE_IMAGE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"<img src="(.*?)""#,
        r#"<img.*?src="(.*?)""#,
        r#"background: url\('(.*?)'\)"#,
    ])
});

static SCRIPT_IMAGE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"photo:"(.*?)""#,
        r#"photoDefault:"(.*?)""#,
        r#"photoDisable:"(.*?)""#,
        r#"logoUrl:"(.*?)""#,
        r#"icon:"(.*?)""#,
    ])
});

// Dot matches newline so a construct may be split over several lines.
fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(&format!("(?s){}", pattern)).expect("static asset pattern"))
        .collect()
}

impl PatternSet {
    fn patterns(self) -> &'static [Regex] {
        match self {
            PatternSet::Stylesheets => STYLESHEET_PATTERNS.as_slice(),
            PatternSet::Scripts => SCRIPT_PATTERNS.as_slice(),
            PatternSet::PageImages => PAGE_IMAGE_PATTERNS.as_slice(),
            PatternSet::ScriptImages => SCRIPT_IMAGE_PATTERNS.as_slice(),
        }
    }

    fn accepts(self, reference: &str) -> bool {
        match self {
            PatternSet::Stylesheets => reference.ends_with(".css"),
            PatternSet::Scripts => reference.ends_with(".js"),
            PatternSet::PageImages | PatternSet::ScriptImages => is_image_reference(reference),
        }
    }
}

/// Distinct references matched by `patterns` in `text`, ordered by first occurrence.
pub fn extract(text: &str, patterns: PatternSet) -> Vec<String> {
    let mut found: Vec<(usize, &str)> = Vec::new();
    for regex in patterns.patterns() {
        for cap in regex.captures_iter(text) {
            if let Some(reference) = cap.get(1) {
                if patterns.accepts(reference.as_str()) {
                    found.push((reference.start(), reference.as_str()));
                }
            }
        }
    }
    found.sort_by_key(|(position, _)| *position);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|(_, reference)| seen.insert(*reference))
        .map(|(_, reference)| reference.to_string())
        .collect()
}
