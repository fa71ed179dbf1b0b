// String resources under res/values*/strings.xml

use std::fs;
use std::path::{Path, PathBuf};

use super::document::{XmlDocument, XmlElement};
use super::error::ManifestResult;

const STRING_REFERENCE: &str = "@string/";
const STRINGS_FILE: &str = "strings.xml";

/// String tables of a decoded source tree
#[derive(Debug, Clone)]
pub struct StringResources {
    res_dir: PathBuf,
}

impl StringResources {
    pub fn new(src_dir: &Path) -> Self {
        Self {
            res_dir: src_dir.join("res"),
        }
    }

    /// Resource name of a `@string/name` reference
    pub fn reference_name(value: &str) -> Option<&str> {
        value
            .trim()
            .strip_prefix(STRING_REFERENCE)
            .filter(|name| !name.is_empty())
    }

    /// Default-locale value of a string resource
    pub fn lookup(&self, name: &str) -> Option<String> {
        let path = self.res_dir.join("values").join(STRINGS_FILE);
        let document = XmlDocument::load(&path).ok()?;
        let value = document
            .root
            .elements()
            .find(|element| is_named_string(element, name))
            .map(|element| unescape(&element.text()))
            .filter(|text| !text.is_empty());
        value
    }

    /// Resolve a label that may be a `@string/` reference. A dangling
    /// reference resolves to the reference text itself.
    pub fn resolve(&self, label: &str) -> String {
        Self::reference_name(label)
            .and_then(|name| self.lookup(name))
            .unwrap_or_else(|| label.to_string())
    }

    /// Set the string `name` in every locale that defines it; returns the
    /// number of entries written
    pub fn set(&self, name: &str, value: &str) -> ManifestResult<usize> {
        self.rewrite_strings(value, |element| is_named_string(element, name))
    }

    /// Set every string whose name contains `app_name` or `label`
    /// (case-insensitive) in every locale
    pub fn set_display_strings(&self, value: &str) -> ManifestResult<usize> {
        self.rewrite_strings(value, |element| {
            element.local_name() == "string"
                && element
                    .attribute(None, "name")
                    .map(|name| {
                        let name = name.to_ascii_lowercase();
                        name.contains("app_name") || name.contains("label")
                    })
                    .unwrap_or(false)
        })
    }

    /// `res/values*/strings.xml` files in a stable order
    pub fn string_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.res_dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("values"))
            .map(|entry| entry.path().join(STRINGS_FILE))
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        files
    }

    fn rewrite_strings(&self, value: &str, matches: impl Fn(&XmlElement) -> bool) -> ManifestResult<usize> {
        let escaped = escape(value);
        let mut written = 0;
        for path in self.string_files() {
            let mut document = XmlDocument::load(&path)?;
            let mut changed = 0;
            for element in document.root.elements_mut() {
                if matches(element) {
                    element.set_text(escaped.clone());
                    changed += 1;
                }
            }
            if changed > 0 {
                document.save(&path)?;
                written += changed;
            }
        }
        Ok(written)
    }
}

fn is_named_string(element: &XmlElement, name: &str) -> bool {
    element.local_name() == "string" && element.attribute(None, "name") == Some(name)
}

/// Escape text for aapt, which rejects bare apostrophes and treats a
/// leading `@` or `?` as a reference
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            '\\' | '\'' | '"' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '@' | '?' if i == 0 => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Reverse of [`escape`], also dropping surrounding double quotes
pub fn unescape(value: &str) -> String {
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}
