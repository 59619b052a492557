//! Placeholder substitution for the deployment descriptor

use anyhow::{bail, Result};
use regex::Regex;
use std::sync::OnceLock;

/// The descriptor shipped with this repository
pub const TEMPLATE: &str = include_str!("../../templates/template.yaml");

pub const CODE_URI_BUCKET: &str = "%codeURIBucket%";
pub const SAR_APP_NAME: &str = "%sarAppName%";
pub const SEMANTIC_VERSION: &str = "%semanticVersion%";

/// Values resolved by the release pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    pub code_uri_bucket: String,
    pub sar_app_name: String,
    pub semantic_version: String,
}

impl Placeholders {
    fn tokens(&self) -> [(&'static str, &str); 3] {
        [
            (CODE_URI_BUCKET, &self.code_uri_bucket),
            (SAR_APP_NAME, &self.sar_app_name),
            (SEMANTIC_VERSION, &self.semantic_version),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (token, value) in self.tokens() {
            if value.trim().is_empty() {
                bail!("No value for placeholder {token}");
            }
            if value.contains('%') {
                bail!("Value for placeholder {token} must not contain '%': {value}");
            }
        }

        static SEMVER: OnceLock<Regex> = OnceLock::new();
        let semver = SEMVER.get_or_init(|| {
            Regex::new(r"^\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$")
                .expect("static regex")
        });
        if !semver.is_match(&self.semantic_version) {
            bail!(
                "Semantic version must look like MAJOR.MINOR.PATCH, got {}",
                self.semantic_version
            );
        }

        Ok(())
    }
}

/// Substitute every placeholder; fail if any `%name%` token is left over
pub fn render(template: &str, placeholders: &Placeholders) -> Result<String> {
    placeholders.validate()?;

    let rendered = placeholders
        .tokens()
        .into_iter()
        .fold(template.to_string(), |text, (token, value)| {
            text.replace(token, value)
        });

    let leftovers = unresolved_placeholders(&rendered);
    if !leftovers.is_empty() {
        bail!("Unresolved placeholders: {}", leftovers.join(", "));
    }
    Ok(rendered)
}

/// Distinct `%name%` tokens in order of first appearance
pub fn unresolved_placeholders(text: &str) -> Vec<String> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        TOKEN.get_or_init(|| Regex::new(r"%[A-Za-z][A-Za-z0-9_]*%").expect("static regex"));

    let mut tokens: Vec<String> = Vec::new();
    for found in pattern.find_iter(text) {
        if !tokens.iter().any(|token| token == found.as_str()) {
            tokens.push(found.as_str().to_string());
        }
    }
    tokens
}
