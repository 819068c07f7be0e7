//! Keyword region of a sidecar (`dc:subject`)

use std::collections::HashSet;

use once_cell::sync::Lazy;
use quick_xml::escape::{escape, unescape};
use regex::Regex;
use tracing::debug;

use crate::document::{Region, SidecarDocument, SidecarError};

pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

static SUBJECT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(?:\r?\n[ \t]*)?<dc:subject\b[^>]*>.*?</dc:subject\s*>").expect("subject regex")
});
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<rdf:li\b[^>]*>(.*?)</rdf:li\s*>").expect("list item regex"));

impl SidecarDocument {
    /// Keywords from every `dc:subject` bag, de-duplicated case-insensitively
    /// with the first-seen spelling kept.
    pub fn keywords(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        SUBJECT_BLOCK
            .find_iter(self.as_str())
            .flat_map(|block| LIST_ITEM.captures_iter(block.as_str()))
            .filter_map(|caps| caps.get(1))
            .map(|m| decode_text(m.as_str().trim()))
            .filter(|kw| !kw.is_empty() && seen.insert(kw.to_lowercase()))
            .collect()
    }

    /// Merge `tags` into the keyword list.
    ///
    /// Without `overwrite`, a request whose tags are all present already fails
    /// with `AlreadyPresent`. With `overwrite`, existing keywords matching a
    /// requested tag are replaced by the requested spelling. Either way the
    /// whole list is rewritten, sorted, as one bag in the primary description.
    pub fn merge_keywords<S: AsRef<str>>(&mut self, tags: &[S], overwrite: bool) -> Result<(), SidecarError> {
        let tags = normalize_tags(tags);
        if tags.is_empty() {
            return Err(SidecarError::NoTagsProvided);
        }
        self.primary_description()?;

        let existing = self.keywords();
        let present: HashSet<String> = existing.iter().map(|kw| kw.to_lowercase()).collect();
        if !overwrite && tags.iter().all(|t| present.contains(&t.to_lowercase())) {
            return Err(SidecarError::AlreadyPresent(Region::Keywords));
        }

        let requested: HashSet<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        let mut seen = HashSet::new();
        let mut merged: Vec<String> = existing
            .into_iter()
            .filter(|kw| !(overwrite && requested.contains(&kw.to_lowercase())))
            .chain(tags)
            .filter(|kw| seen.insert(kw.to_lowercase()))
            .collect();
        sort_keywords(&mut merged);

        self.write_subject(&merged)
    }

    fn write_subject(&mut self, keywords: &[String]) -> Result<(), SidecarError> {
        let stripped = SUBJECT_BLOCK.replace_all(self.as_str(), "").into_owned();
        *self.text_mut() = stripped;

        self.ensure_namespace("dc", DC_NAMESPACE)?;
        let indent = format!("{}  ", self.description_indent()?);
        let (_, body) = self.expanded_description()?;

        let content_end = body.start + self.as_str()[body].trim_end().len();
        let block = format!("\n{}", indent_block(&subject_block(keywords), &indent));
        self.text_mut().insert_str(content_end, &block);
        Ok(())
    }
}

/// Trim, drop empties and de-duplicate case-insensitively (first spelling wins).
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Case-insensitive order, byte order between spellings of the same word.
fn sort_keywords(keywords: &mut [String]) {
    keywords.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
}

fn subject_block(keywords: &[String]) -> String {
    let mut out = String::from("<dc:subject>\n  <rdf:Bag>\n");
    for kw in keywords {
        out.push_str("    <rdf:li>");
        out.push_str(&escape(kw.as_str()));
        out.push_str("</rdf:li>\n");
    }
    out.push_str("  </rdf:Bag>\n</dc:subject>");
    out
}

fn indent_block(block: &str, prefix: &str) -> String {
    block
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode keyword text, keeping it verbatim when it holds a malformed reference.
fn decode_text(raw: &str) -> String {
    match unescape(raw) {
        Ok(text) => text.into_owned(),
        Err(err) => {
            debug!("keeping undecodable keyword {raw:?}: {err}");
            raw.to_string()
        }
    }
}
