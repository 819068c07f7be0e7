//! Text-level model of an XMP sidecar
//!
//! The document is kept as the original text and edited by splicing, so every
//! byte outside the regions GeoRAW owns (GPS fields and the keyword bag)
//! survives a merge untouched. Only the first `rdf:Description` is written to.

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const XMP_SKELETON: &str = concat!(
    "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n",
    "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\" x:xmptk=\"GeoRAW\">\n",
    "  <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n",
    "    <rdf:Description rdf:about=\"\">\n",
    "    </rdf:Description>\n",
    "  </rdf:RDF>\n",
    "</x:xmpmeta>\n",
    "<?xpacket end=\"w\"?>",
);

static DESCRIPTION_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<rdf:Description\b[^>]*>").expect("description regex"));
static DESCRIPTION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<rdf:Description\b[^>]*>|</rdf:Description\s*>").expect("description tag regex"));
static RDF_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<rdf:RDF\b[^>]*>").expect("rdf regex"));

/// Region of the sidecar a merge operation owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Gps,
    Keywords,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Gps => f.write_str("gps"),
            Region::Keywords => f.write_str("keywords"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SidecarError {
    /// Nothing to do; callers report this as "unchanged", not as a failure
    #[error("{0} already present in sidecar")]
    AlreadyPresent(Region),
    #[error("no tags provided")]
    NoTagsProvided,
    #[error("malformed sidecar: {0}")]
    Malformed(String),
    #[error("sidecar is not valid UTF-8")]
    InvalidUtf8,
    #[error("sidecar I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SidecarError {
    pub fn is_already_present(&self) -> bool {
        matches!(self, SidecarError::AlreadyPresent(_))
    }
}

/// Byte ranges of the primary description element
#[derive(Debug, Clone)]
pub(crate) struct DescriptionSpan {
    pub open: Range<usize>,
    /// `None` for a self-closing `<rdf:Description .../>`
    pub close: Option<Range<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarDocument {
    text: String,
}

impl Default for SidecarDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl SidecarDocument {
    /// Fresh packet with one empty description
    pub fn new() -> Self {
        Self {
            text: XMP_SKELETON.to_string(),
        }
    }

    /// Load an existing sidecar.
    ///
    /// Blank input yields a fresh document. An `rdf:RDF` block without any
    /// description gets an empty one inserted.
    pub fn parse(bytes: &[u8]) -> Result<Self, SidecarError> {
        let text = std::str::from_utf8(bytes).map_err(|_| SidecarError::InvalidUtf8)?;
        if text.trim().is_empty() {
            return Ok(Self::new());
        }

        let mut doc = Self { text: text.to_string() };
        if DESCRIPTION_OPEN.is_match(&doc.text) {
            doc.primary_description()?;
            return Ok(doc);
        }

        let rdf = RDF_OPEN
            .find(&doc.text)
            .ok_or_else(|| SidecarError::Malformed("no rdf:RDF or rdf:Description element".to_string()))?;
        if rdf.as_str().ends_with("/>") {
            return Err(SidecarError::Malformed("empty rdf:RDF element".to_string()));
        }
        let indent = format!("{}  ", line_indent(&doc.text, rdf.start()));
        let inserted = format!(
            "\n{indent}<rdf:Description rdf:about=\"\">\n{indent}</rdf:Description>"
        );
        doc.text.insert_str(rdf.end(), &inserted);
        Ok(doc)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.text.into_bytes()
    }

    /// Locate the first description and its matching close tag.
    pub(crate) fn primary_description(&self) -> Result<DescriptionSpan, SidecarError> {
        let open = DESCRIPTION_OPEN
            .find(&self.text)
            .ok_or_else(|| SidecarError::Malformed("rdf:Description not found".to_string()))?;
        if open.as_str().ends_with("/>") {
            return Ok(DescriptionSpan {
                open: open.range(),
                close: None,
            });
        }

        let mut depth = 1usize;
        for tag in DESCRIPTION_TAG.find_iter(&self.text[open.end()..]) {
            let s = tag.as_str();
            if s.starts_with("</") {
                depth -= 1;
                if depth == 0 {
                    let start = open.end() + tag.start();
                    return Ok(DescriptionSpan {
                        open: open.range(),
                        close: Some(start..start + s.len()),
                    });
                }
            } else if !s.ends_with("/>") {
                depth += 1;
            }
        }

        Err(SidecarError::Malformed("unterminated rdf:Description".to_string()))
    }

    /// Turn a self-closing primary description into an open/close pair.
    pub(crate) fn expanded_description(&mut self) -> Result<(DescriptionSpan, Range<usize>), SidecarError> {
        let span = self.primary_description()?;
        if span.close.is_none() {
            let tag = &self.text[span.open.clone()];
            let head = tag[..tag.len() - 2].trim_end();
            let indent = line_indent(&self.text, span.open.start);
            let replacement = format!("{head}>\n{indent}</rdf:Description>");
            self.text.replace_range(span.open.clone(), &replacement);
        }

        let span = self.primary_description()?;
        let body = match &span.close {
            Some(close) => span.open.end..close.start,
            None => return Err(SidecarError::Malformed("rdf:Description could not be expanded".to_string())),
        };
        Ok((span, body))
    }

    /// Indentation of the line holding the primary description tag
    pub(crate) fn description_indent(&self) -> Result<String, SidecarError> {
        let span = self.primary_description()?;
        Ok(line_indent(&self.text, span.open.start).to_string())
    }

    /// Add attributes to the primary description start tag.
    pub(crate) fn insert_description_attributes(&mut self, attrs: &[String]) -> Result<(), SidecarError> {
        if attrs.is_empty() {
            return Ok(());
        }
        let span = self.primary_description()?;
        let updated = insert_tag_attributes(&self.text[span.open.clone()], attrs);
        self.text.replace_range(span.open, &updated);
        Ok(())
    }

    /// Declare `xmlns:<prefix>` on the primary description unless it already is.
    pub(crate) fn ensure_namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SidecarError> {
        let span = self.primary_description()?;
        if declares_namespace(&self.text[span.open], prefix) {
            return Ok(());
        }
        self.insert_description_attributes(&[format!("xmlns:{prefix}=\"{uri}\"")])
    }

    pub(crate) fn text_mut(&mut self) -> &mut String {
        &mut self.text
    }
}

impl fmt::Display for SidecarDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Leading whitespace of the line containing `pos`
pub(crate) fn line_indent(text: &str, pos: usize) -> &str {
    let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let line = &text[line_start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

fn declares_namespace(tag: &str, prefix: &str) -> bool {
    let needle = format!("xmlns:{prefix}");
    tag.match_indices(&needle).any(|(idx, _)| {
        let rest = &tag[idx + needle.len()..];
        rest.trim_start().starts_with('=')
    })
}

/// Append attributes to a start tag, one per line when the tag is already
/// multi-line, space separated otherwise.
fn insert_tag_attributes(tag: &str, attrs: &[String]) -> String {
    let (head, suffix) = match tag.strip_suffix("/>") {
        Some(head) => (head, "/>"),
        None => (tag.strip_suffix('>').unwrap_or(tag), ">"),
    };
    let content = head.trim_end();
    let trailing = &head[content.len()..];

    let mut out = String::with_capacity(tag.len() + attrs.iter().map(|a| a.len() + 8).sum::<usize>());
    out.push_str(content);
    if content.contains('\n') {
        let indent = guess_attribute_indent(content);
        for attr in attrs {
            out.push('\n');
            out.push_str(indent);
            out.push_str(attr);
        }
    } else {
        for attr in attrs {
            out.push(' ');
            out.push_str(attr);
        }
    }
    out.push_str(trailing);
    out.push_str(suffix);
    out
}

fn guess_attribute_indent(head: &str) -> &str {
    head.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| {
            let width = line.len() - line.trim_start_matches([' ', '\t']).len();
            &line[..width]
        })
        .unwrap_or("  ")
}
