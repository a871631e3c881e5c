//! Evidence citations.
//!
//! Theorycrafting tickets follow a loose convention: someone posts a
//! `Finding:` (or `Theory:` / `Bug:`), then `Evidence:`, then
//! `Significance:`. The scanner below picks those posts out of a transcript
//! and renders the markdown block that gets pasted into the evidence library.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use archive_types::{Message, Roster, Transcript};

const UNKNOWN: &str = "*Unknown*";
const MINOR_WORDS: &[&str] = &["a", "to", "the"];

const FINDING_LABELS: &str = r"theory/finding/bug|finding|theory|bug";

static FINDING_RE: Lazy<Regex> = Lazy::new(|| marker(MESSAGE_START, FINDING_LABELS));
static EVIDENCE_RE: Lazy<Regex> = Lazy::new(|| marker(MESSAGE_START, "evidence"));
static SIGNIFICANCE_RE: Lazy<Regex> = Lazy::new(|| marker(MESSAGE_START, "significance"));
/// Any label opening a line inside a section body.
static INNER_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    marker(LINE_START, &format!("{}|evidence|significance", FINDING_LABELS))
});
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>\[\]()]+").expect("URL regex pattern is valid"));

const MESSAGE_START: &str = r"(?i)^\s*";
const LINE_START: &str = r"(?im)^[ \t]*";

/// Label after `anchor`, optionally in `*`/`_` emphasis, followed by a colon.
fn marker(anchor: &str, labels: &str) -> Regex {
    Regex::new(&format!(r"{}[*_]*({})[*_]*:[*_]*[ \t]*\n?", anchor, labels))
        .expect("marker regex pattern is valid")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceOptions {
    /// Keep every Finding block instead of only the latest one.
    #[serde(default)]
    pub collect_all_findings: bool,
    /// Public origin the discussion link points back to.
    pub discussion_base_url: String,
}

impl Default for EvidenceOptions {
    fn default() -> Self {
        Self {
            collect_all_findings: false,
            discussion_base_url: "http://localhost:3000".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Finding,
    Evidence,
    Significance,
}

/// One labelled slot, e.g. `Theory:` and whatever followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Label as the author wrote it (`Finding`, `theory`, `Bug`, ...).
    pub label: String,
    pub body: String,
}

impl Section {
    fn unknown(label: &str) -> Self {
        Self {
            label: label.into(),
            body: UNKNOWN.into(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.body == UNKNOWN
    }
}

/// Finding, Evidence and Significance. `None` marks a slot that a later
/// marker invalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingBlock {
    pub finding: Option<Section>,
    pub evidence: Option<Section>,
    pub significance: Option<Section>,
    touched: bool,
}

impl Default for FindingBlock {
    fn default() -> Self {
        Self {
            finding: Some(Section::unknown("Finding")),
            evidence: Some(Section::unknown("Evidence")),
            significance: Some(Section::unknown("Significance")),
            touched: false,
        }
    }
}

impl FindingBlock {
    fn opened_by(finding: Section) -> Self {
        Self {
            finding: Some(finding),
            evidence: None,
            significance: None,
            touched: true,
        }
    }

    fn slots(&self) -> impl Iterator<Item = &Section> {
        [&self.finding, &self.evidence, &self.significance]
            .into_iter()
            .flatten()
    }
}

/// Who posted the latest matched marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contributor {
    pub username: String,
    pub tag: String,
}

impl Contributor {
    fn unknown() -> Self {
        Self {
            username: "Unknown".into(),
            tag: "????".into(),
        }
    }

    /// `name\#tag`; the `#` is escaped so markdown keeps it literal.
    pub fn citation(&self) -> String {
        format!("{}\\#{}", self.username, self.tag)
    }
}

/// Result of one pass over a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceSections {
    /// Exactly one block unless `collect_all_findings` was set.
    pub blocks: Vec<FindingBlock>,
    pub contributor: Option<Contributor>,
    pub last_edit: Option<DateTime<Utc>>,
}

impl EvidenceSections {
    /// Scan `messages` (oldest first) for markers.
    pub fn scan(messages: &[Message], roster: &Roster, collect_all: bool) -> Self {
        let mut blocks = vec![FindingBlock::default()];
        let mut contributor = None;
        let mut last_edit: Option<DateTime<Utc>> = None;

        for message in messages {
            let Some((marker, section)) = classify(&message.content) else {
                continue;
            };

            let current = blocks.len() - 1;
            match marker {
                Marker::Finding if collect_all && blocks[current].touched => {
                    blocks.push(FindingBlock::opened_by(section));
                }
                Marker::Finding => blocks[current] = FindingBlock::opened_by(section),
                Marker::Evidence => {
                    let block = &mut blocks[current];
                    block.evidence = Some(section);
                    block.significance = None;
                    block.touched = true;
                }
                Marker::Significance => {
                    let block = &mut blocks[current];
                    block.significance = Some(section);
                    block.touched = true;
                }
            }

            contributor = Some(match roster.user(message.author_id.as_str()) {
                Some(user) => Contributor {
                    username: user.username.clone().unwrap_or_else(|| "Unknown".into()),
                    tag: user.tag.clone().unwrap_or_else(|| "????".into()),
                },
                None => Contributor::unknown(),
            });
            let touched = message.last_touched();
            last_edit = Some(last_edit.map_or(touched, |prev| prev.max(touched)));
        }

        debug!(
            "Evidence scan: {} messages, {} block(s), matched={}",
            messages.len(),
            blocks.len(),
            contributor.is_some()
        );

        Self {
            blocks,
            contributor,
            last_edit,
        }
    }

    fn latest(&self) -> Option<&FindingBlock> {
        self.blocks.last()
    }

    pub fn finding(&self) -> Option<&Section> {
        self.latest().and_then(|b| b.finding.as_ref())
    }

    pub fn evidence(&self) -> Option<&Section> {
        self.latest().and_then(|b| b.evidence.as_ref())
    }

    pub fn significance(&self) -> Option<&Section> {
        self.latest().and_then(|b| b.significance.as_ref())
    }
}

fn classify(content: &str) -> Option<(Marker, Section)> {
    if content.trim().is_empty() {
        return None;
    }
    [
        (Marker::Finding, &*FINDING_RE),
        (Marker::Evidence, &*EVIDENCE_RE),
        (Marker::Significance, &*SIGNIFICANCE_RE),
    ]
    .into_iter()
    .find_map(|(marker, re)| {
        let caps = re.captures(content)?;
        let end = caps.get(0)?.end();
        Some((
            marker,
            Section {
                label: caps[1].to_string(),
                body: content[end..].trim_end().to_string(),
            },
        ))
    })
}

/// Render the citation block for a transcript.
///
/// Uses every message the transcript holds, in identifier order, so callers
/// wanting the full citation must load all pages first.
pub fn extract_evidence(transcript: &Transcript, options: &EvidenceOptions) -> String {
    let messages = transcript.chronological();
    let sections = EvidenceSections::scan(
        &messages,
        &transcript.roster,
        options.collect_all_findings,
    );
    render(transcript, &sections, options)
}

pub fn render(transcript: &Transcript, sections: &EvidenceSections, options: &EvidenceOptions) -> String {
    let primary = sections
        .contributor
        .clone()
        .unwrap_or_else(Contributor::unknown)
        .citation();
    let mut contributors = vec![primary];
    for prior in &transcript.contributors {
        if !contributors.contains(prior) {
            contributors.push(prior.clone());
        }
    }

    let added = iso_date(transcript.created_at);
    let tested = iso_date(sections.last_edit.unwrap_or(transcript.created_at));
    let discussion = format!(
        "{}/transcripts/{}",
        options.discussion_base_url.trim_end_matches('/'),
        transcript.slug
    );

    let body = sections
        .blocks
        .iter()
        .flat_map(|block| block.slots())
        .map(render_section)
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "### {}\n\n**By:** {}  \n**Added:** {}  \n**Last tested:** {}  \n[Discussion]({})\n\n{}",
        beautify_channel(&transcript.channel_name),
        contributors.join(", "),
        added,
        tested,
        discussion,
        body
    )
}

fn render_section(section: &Section) -> String {
    // One post often carries all three labels; give the inner ones the same form.
    let body = INNER_MARKER_RE.replace_all(&section.body, "**${1}:**\n");
    format!("**{}:**  \n{}", section.label, hard_breaks(&linkify(&body)))
}

fn iso_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// `bug-report_channel` -> `Bug Report Channel`, leaving minor words lowercase.
pub fn beautify_channel(name: &str) -> String {
    name.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .enumerate()
        .map(|(i, word)| {
            if i > 0 && MINOR_WORDS.contains(&word.to_lowercase().as_str()) {
                word.to_lowercase()
            } else {
                capitalize(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Every line break becomes a markdown hard break.
fn hard_breaks(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("  \n")
}

/// Turn bare URLs into `[label](url)`. URLs that are already a link target
/// or wrapped in `<...>` are left alone.
pub fn linkify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for m in URL_RE.find_iter(text) {
        let before = &text[..m.start()];
        if before.ends_with("](") || before.ends_with('<') {
            continue;
        }
        let url = m.as_str().trim_end_matches(['.', ',', '!', '?', ':', ';', '\'', '"']);
        let Some(label) = link_label(url) else {
            continue;
        };
        out.push_str(&text[last..m.start()]);
        out.push_str(&format!("[{}]({})", label, url));
        last = m.start() + url.len();
    }
    out.push_str(&text[last..]);
    out
}

/// Friendly name for the host of `url`; `None` if it does not parse.
pub fn link_label(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let label = match host.strip_prefix("www.").unwrap_or(host) {
        "youtube.com" | "youtu.be" => "YouTube".to_string(),
        "imgur.com" | "i.imgur.com" => "Imgur".to_string(),
        "docs.google.com" => "Google Docs".to_string(),
        _ => host.to_string(),
    };
    Some(label)
}
