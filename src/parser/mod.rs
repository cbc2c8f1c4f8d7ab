use crate::constants;
use crate::error::Result;
use crate::types::RawEntry;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use serde::Serialize;

/// One page of the provider's scoring list.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ScoringPage {
    /// Text of the `status` element; `None` when the element is absent
    pub status: Option<String>,
    pub entries: Vec<RawEntry>,
}

impl ScoringPage {
    pub fn is_ok(&self) -> bool {
        self.status.as_deref().map(str::trim) == Some(constants::STATUS_OK)
    }
}

pub trait PageParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<ScoringPage>;
}

/// Parser for the `GetScoringAiListXML` document.
///
/// Elements are matched by local name. They must either sit in the scoring
/// namespace or be unqualified; anything in a foreign namespace is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScoringAiListV1Parser;

impl ScoringAiListV1Parser {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tracked {
    Status,
    Scoring,
}

fn classify(ns: &ResolveResult, local_name: &[u8]) -> Option<Tracked> {
    let in_scope = match ns {
        ResolveResult::Bound(Namespace(uri)) => *uri == constants::SCORING_XML_NAMESPACE.as_bytes(),
        ResolveResult::Unbound => true,
        ResolveResult::Unknown(_) => false,
    };
    if !in_scope {
        return None;
    }
    match local_name {
        b"status" => Some(Tracked::Status),
        b"scoring" => Some(Tracked::Scoring),
        _ => None,
    }
}

fn entry_from_attributes(start: &BytesStart<'_>) -> Result<RawEntry> {
    let mut entry = RawEntry {
        item_name: String::new(),
        attribution_name: String::new(),
        score_text: String::new(),
        timestamp_text: String::new(),
    };
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let value = attr.unescape_value()?.trim().to_string();
        match attr.key.local_name().as_ref() {
            k if k == constants::ATTR_CONTENTS_NAME.as_bytes() => entry.item_name = value,
            k if k == constants::ATTR_ARTIST_NAME.as_bytes() => entry.attribution_name = value,
            k if k == constants::ATTR_SCORING_DATE_TIME.as_bytes() => entry.timestamp_text = value,
            _ => {}
        }
    }
    Ok(entry)
}

impl PageParser for ScoringAiListV1Parser {
    fn parse(&self, bytes: &[u8]) -> Result<ScoringPage> {
        let mut reader = NsReader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut page = ScoringPage::default();
        let mut open: Option<Tracked> = None;
        let mut current: Option<RawEntry> = None;

        loop {
            match reader.read_resolved_event_into(&mut buf)? {
                (ns, Event::Start(e)) => match classify(&ns, e.local_name().as_ref()) {
                    // Only the first status element counts
                    Some(Tracked::Status) if page.status.is_none() => {
                        page.status = Some(String::new());
                        open = Some(Tracked::Status);
                    }
                    Some(Tracked::Status) => {}
                    Some(Tracked::Scoring) => {
                        current = Some(entry_from_attributes(&e)?);
                        open = Some(Tracked::Scoring);
                    }
                    None => {}
                },
                (ns, Event::Empty(e)) => match classify(&ns, e.local_name().as_ref()) {
                    Some(Tracked::Status) => {
                        page.status.get_or_insert_with(String::new);
                    }
                    Some(Tracked::Scoring) => page.entries.push(entry_from_attributes(&e)?),
                    None => {}
                },
                (_, Event::Text(t)) => {
                    let text = t.unescape()?;
                    match open {
                        Some(Tracked::Status) => {
                            if let Some(status) = page.status.as_mut() {
                                status.push_str(text.trim());
                            }
                        }
                        Some(Tracked::Scoring) => {
                            if let Some(entry) = current.as_mut() {
                                entry.score_text.push_str(text.trim());
                            }
                        }
                        None => {}
                    }
                }
                (_, Event::End(e)) => match e.local_name().as_ref() {
                    b"status" if open == Some(Tracked::Status) => open = None,
                    b"scoring" if open == Some(Tracked::Scoring) => {
                        if let Some(entry) = current.take() {
                            page.entries.push(entry);
                        }
                        open = None;
                    }
                    _ => {}
                },
                (_, Event::Eof) => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(page)
    }
}
