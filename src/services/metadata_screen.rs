//! Screening of typed-in metadata.
//!
//! Catches uploads that name a major artist or label without any audio match
//! to back the claim, and titles carrying wording lifted from official
//! releases. Matching is whole-word over normalized text, so "rema" does not
//! hit "remastered" and "emi" does not hit "premier".

use crate::{models::upload::UploadAttempt, services::artist_match::normalize_name};
use serde::Serialize;

pub const MAJOR_ARTISTS: [&str; 20] = [
    "beyonce",
    "drake",
    "taylor swift",
    "ed sheeran",
    "ariana grande",
    "davido",
    "wizkid",
    "burna boy",
    "tiwa savage",
    "asake",
    "rema",
    "adele",
    "justin bieber",
    "billie eilish",
    "the weeknd",
    "bad bunny",
    "dua lipa",
    "harry styles",
    "lizzo",
    "kendrick lamar",
];

pub const MAJOR_LABELS: [&str; 10] = [
    "universal",
    "sony",
    "warner",
    "emi",
    "columbia",
    "atlantic",
    "def jam",
    "interscope",
    "rca",
    "capitol",
];

pub const RELEASE_KEYWORDS: [&str; 9] = [
    "official audio",
    "official video",
    "official music video",
    "vevo",
    "lyric video",
    "audio official",
    "remix official",
    "album version",
    "deluxe edition",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataScreen {
    /// Major artist named in the declared artist or the title.
    pub major_artist: Option<String>,
    /// Major label named as the record label.
    pub major_label: Option<String>,
    /// Official-release wording found in the title or album.
    pub release_keywords: Vec<String>,
}

impl MetadataScreen {
    pub fn names_rights_holder(&self) -> bool {
        self.major_artist.is_some() || self.major_label.is_some()
    }

    pub fn has_release_wording(&self) -> bool {
        !self.release_keywords.is_empty()
    }
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let phrase = normalize_name(phrase);
    !phrase.is_empty() && format!(" {} ", normalized).contains(&format!(" {} ", phrase))
}

fn first_hit(list: &[&str], texts: &[&str]) -> Option<String> {
    list.iter()
        .find(|phrase| texts.iter().any(|text| contains_phrase(text, phrase)))
        .map(|phrase| phrase.to_string())
}

pub fn screen(attempt: &UploadAttempt) -> MetadataScreen {
    let title = normalize_name(&attempt.title);
    let artist = normalize_name(&attempt.declared_artist);
    let album = attempt.album.as_deref().map(normalize_name).unwrap_or_default();
    let label = attempt
        .record_label
        .as_deref()
        .map(normalize_name)
        .unwrap_or_default();

    MetadataScreen {
        major_artist: first_hit(&MAJOR_ARTISTS, &[artist.as_str(), title.as_str()]),
        major_label: first_hit(&MAJOR_LABELS, &[label.as_str()]),
        release_keywords: RELEASE_KEYWORDS
            .iter()
            .filter(|phrase| contains_phrase(&title, phrase) || contains_phrase(&album, phrase))
            .map(|phrase| phrase.to_string())
            .collect(),
    }
}
