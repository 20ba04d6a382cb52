//! Cheap checks run before any external lookup: file type, size, duration
//! and required metadata. Every violation is collected, not just the first.

use crate::models::upload::{AudioFileInfo, UploadMetadata};
use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

pub const ALLOWED_MIME_TYPES: [&str; 11] = [
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
    "audio/mp4",
    "audio/x-m4a",
    "audio/aac",
    "audio/ogg",
    "audio/flac",
    "audio/x-flac",
];

const EXECUTABLE_EXTENSIONS: [&str; 8] = [".exe", ".bat", ".cmd", ".com", ".pif", ".scr", ".vbs", ".js"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    UnsupportedType,
    SuspiciousFileName,
    EmptyFile,
    FileTooSmall,
    FileTooLarge,
    InvalidDuration,
    TooShort,
    TooLong,
    MissingTitle,
    TitleTooLong,
    MissingArtist,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    pub code: ViolationCode,
    pub field: String,
    pub message: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn has(&self, code: ViolationCode) -> bool {
        self.violations.iter().any(|v| v.code == code)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub min_file_bytes: u64,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    pub max_title_chars: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_file_bytes: MIB,
            min_duration_secs: 10.0,
            max_duration_secs: 3.0 * 60.0 * 60.0,
            max_title_chars: 200,
        }
    }
}

fn mib(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / MIB as f64)
}

#[derive(Debug, Clone, Default)]
pub struct UploadValidator {
    rules: ValidationRules,
}

impl UploadValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn validate(&self, metadata: &UploadMetadata, file: &AudioFileInfo) -> ValidationReport {
        let mut violations = Vec::new();
        let mut push = |code, field: &str, message: String, suggestion: &str| {
            violations.push(Violation {
                code,
                field: field.to_string(),
                message,
                suggestion: suggestion.to_string(),
            })
        };

        let mime = file.mime_type.trim().to_ascii_lowercase();
        let mime = mime.split(';').next().unwrap_or_default().trim();
        if !ALLOWED_MIME_TYPES.contains(&mime) {
            push(
                ViolationCode::UnsupportedType,
                "file",
                format!("File type `{}` is not supported", file.mime_type),
                "Upload MP3, WAV, M4A, AAC, OGG or FLAC audio",
            );
        }

        if let Some(name) = file.file_name.as_deref() {
            let name = name.to_ascii_lowercase();
            if EXECUTABLE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
                push(
                    ViolationCode::SuspiciousFileName,
                    "file",
                    format!("`{}` does not look like an audio file", name),
                    "Export the track from your audio software and upload that file",
                );
            }
        }

        let max_bytes = metadata.tier.max_file_bytes();
        if file.size_bytes == 0 {
            push(
                ViolationCode::EmptyFile,
                "file",
                "File is empty".to_string(),
                "Check the export finished and upload the file again",
            );
        } else if file.size_bytes < self.rules.min_file_bytes {
            push(
                ViolationCode::FileTooSmall,
                "file",
                format!(
                    "File is {}; the minimum is {}",
                    mib(file.size_bytes),
                    mib(self.rules.min_file_bytes)
                ),
                "Upload the full-length track rather than a preview",
            );
        } else if file.size_bytes > max_bytes {
            push(
                ViolationCode::FileTooLarge,
                "file",
                format!(
                    "File is {}; your plan allows up to {}",
                    mib(file.size_bytes),
                    mib(max_bytes)
                ),
                "Compress the audio or upgrade your plan",
            );
        }

        if let Some(duration) = file.duration_secs {
            if !duration.is_finite() || duration < 0.0 {
                push(
                    ViolationCode::InvalidDuration,
                    "duration",
                    format!("`{}` is not a valid duration", duration),
                    "Leave the duration out and let the service measure it",
                );
            } else if duration < self.rules.min_duration_secs {
                push(
                    ViolationCode::TooShort,
                    "duration",
                    format!(
                        "Audio is {:.0}s long; the minimum is {:.0}s",
                        duration, self.rules.min_duration_secs
                    ),
                    "Upload at least ten seconds of audio",
                );
            } else if duration > self.rules.max_duration_secs {
                push(
                    ViolationCode::TooLong,
                    "duration",
                    format!(
                        "Audio is {:.0} minutes long; the maximum is {:.0}",
                        duration / 60.0,
                        self.rules.max_duration_secs / 60.0
                    ),
                    "Split long recordings into separate uploads",
                );
            }
        }

        let title = metadata.title.trim();
        if title.is_empty() {
            push(
                ViolationCode::MissingTitle,
                "title",
                "Title is required".to_string(),
                "Give the track a title",
            );
        } else if title.chars().count() > self.rules.max_title_chars {
            push(
                ViolationCode::TitleTooLong,
                "title",
                format!(
                    "Title must be no more than {} characters",
                    self.rules.max_title_chars
                ),
                "Shorten the title",
            );
        }

        if metadata.declared_artist.trim().is_empty() {
            push(
                ViolationCode::MissingArtist,
                "declared_artist",
                "Artist name is required".to_string(),
                "Enter the performing artist as it should be credited",
            );
        }

        ValidationReport {
            valid: violations.is_empty(),
            violations,
        }
    }
}
