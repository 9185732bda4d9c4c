//! # Record Module
//!
//! The values that travel through the pipeline:
//! - `HashResult` - a file with its size and ed2k hash (hash stage output)
//! - `AnimeFileRecord` - decoded lookup response
//! - `IdentificationResult` - a `HashResult` paired with its record
//!   (lookup stage output)

mod state;

pub use state::{CensorStatus, CrcStatus, FileState, StateFlag};

use crate::core::session::{AnimeField, FileField, RawFileRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A hashed file waiting for lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashResult {
    pub path: PathBuf,
    pub size: u64,
    pub content_hash: String,
}

impl HashResult {
    /// Create a new hash result
    pub fn new(path: impl Into<PathBuf>, size: u64, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size,
            content_hash: content_hash.into(),
        }
    }

    /// Base name of the file
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// ed2k link identifying this file, e.g. `ed2k://|file|ep01.mkv|3|a448...|/`
    pub fn ed2k_link(&self) -> String {
        format!(
            "ed2k://|file|{}|{}|{}|/",
            self.file_name(),
            self.size,
            self.content_hash
        )
    }
}

/// Everything the service told us about one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeFileRecord {
    pub file_id: u64,
    pub anime_id: u64,
    pub episode_id: u64,
    pub group_id: u64,

    /// Play time in seconds
    pub length: u64,
    pub quality: String,
    pub video_resolution: String,
    pub source: String,
    pub sub_language: String,
    pub dub_language: String,
    pub video_codec: String,
    pub audio_codec_list: String,
    pub crc32: String,
    /// File extension as known to the service
    pub file_type: String,

    /// Status bitmask and its decoded flags
    pub state: FileState,

    pub media_type: String,
    pub year: String,
    pub highest_episode_number: String,
    pub english_name: String,
    pub romaji_name: String,
    pub episode_number: String,
    pub episode_english_name: String,
    pub episode_romaji_name: String,
    pub group_name: String,
    pub group_short_name: String,
}

impl AnimeFileRecord {
    /// Decode the raw columns of a lookup response
    pub fn from_raw(raw: &RawFileRecord) -> Self {
        let file = |field| raw.file_value(field).to_string();
        let anime = |field| raw.anime_value(field).to_string();

        Self {
            file_id: raw.file_id,
            anime_id: parse_leading_number(raw.file_value(FileField::AnimeId)),
            episode_id: parse_leading_number(raw.file_value(FileField::EpisodeId)),
            group_id: parse_leading_number(raw.file_value(FileField::GroupId)),
            length: parse_leading_number(raw.file_value(FileField::Length)),
            quality: file(FileField::Quality),
            video_resolution: file(FileField::VideoResolution),
            source: file(FileField::Source),
            sub_language: file(FileField::SubLanguage),
            dub_language: file(FileField::DubLanguage),
            video_codec: file(FileField::VideoCodec),
            audio_codec_list: file(FileField::AudioCodecList),
            crc32: file(FileField::Crc32),
            file_type: file(FileField::FileType),
            state: FileState::decode(parse_leading_number(raw.file_value(FileField::State)) as u32),
            media_type: anime(AnimeField::Type),
            year: anime(AnimeField::Year),
            highest_episode_number: anime(AnimeField::HighestEpisodeNumber),
            english_name: anime(AnimeField::EnglishName),
            romaji_name: anime(AnimeField::RomajiName),
            episode_number: anime(AnimeField::EpisodeNumber),
            episode_english_name: anime(AnimeField::EpisodeEnglishName),
            episode_romaji_name: anime(AnimeField::EpisodeRomajiName),
            group_name: anime(AnimeField::GroupName),
            group_short_name: anime(AnimeField::GroupShortName),
        }
    }

    pub fn crc_status(&self) -> CrcStatus {
        self.state.crc
    }

    pub fn censor_status(&self) -> CensorStatus {
        self.state.censor
    }

    pub fn version(&self) -> u8 {
        self.state.version
    }
}

/// A file the service identified, handed to the action stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationResult {
    pub source: HashResult,
    pub record: AnimeFileRecord,
}

impl IdentificationResult {
    pub fn path(&self) -> &Path {
        &self.source.path
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parse the leading digits of `value`, 0 if there are none
fn parse_leading_number(value: &str) -> u64 {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}
