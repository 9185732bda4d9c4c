//! File and anime field selection for FILE queries.
//!
//! AniDB selects returned columns with two bitmasks: a 40-bit `fmask`
//! for file columns and a 32-bit `amask` for anime columns. Columns come
//! back in descending bit order, file columns first.

use serde::{Deserialize, Serialize};

/// File-level columns that can be requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileField {
    AnimeId,
    EpisodeId,
    GroupId,
    State,
    Crc32,
    Quality,
    Source,
    AudioCodecList,
    VideoCodec,
    VideoResolution,
    FileType,
    DubLanguage,
    SubLanguage,
    Length,
}

impl FileField {
    /// Every supported column, in response order
    pub const ALL: [FileField; 14] = [
        FileField::AnimeId,
        FileField::EpisodeId,
        FileField::GroupId,
        FileField::State,
        FileField::Crc32,
        FileField::Quality,
        FileField::Source,
        FileField::AudioCodecList,
        FileField::VideoCodec,
        FileField::VideoResolution,
        FileField::FileType,
        FileField::DubLanguage,
        FileField::SubLanguage,
        FileField::Length,
    ];

    /// Columns requested by the lookup stage
    pub const DEFAULT: [FileField; 14] = Self::ALL;

    /// Bit of this column in the 40-bit fmask
    pub const fn mask_bit(self) -> u64 {
        match self {
            FileField::AnimeId => 1 << 38,
            FileField::EpisodeId => 1 << 37,
            FileField::GroupId => 1 << 36,
            FileField::State => 1 << 32,
            FileField::Crc32 => 1 << 27,
            FileField::Quality => 1 << 23,
            FileField::Source => 1 << 22,
            FileField::AudioCodecList => 1 << 21,
            FileField::VideoCodec => 1 << 19,
            FileField::VideoResolution => 1 << 17,
            FileField::FileType => 1 << 16,
            FileField::DubLanguage => 1 << 15,
            FileField::SubLanguage => 1 << 14,
            FileField::Length => 1 << 13,
        }
    }
}

/// Anime-level columns that can be requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnimeField {
    HighestEpisodeNumber,
    Year,
    Type,
    RomajiName,
    EnglishName,
    EpisodeNumber,
    EpisodeEnglishName,
    EpisodeRomajiName,
    GroupName,
    GroupShortName,
}

impl AnimeField {
    /// Every supported column, in response order
    pub const ALL: [AnimeField; 10] = [
        AnimeField::HighestEpisodeNumber,
        AnimeField::Year,
        AnimeField::Type,
        AnimeField::RomajiName,
        AnimeField::EnglishName,
        AnimeField::EpisodeNumber,
        AnimeField::EpisodeEnglishName,
        AnimeField::EpisodeRomajiName,
        AnimeField::GroupName,
        AnimeField::GroupShortName,
    ];

    /// Columns requested by the lookup stage
    pub const DEFAULT: [AnimeField; 10] = Self::ALL;

    /// Bit of this column in the 32-bit amask
    pub const fn mask_bit(self) -> u32 {
        match self {
            AnimeField::HighestEpisodeNumber => 1 << 30,
            AnimeField::Year => 1 << 29,
            AnimeField::Type => 1 << 28,
            AnimeField::RomajiName => 1 << 23,
            AnimeField::EnglishName => 1 << 21,
            AnimeField::EpisodeNumber => 1 << 15,
            AnimeField::EpisodeEnglishName => 1 << 14,
            AnimeField::EpisodeRomajiName => 1 << 13,
            AnimeField::GroupName => 1 << 7,
            AnimeField::GroupShortName => 1 << 6,
        }
    }
}

/// Combine file columns into an fmask
pub fn file_mask(fields: &[FileField]) -> u64 {
    fields.iter().fold(0, |mask, field| mask | field.mask_bit())
}

/// Combine anime columns into an amask
pub fn anime_mask(fields: &[AnimeField]) -> u32 {
    fields.iter().fold(0, |mask, field| mask | field.mask_bit())
}

/// Requested file columns in the order the server returns them
pub fn file_response_order(fields: &[FileField]) -> Vec<FileField> {
    let mut ordered: Vec<FileField> = FileField::ALL
        .iter()
        .copied()
        .filter(|f| fields.contains(f))
        .collect();
    ordered.sort_by_key(|f| std::cmp::Reverse(f.mask_bit()));
    ordered
}

/// Requested anime columns in the order the server returns them
pub fn anime_response_order(fields: &[AnimeField]) -> Vec<AnimeField> {
    let mut ordered: Vec<AnimeField> = AnimeField::ALL
        .iter()
        .copied()
        .filter(|f| fields.contains(f))
        .collect();
    ordered.sort_by_key(|f| std::cmp::Reverse(f.mask_bit()));
    ordered
}
