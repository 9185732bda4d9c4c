//! Decoding of the per-file status bitmask.
//!
//! Each bit asserts an independent fact about the file. Several bits
//! may be set at once, including more than one version bit.

use serde::{Deserialize, Serialize};

/// One named bit of the status bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateFlag {
    CrcOk,
    CrcError,
    Version2,
    Version3,
    Version4,
    Version5,
    Uncensored,
    Censored,
}

impl StateFlag {
    /// All flags with their bit values, in table order
    pub const TABLE: [(StateFlag, u32); 8] = [
        (StateFlag::CrcOk, 1),
        (StateFlag::CrcError, 2),
        (StateFlag::Version2, 4),
        (StateFlag::Version3, 8),
        (StateFlag::Version4, 16),
        (StateFlag::Version5, 32),
        (StateFlag::Uncensored, 64),
        (StateFlag::Censored, 128),
    ];

    /// Release version asserted by this flag, if it is a version flag
    pub const fn version(self) -> Option<u8> {
        match self {
            StateFlag::Version2 => Some(2),
            StateFlag::Version3 => Some(3),
            StateFlag::Version4 => Some(4),
            StateFlag::Version5 => Some(5),
            _ => None,
        }
    }
}

/// Checksum verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrcStatus {
    Ok,
    Error,
    Unknown,
}

/// Censorship verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CensorStatus {
    Censored,
    Uncensored,
    Unknown,
}

impl std::fmt::Display for CrcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrcStatus::Ok => write!(f, "ok"),
            CrcStatus::Error => write!(f, "error"),
            CrcStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::fmt::Display for CensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CensorStatus::Censored => write!(f, "censored"),
            CensorStatus::Uncensored => write!(f, "uncensored"),
            CensorStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// The decoded form of a status bitmask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// The raw bitmask as returned by the service
    pub bitmask: u32,
    /// Flags whose bit is set, in table order
    pub flags: Vec<StateFlag>,
    pub crc: CrcStatus,
    pub censor: CensorStatus,
    /// Highest asserted version, 1 when no version bit is set
    pub version: u8,
}

impl FileState {
    /// Decode a bitmask.
    ///
    /// When both bits of a pair are set, the one earlier in
    /// [`StateFlag::TABLE`] wins.
    pub fn decode(bitmask: u32) -> Self {
        let flags: Vec<StateFlag> = StateFlag::TABLE
            .iter()
            .filter(|(_, bit)| bitmask & bit != 0)
            .map(|(flag, _)| *flag)
            .collect();

        let crc = flags
            .iter()
            .find_map(|flag| match flag {
                StateFlag::CrcOk => Some(CrcStatus::Ok),
                StateFlag::CrcError => Some(CrcStatus::Error),
                _ => None,
            })
            .unwrap_or(CrcStatus::Unknown);

        let censor = flags
            .iter()
            .find_map(|flag| match flag {
                StateFlag::Uncensored => Some(CensorStatus::Uncensored),
                StateFlag::Censored => Some(CensorStatus::Censored),
                _ => None,
            })
            .unwrap_or(CensorStatus::Unknown);

        let version = flags.iter().filter_map(|flag| flag.version()).max().unwrap_or(1);

        Self {
            bitmask,
            flags,
            crc,
            censor,
            version,
        }
    }

    /// Whether `flag` is set
    pub fn contains(&self, flag: StateFlag) -> bool {
        self.flags.contains(&flag)
    }
}
