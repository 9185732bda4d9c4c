//! Plugin that renames identified files.

use super::{PipelineContext, Plugin};
use crate::core::record::{AnimeFileRecord, CrcStatus, IdentificationResult};
use crate::error::PluginError;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Template used when none is configured
pub const DEFAULT_RENAME_PATTERN: &str = "{anime} - {episode}{version} [{group_short}]({crc}).{ext}";

/// Settings for [`RenamePlugin`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameConfig {
    /// File name template with `{placeholder}` fields
    pub pattern: String,
    /// Move files here instead of renaming in place
    pub destination: Option<PathBuf>,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_RENAME_PATTERN.to_string(),
            destination: None,
        }
    }
}

/// Renames files using the identified metadata.
///
/// Placeholders: `{anime}`, `{anime_english}`, `{episode}`,
/// `{episode_name}`, `{group}`, `{group_short}`, `{version}` (`v2`..`v5`,
/// empty for v1), `{crc}`, `{ext}`, `{year}`, `{type}`, `{resolution}`,
/// `{source}`. Unknown placeholders are left untouched.
pub struct RenamePlugin {
    config: RenameConfig,
    placeholder: Regex,
    unsafe_chars: Regex,
}

impl RenamePlugin {
    pub fn new(config: RenameConfig) -> Self {
        Self {
            config,
            placeholder: Regex::new(r"\{(\w+)\}").unwrap(),
            unsafe_chars: Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).unwrap(),
        }
    }

    /// File name the template produces for `result`
    pub fn file_name_for(&self, result: &IdentificationResult) -> String {
        let record = &result.record;
        let rendered = self
            .placeholder
            .replace_all(&self.config.pattern, |caps: &Captures| {
                match placeholder_value(record, result.path(), &caps[1]) {
                    Some(value) => self.unsafe_chars.replace_all(&value, "_").into_owned(),
                    None => caps[0].to_string(),
                }
            });
        rendered.trim().to_string()
    }

    /// Where `result` should end up
    pub fn target_for(&self, result: &IdentificationResult) -> PathBuf {
        let directory = match &self.config.destination {
            Some(destination) => destination.clone(),
            None => result
                .path()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        directory.join(self.file_name_for(result))
    }

    fn failure(&self, reason: String) -> PluginError {
        PluginError::Failed {
            plugin: self.name().to_string(),
            hook: "on_processed",
            reason,
        }
    }
}

impl Default for RenamePlugin {
    fn default() -> Self {
        Self::new(RenameConfig::default())
    }
}

impl Plugin for RenamePlugin {
    fn name(&self) -> &str {
        "rename"
    }

    fn on_processed(
        &self,
        ctx: &PipelineContext,
        result: &IdentificationResult,
    ) -> Result<(), PluginError> {
        let source = result.path();
        let target = self.target_for(result);

        if target == source {
            info!(path = %source.display(), "Already named correctly");
            return Ok(());
        }

        if ctx.test_mode {
            info!(from = %source.display(), to = %target.display(), "Test mode, would rename");
            return Ok(());
        }

        if target.exists() {
            return Err(self.failure(format!("{} already exists", target.display())));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| self.failure(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        move_file(source, &target).map_err(|e| {
            self.failure(format!("{} -> {}: {}", source.display(), target.display(), e))
        })?;

        info!(from = %source.display(), to = %target.display(), "Renamed");
        Ok(())
    }
}

fn placeholder_value(record: &AnimeFileRecord, source: &Path, key: &str) -> Option<String> {
    let value = match key {
        "anime" => record.romaji_name.clone(),
        "anime_english" => {
            if record.english_name.is_empty() {
                record.romaji_name.clone()
            } else {
                record.english_name.clone()
            }
        }
        "episode" => record.episode_number.clone(),
        "episode_name" => {
            if record.episode_english_name.is_empty() {
                record.episode_romaji_name.clone()
            } else {
                record.episode_english_name.clone()
            }
        }
        "group" => record.group_name.clone(),
        "group_short" => record.group_short_name.clone(),
        "version" => match record.version() {
            1 => String::new(),
            v => format!("v{}", v),
        },
        "crc" => match record.crc_status() {
            CrcStatus::Error => format!("{}-BAD", record.crc32.to_uppercase()),
            _ => record.crc32.to_uppercase(),
        },
        "ext" => {
            if record.file_type.is_empty() {
                source
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default()
            } else {
                record.file_type.clone()
            }
        }
        "year" => record.year.clone(),
        "type" => record.media_type.clone(),
        "resolution" => record.video_resolution.clone(),
        "source" => record.source.clone(),
        _ => return None,
    };
    Some(value)
}

/// Rename, falling back to copy + verify + delete across filesystems
fn move_file(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::rename(source, target).or_else(|_| {
        let source_size = fs::metadata(source)?.len();
        fs::copy(source, target)?;

        let target_size = fs::metadata(target)?.len();
        if target_size != source_size {
            let _ = fs::remove_file(target);
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!(
                    "Copy verification failed: source {} bytes, target {} bytes",
                    source_size, target_size
                ),
            ));
        }

        fs::remove_file(source)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::HashResult;
    use crate::core::session::{AnimeField, FileField, RawFileRecord};
    use tempfile::TempDir;

    fn identified(path: &Path, state: &str) -> IdentificationResult {
        let raw = RawFileRecord::new(1)
            .with_file(FileField::State, state)
            .with_file(FileField::Crc32, "bdf5cd3c")
            .with_file(FileField::FileType, "mkv")
            .with_anime(AnimeField::RomajiName, "Toaru Kagaku no Railgun")
            .with_anime(AnimeField::EpisodeNumber, "01")
            .with_anime(AnimeField::GroupShortName, "Grp");
        IdentificationResult {
            source: HashResult::new(path, 3, "abc"),
            record: AnimeFileRecord::from_raw(&raw),
        }
    }

    #[test]
    fn default_pattern_renders_all_fields() {
        let plugin = RenamePlugin::default();
        let result = identified(Path::new("/anime/raw.mkv"), "1");
        assert_eq!(
            plugin.file_name_for(&result),
            "Toaru Kagaku no Railgun - 01 [Grp](BDF5CD3C).mkv"
        );
    }

    #[test]
    fn version_and_bad_crc_are_marked() {
        let plugin = RenamePlugin::default();
        let result = identified(Path::new("/anime/raw.mkv"), &(2 | 4).to_string());
        assert_eq!(
            plugin.file_name_for(&result),
            "Toaru Kagaku no Railgun - 01v2 [Grp](BDF5CD3C-BAD).mkv"
        );
    }

    #[test]
    fn separators_in_values_are_replaced() {
        let plugin = RenamePlugin::new(RenameConfig {
            pattern: "{anime}/{unknown}".to_string(),
            destination: None,
        });
        let mut result = identified(Path::new("/anime/raw.mkv"), "1");
        result.record.romaji_name = "Fate/Zero".to_string();

        assert_eq!(plugin.file_name_for(&result), "Fate_Zero/{unknown}");
    }

    #[test]
    fn renames_file_in_place() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("raw.mkv");
        fs::write(&source, b"abc").unwrap();

        let plugin = RenamePlugin::default();
        let result = identified(&source, "1");
        plugin
            .on_processed(&PipelineContext::default(), &result)
            .unwrap();

        assert!(!source.exists());
        assert!(dir
            .path()
            .join("Toaru Kagaku no Railgun - 01 [Grp](BDF5CD3C).mkv")
            .exists());
    }

    #[test]
    fn moves_into_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("raw.mkv");
        fs::write(&source, b"abc").unwrap();
        let destination = dir.path().join("sorted").join("railgun");

        let plugin = RenamePlugin::new(RenameConfig {
            pattern: "{episode}.{ext}".to_string(),
            destination: Some(destination.clone()),
        });
        plugin
            .on_processed(&PipelineContext::default(), &identified(&source, "1"))
            .unwrap();

        assert_eq!(fs::read(destination.join("01.mkv")).unwrap(), b"abc");
    }

    #[test]
    fn test_mode_leaves_file_alone() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("raw.mkv");
        fs::write(&source, b"abc").unwrap();

        let ctx = PipelineContext { test_mode: true };
        RenamePlugin::default()
            .on_processed(&ctx, &identified(&source, "1"))
            .unwrap();

        assert!(source.exists());
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("raw.mkv");
        fs::write(&source, b"abc").unwrap();
        fs::write(dir.path().join("01.mkv"), b"other").unwrap();

        let plugin = RenamePlugin::new(RenameConfig {
            pattern: "{episode}.{ext}".to_string(),
            destination: None,
        });
        let result = plugin.on_processed(&PipelineContext::default(), &identified(&source, "1"));

        assert!(result.is_err());
        assert!(source.exists());
    }
}
