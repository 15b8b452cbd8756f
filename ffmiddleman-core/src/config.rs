use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::progress::timecode_to_seconds;

pub const DEFAULT_TIMECODE: &str = "00:00:00";
pub const DEFAULT_VIDEO_CODEC: &str = "libx265";
/// Highest crf accepted by x264/x265.
pub const MAX_X26X_CRF: u8 = 51;
/// Highest crf accepted by libvpx-vp9, libaom and SVT-AV1.
pub const MAX_AV1_VP9_CRF: u8 = 63;

/// What to do to every file of a batch. Each part is optional and
/// independent of the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub cut:       Option<CutRange>,
    pub hardsub:   Option<Hardsub>,
    pub transcode: Option<Transcode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutRange {
    pub from: String,
    pub to:   String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hardsub {
    /// Extension of the subtitle file sitting next to each source, e.g. `ass`.
    pub subfile_extension: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transcode {
    pub codec:       Option<String>,
    pub preset:      Option<String>,
    pub tune:        Option<String>,
    #[serde(deserialize_with = "lenient_crf")]
    pub crf:         Option<u8>,
    pub avg_bitrate: Option<String>,
    pub bufsize:     Option<String>,
}

impl Transcode {
    #[inline]
    pub fn codec(&self) -> &str {
        self.codec.as_deref().unwrap_or(DEFAULT_VIDEO_CODEC)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub prefix:          Option<String>,
    pub suffix:          Option<String>,
    pub format_override: Option<String>,
    pub destination_dir: Option<PathBuf>,
}

/// A submitted batch. The orchestrator takes ownership of it and never
/// changes it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub files:      Vec<PathBuf>,
    pub action:     ActionConfig,
    pub naming:     NamingConfig,
    pub extra_args: Option<String>,
}

impl JobRequest {
    /// Builds a request with every configuration problem corrected in place.
    /// The corrections are returned so the caller can report them.
    #[inline]
    pub fn new(
        files: Vec<PathBuf>,
        mut action: ActionConfig,
        mut naming: NamingConfig,
        mut extra_args: Option<String>,
    ) -> (Self, Vec<ConfigError>) {
        let corrections = action.normalize();
        naming.normalize();
        clear_blank(&mut extra_args);

        for correction in &corrections {
            warn!("{}", correction);
        }

        (
            Self {
                files,
                action,
                naming,
                extra_args,
            },
            corrections,
        )
    }
}

impl ActionConfig {
    /// Replaces malformed values with safe defaults and drops parts that
    /// cannot produce a meaningful argument.
    #[inline]
    pub fn normalize(&mut self) -> Vec<ConfigError> {
        let mut corrections = Vec::new();

        if let Some(cut) = &mut self.cut {
            for (field, value) in [("start", &mut cut.from), ("end", &mut cut.to)] {
                let padded = pad_timecode(value);
                if timecode_to_seconds(&padded).is_none() {
                    corrections.push(ConfigError::MalformedTimecode {
                        field,
                        value: value.clone(),
                    });
                    DEFAULT_TIMECODE.clone_into(value);
                } else if padded != *value {
                    *value = padded;
                }
            }

            let from = timecode_to_seconds(&cut.from).unwrap_or_default();
            let to = timecode_to_seconds(&cut.to).unwrap_or_default();
            if to <= from {
                corrections.push(ConfigError::EmptyCutRange {
                    from: cut.from.clone(),
                    to:   cut.to.clone(),
                });
                self.cut = None;
            }
        }

        if let Some(hardsub) = &self.hardsub {
            if hardsub.subfile_extension.trim().trim_start_matches('.').is_empty() {
                corrections.push(ConfigError::MissingSubtitleExtension);
                self.hardsub = None;
            }
        }

        if let Some(transcode) = &mut self.transcode {
            clear_blank(&mut transcode.codec);
            clear_blank(&mut transcode.preset);
            clear_blank(&mut transcode.tune);
            clear_blank(&mut transcode.avg_bitrate);
            clear_blank(&mut transcode.bufsize);
            if let (Some(crf), Some(max)) = (transcode.crf, max_crf(transcode.codec())) {
                if crf > max {
                    corrections.push(ConfigError::CrfOutOfRange {
                        crf,
                        max,
                    });
                    transcode.crf = Some(max);
                }
            }
        }

        corrections
    }
}

impl NamingConfig {
    #[inline]
    pub fn normalize(&mut self) {
        clear_blank(&mut self.prefix);
        clear_blank(&mut self.suffix);
        clear_blank(&mut self.format_override);
        if self.destination_dir.as_ref().is_some_and(|dir| dir.as_os_str().is_empty()) {
            self.destination_dir = None;
        }
    }
}

/// Completes a short timecode the way it is typed: `1:30` is `00:01:30`,
/// `90` is `00:00:90` and a blank one is `00:00:00`.
#[inline]
pub fn pad_timecode(timecode: &str) -> String {
    let timecode = timecode.trim();
    if timecode.is_empty() {
        return DEFAULT_TIMECODE.to_owned();
    }

    let missing = 3usize.saturating_sub(timecode.split(':').count());
    let mut padded = "00:".repeat(missing);
    padded.push_str(timecode);
    padded
}

/// Highest crf the encoder accepts, when it is one with a known crf scale.
/// Other encoders get whatever was asked for.
#[inline]
pub fn max_crf(codec: &str) -> Option<u8> {
    match codec {
        "libx264" | "libx264rgb" | "libx265" => Some(MAX_X26X_CRF),
        "libvpx-vp9" | "libaom-av1" | "libsvtav1" => Some(MAX_AV1_VP9_CRF),
        _ => None,
    }
}

fn clear_blank(value: &mut Option<String>) {
    if value.as_ref().is_some_and(|v| v.trim().is_empty()) {
        *value = None;
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCrf {
    Number(f64),
    Text(String),
}

/// Reads a quality value typed by hand. Anything that is not a non-negative
/// number is treated as unset.
#[inline]
pub fn parse_crf(text: &str) -> Option<u8> {
    crf_from_number(text.trim().parse::<f64>().ok()?)
}

fn crf_from_number(number: f64) -> Option<u8> {
    (number.is_finite() && number >= 0.0).then(|| number.round().min(f64::from(u8::MAX)) as u8)
}

fn lenient_crf<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let crf = match Option::<RawCrf>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(RawCrf::Number(number)) => crf_from_number(number),
        Some(RawCrf::Text(text)) => parse_crf(&text),
    };
    if crf.is_none() {
        warn!("Ignoring non-numeric crf value");
    }

    Ok(crf)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Malformed cut {field} timecode {value:?}, using 00:00:00")]
    MalformedTimecode {
        field: &'static str,
        value: String,
    },
    #[error("Cut range {from} - {to} is empty, processing whole files instead")]
    EmptyCutRange { from: String, to: String },
    #[error("crf {crf} is above {max} for this codec, clamping")]
    CrfOutOfRange { crf: u8, max: u8 },
    #[error("Hardsub is enabled without a subtitle extension, ignoring it")]
    MissingSubtitleExtension,
}
