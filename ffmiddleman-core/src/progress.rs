use std::path::Path;

use nom::{
    branch::alt,
    bytes::complete::{take_till, take_till1, take_while1},
    character::complete::{char, multispace0, space0},
    combinator::map,
    multi::many0,
    sequence::{preceded, separated_pair},
    IResult,
    Parser,
};
use tracing::{debug, warn};

use crate::{config::ActionConfig, process::DurationProbe};

/// Status lines ffmpeg rewrites in place while encoding start with one of
/// these. `size=` is used instead of `frame=` for audio-only outputs.
pub const PROGRESS_MARKERS: [&str; 2] = ["frame=", "size="];

/// `HH:MM:SS[.frac]` to seconds. Anything else is `None`.
#[inline]
pub fn timecode_to_seconds(timecode: &str) -> Option<f64> {
    let mut parts = timecode.split(':');
    let (hours, minutes, seconds) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let hours = hours.parse::<u64>().ok()?;
    let minutes = minutes.parse::<u64>().ok()?;
    let seconds = seconds.parse::<f64>().ok().filter(|s| s.is_finite() && *s >= 0.0)?;

    let whole = hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)?;
    Some(whole as f64 + seconds)
}

/// Rounds up to whole seconds. Used for both total and elapsed time so the
/// two are always comparable.
#[inline]
pub fn whole_seconds(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds.ceil() as u64
    } else {
        0
    }
}

#[inline]
pub fn is_progress_line(line: &str) -> bool {
    PROGRESS_MARKERS.iter().any(|marker| line.starts_with(marker))
}

/// The only status fields the tracker cares about. All other `key=value`
/// pairs and free text are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusFields {
    pub time:     Option<f64>,
    pub duration: Option<f64>,
}

impl StatusFields {
    #[inline]
    pub fn parse(line: &str) -> Self {
        let mut fields = Self::default();
        let mut tokens = many0(alt((
            map(key_value, Some),
            map(bare_word, |_| None),
        )));

        if let Ok((_, tokens)) = tokens.parse(line) {
            for (key, value) in tokens.into_iter().flatten() {
                match key {
                    "time" => fields.time = timecode_to_seconds(value),
                    "duration" => {
                        fields.duration =
                            value.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0);
                    },
                    _ => (),
                }
            }
        }

        fields
    }
}

/// ffmpeg pads numbers after the `=`, e.g. `frame=  120`.
fn key_value(input: &str) -> IResult<&str, (&str, &str)> {
    preceded(
        multispace0,
        separated_pair(
            take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
            char('='),
            preceded(space0, take_till(char::is_whitespace)),
        ),
    )
    .parse(input)
}

fn bare_word(input: &str) -> IResult<&str, &str> {
    preceded(multispace0, take_till1(char::is_whitespace)).parse(input)
}

/// Seconds reported by an `ffprobe -show_format` run.
#[inline]
pub fn parse_probe_duration(output: &str) -> Option<f64> {
    output.lines().find_map(|line| StatusFields::parse(line).duration)
}

/// Display log that keeps every ordinary line but only the latest progress
/// line of a run of progress lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBuffer {
    sealed:  Vec<String>,
    pending: Option<String>,
}

impl LogBuffer {
    /// Returns whether `line` was a progress line.
    #[inline]
    pub fn push_line(&mut self, line: &str) -> bool {
        if is_progress_line(line) {
            self.pending = Some(line.to_owned());
            return true;
        }

        if let Some(progress) = self.pending.take() {
            self.sealed.push(progress);
        }
        self.sealed.push(line.to_owned());
        false
    }

    #[inline]
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.sealed.iter().map(String::as_str).chain(self.pending.as_deref())
    }

    #[inline]
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    #[inline]
    pub fn text(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sealed.is_empty() && self.pending.is_none()
    }
}

/// Progress of the running job.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    log:     LogBuffer,
    elapsed: u64,
    total:   u64,
}

impl ProgressTracker {
    #[inline]
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Feeds a piece of the tool's error stream. Returns the new elapsed
    /// time when it moved.
    #[inline]
    pub fn push_chunk(&mut self, chunk: &str) -> Option<u64> {
        let mut moved = None;

        for line in chunk.split(['\r', '\n']).filter(|line| !line.trim().is_empty()) {
            if !self.log.push_line(line) {
                continue;
            }
            if let Some(time) = StatusFields::parse(line).time {
                let elapsed = whole_seconds(time);
                if elapsed != self.elapsed {
                    self.elapsed = elapsed;
                    moved = Some(elapsed);
                }
            }
        }

        moved
    }

    #[inline]
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[inline]
    pub fn log(&self) -> &LogBuffer {
        &self.log
    }

    #[inline]
    pub fn into_log(self) -> LogBuffer {
        self.log
    }
}

/// Length in whole seconds of what a job will produce: the cut range when
/// there is one, otherwise the probed duration of the source. Probe problems
/// are not fatal, the job just runs without a known total.
#[inline]
pub fn total_duration<P>(action: &ActionConfig, source: &Path, probe: &mut P) -> u64
where
    P: DurationProbe + ?Sized,
{
    if let Some(cut) = &action.cut {
        let from = timecode_to_seconds(&cut.from).unwrap_or_default();
        let to = timecode_to_seconds(&cut.to).unwrap_or_default();
        return whole_seconds(to - from);
    }

    match probe.probe(source) {
        Ok(output) => parse_probe_duration(&output).map_or_else(
            || {
                warn!("No duration reported for {}", source.display());
                0
            },
            |duration| {
                debug!("Probed {} at {:.3}s", source.display(), duration);
                whole_seconds(duration)
            },
        ),
        Err(e) => {
            warn!("Failed to probe {}: {}", source.display(), e);
            0
        },
    }
}
