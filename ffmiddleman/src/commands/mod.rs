use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand};
use clap_complete::Shell;
use strum::{Display as DisplayMacro, EnumString, IntoStaticStr};

use crate::commands::defaults::DefaultsSubcommand;

pub mod defaults;
pub mod run;

#[derive(ClapParser)]
#[command(
    name = "ffmiddleman",
    about = "Cut, hardsub and re-encode batches of files with ffmpeg, one after another.",
    version
)]
pub struct FfmiddlemanCli {
    #[command(subcommand)]
    pub command:     Commands,
    /// Specify the location of the field defaults file. Defaults to
    /// `./ffmiddleman.json`.
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,
    /// Log file. Defaults to `./logs/ffmiddleman.log`.
    #[arg(long, global = true)]
    pub logs:        Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process files. Unset options fall back to the saved field defaults.
    ///
    /// While running, type `p` to pause, `r` to resume and `q` to stop
    /// (each followed by Enter).
    Run(Box<RunArgs>),
    /// Saved field defaults management
    Defaults {
        #[command(subcommand)]
        subcommand: DefaultsSubcommand,
    },
    /// Print a shell completion script
    Completions { shell: Shell },
}

#[derive(Args)]
pub struct RunArgs {
    /// Files to process, in order.
    #[arg(required = true)]
    pub files:           Vec<PathBuf>,

    /// Cut start, `HH:MM:SS[.frac]`.
    #[arg(long, requires = "cut_to", help_heading = "Cut")]
    pub cut_from:        Option<String>,
    /// Cut end, `HH:MM:SS[.frac]`.
    #[arg(long, requires = "cut_from", help_heading = "Cut")]
    pub cut_to:          Option<String>,
    /// Ignore a saved cut range.
    #[arg(long, conflicts_with = "cut_from", help_heading = "Cut")]
    pub no_cut:          bool,

    /// Burn in the subtitle file next to each source with this extension,
    /// e.g. `ass`.
    #[arg(long, value_name = "EXTENSION", help_heading = "Hardsub")]
    pub hardsub:         Option<String>,
    /// Ignore a saved hardsub setting.
    #[arg(long, conflicts_with = "hardsub", help_heading = "Hardsub")]
    pub no_hardsub:      bool,

    /// Re-encode the video stream, with libx265 unless `--codec` says
    /// otherwise. Implied by any other transcode option.
    #[arg(long, help_heading = "Transcode")]
    pub transcode:       bool,
    #[arg(long, help_heading = "Transcode")]
    pub codec:           Option<String>,
    #[arg(long, help_heading = "Transcode")]
    pub preset:          Option<String>,
    #[arg(long, help_heading = "Transcode")]
    pub tune:            Option<String>,
    /// Constant rate factor. Non-numeric values are ignored. Values above
    /// the codec's range are clamped (51 for x264/x265, 63 for VP9 and AV1).
    #[arg(long, help_heading = "Transcode")]
    pub crf:             Option<String>,
    /// Average video bitrate, e.g. `2M`.
    #[arg(long, help_heading = "Transcode")]
    pub bitrate:         Option<String>,
    #[arg(long, help_heading = "Transcode")]
    pub bufsize:         Option<String>,
    /// Ignore saved transcode settings.
    #[arg(long, conflicts_with = "transcode", help_heading = "Transcode")]
    pub no_transcode:    bool,

    #[arg(long, help_heading = "Naming")]
    pub prefix:          Option<String>,
    #[arg(long, help_heading = "Naming")]
    pub suffix:          Option<String>,
    /// Output container extension, e.g. `mp4`. Defaults to the source's.
    #[arg(long, help_heading = "Naming")]
    pub format:          Option<String>,
    /// Defaults to the directory of each source.
    #[arg(long, short('d'), help_heading = "Naming")]
    pub destination_dir: Option<PathBuf>,

    /// Additional ffmpeg arguments, inserted before the output file.
    #[arg(long, allow_hyphen_values = true)]
    pub extra_args:      Option<String>,
    /// What to do when an output file already exists.
    #[arg(long, default_value_t = CollisionPolicy::Ask)]
    pub on_collision:    CollisionPolicy,
    #[arg(long)]
    pub ffmpeg:          Option<PathBuf>,
    #[arg(long)]
    pub ffprobe:         Option<PathBuf>,
    /// Do not remember these settings for the next run.
    #[arg(long)]
    pub no_save:         bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr, DisplayMacro)]
pub enum CollisionPolicy {
    #[strum(serialize = "ask")]
    Ask,
    #[strum(serialize = "overwrite")]
    Overwrite,
    #[strum(serialize = "skip")]
    Skip,
}
