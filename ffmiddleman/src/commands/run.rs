use std::{
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
};

use anyhow::{anyhow, bail, Result};
use ffmiddleman_core::{
    config::parse_crf,
    CutRange,
    FfprobeProbe,
    FieldDefaults,
    Hardsub,
    Orchestrator,
    QueueMessage,
    QueueStatus,
    SystemController,
    ToolPaths,
    Transcode,
};
use indicatif::MultiProgress;
use tracing::{debug, info, warn};

use crate::{
    commands::RunArgs,
    display::BatchDisplay,
    operator::{spawn_input_router, TerminalOperator},
    FfmiddlemanCliError,
};

#[tracing::instrument(skip_all)]
pub fn run_handler(config_path: &Path, mut args: RunArgs) -> Result<()> {
    let files = args
        .files
        .iter()
        .map(|file| Ok(path_abs::PathAbs::new(file)?.as_path().to_path_buf()))
        .collect::<Result<Vec<PathBuf>>>()?;
    if let Some(missing) = files.iter().find(|file| !file.is_file()) {
        bail!(FfmiddlemanCliError::MissingInput(missing.clone()));
    }
    if let Some(dir) = args.destination_dir.take() {
        args.destination_dir = Some(path_abs::PathAbs::new(dir)?.as_path().to_path_buf());
    }

    let saved = match FieldDefaults::load(config_path) {
        Ok(saved) => saved.unwrap_or_default(),
        Err(e) => {
            warn!("{}, starting from empty defaults", e);
            FieldDefaults::default()
        },
    };
    let (request, _corrections) = merge_fields(saved, &args).into_request(files);

    let default_tools = ToolPaths::default();
    let tools = ToolPaths {
        encoder: args.ffmpeg.take().unwrap_or(default_tools.encoder),
        prober:  args.ffprobe.take().unwrap_or(default_tools.prober),
    }
    .resolve()?;
    debug!("Using {} and {}", tools.encoder.display(), tools.prober.display());

    if !args.no_save {
        FieldDefaults::from_request(&request).save(config_path)?;
    }

    let job_count = request.files.len();
    let progress = MultiProgress::new();
    let (answers_tx, answers_rx) = mpsc::channel();
    let (events_tx, events_rx) = mpsc::channel();
    let mut orchestrator = Orchestrator::new(
        request,
        tools.encoder,
        SystemController::new(),
        FfprobeProbe::new(tools.prober),
        TerminalOperator::new(args.on_collision, answers_rx, progress.clone()),
        events_tx,
    );

    let messages = orchestrator.sender();
    let ctrlc_messages = messages.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_messages.send(QueueMessage::Teardown);
    })?;
    spawn_input_router(messages, answers_tx);

    let display = thread::spawn(move || BatchDisplay::new(progress, job_count).run(events_rx));
    let result = orchestrator.run();
    let finished = orchestrator.queue().status() == QueueStatus::AllDone;
    drop(orchestrator);
    display.join().map_err(|_| anyhow!("Display thread panicked"))?;

    let summary = result?;
    if !finished {
        bail!(FfmiddlemanCliError::Interrupted);
    }
    if summary.failed > 0 {
        bail!(FfmiddlemanCliError::JobsFailed {
            failed: summary.failed,
            total:  summary.total,
        });
    }

    info!("All {} job(s) done", summary.total);
    Ok(())
}

fn set_if_given<T: Clone>(field: &mut Option<T>, value: Option<&T>) {
    if let Some(value) = value {
        *field = Some(value.clone());
    }
}

/// Applies the command line on top of the saved field defaults.
fn merge_fields(mut fields: FieldDefaults, args: &RunArgs) -> FieldDefaults {
    let action = &mut fields.action;

    if args.no_cut {
        action.cut = None;
    }
    if let (Some(from), Some(to)) = (&args.cut_from, &args.cut_to) {
        action.cut = Some(CutRange {
            from: from.clone(),
            to:   to.clone(),
        });
    }

    if args.no_hardsub {
        action.hardsub = None;
    }
    if let Some(extension) = &args.hardsub {
        action.hardsub = Some(Hardsub {
            subfile_extension: extension.clone(),
        });
    }

    if args.no_transcode {
        action.transcode = None;
    }
    let transcode_given = args.transcode
        || [
            &args.codec,
            &args.preset,
            &args.tune,
            &args.crf,
            &args.bitrate,
            &args.bufsize,
        ]
        .iter()
        .any(|value| value.is_some());
    if transcode_given {
        let transcode = action.transcode.get_or_insert_with(Transcode::default);
        set_if_given(&mut transcode.codec, args.codec.as_ref());
        set_if_given(&mut transcode.preset, args.preset.as_ref());
        set_if_given(&mut transcode.tune, args.tune.as_ref());
        set_if_given(&mut transcode.avg_bitrate, args.bitrate.as_ref());
        set_if_given(&mut transcode.bufsize, args.bufsize.as_ref());
        if let Some(crf) = &args.crf {
            transcode.crf = parse_crf(crf);
            if transcode.crf.is_none() {
                warn!("Ignoring non-numeric crf {:?}", crf);
            }
        }
    }

    let naming = &mut fields.naming;
    set_if_given(&mut naming.prefix, args.prefix.as_ref());
    set_if_given(&mut naming.suffix, args.suffix.as_ref());
    set_if_given(&mut naming.format_override, args.format.as_ref());
    set_if_given(&mut naming.destination_dir, args.destination_dir.as_ref());

    set_if_given(&mut fields.extra_args, args.extra_args.as_ref());
    fields
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use ffmiddleman_core::{ActionConfig, NamingConfig};

    use super::*;
    use crate::commands::{Commands, FfmiddlemanCli};

    fn run_args(arguments: &[&str]) -> RunArgs {
        let cli = FfmiddlemanCli::try_parse_from(
            ["ffmiddleman", "run"].iter().chain(arguments).chain(&["clip.mkv"]),
        )
        .expect("arguments parse");
        match cli.command {
            Commands::Run(args) => *args,
            _ => panic!("expected the run command"),
        }
    }

    fn saved() -> FieldDefaults {
        FieldDefaults {
            action:     ActionConfig {
                cut:       Some(CutRange {
                    from: "00:00:05".to_owned(),
                    to:   "00:00:10".to_owned(),
                }),
                hardsub:   Some(Hardsub {
                    subfile_extension: "ass".to_owned(),
                }),
                transcode: Some(Transcode {
                    preset: Some("slow".to_owned()),
                    ..Default::default()
                }),
            },
            naming:     NamingConfig {
                prefix: Some("pre_".to_owned()),
                suffix: Some(".processed".to_owned()),
                ..Default::default()
            },
            extra_args: None,
        }
    }

    #[test]
    fn saved_fields_apply_without_flags() {
        assert_eq!(merge_fields(saved(), &run_args(&[])), saved());
    }

    #[test]
    fn flags_override_single_fields() {
        let merged = merge_fields(
            saved(),
            &run_args(&["--crf", "20", "--suffix", "_x", "--extra-args", "-map 0"]),
        );

        let transcode = merged.action.transcode.expect("transcode is kept");
        assert_eq!(transcode.crf, Some(20));
        assert_eq!(transcode.preset.as_deref(), Some("slow"));
        assert_eq!(merged.naming.prefix.as_deref(), Some("pre_"));
        assert_eq!(merged.naming.suffix.as_deref(), Some("_x"));
        assert_eq!(merged.extra_args.as_deref(), Some("-map 0"));
    }

    #[test]
    fn no_flags_clear_saved_actions() {
        let merged = merge_fields(
            saved(),
            &run_args(&["--no-cut", "--no-hardsub", "--no-transcode"]),
        );

        assert_eq!(merged.action, ActionConfig::default());
    }

    #[test]
    fn transcode_flag_alone_enables_the_default_codec() {
        let merged = merge_fields(FieldDefaults::default(), &run_args(&["--transcode"]));
        let transcode = merged.action.transcode.expect("transcode is enabled");

        assert_eq!(transcode.codec(), "libx265");
        assert_eq!(transcode.crf, None);
    }

    #[test]
    fn non_numeric_crf_is_unset() {
        let merged = merge_fields(FieldDefaults::default(), &run_args(&["--crf", "best"]));

        assert_eq!(merged.action.transcode.and_then(|t| t.crf), None);
    }

    #[test]
    fn cut_needs_both_ends() {
        let parsed = FfmiddlemanCli::try_parse_from([
            "ffmiddleman",
            "run",
            "--cut-from",
            "00:00:01",
            "clip.mkv",
        ]);

        assert!(parsed.is_err());
    }
}
