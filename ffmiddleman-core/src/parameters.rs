use std::{iter, path::Path};

use crate::{
    cli_parameter::CLIParameter,
    config::{ActionConfig, NamingConfig},
    naming::{destination_dir, destination_path, subtitle_name},
};

/// Characters with a meaning inside an ffmpeg filtergraph.
const OPTION_SPECIAL_CHARS: [char; 3] = ['\\', '\'', ':'];
const GRAPH_SPECIAL_CHARS: [char; 6] = ['\\', '\'', '[', ']', ',', ';'];

/// Builds the argument vector for one source file.
///
/// Files are referenced by basename as the tool runs inside the source's
/// directory. The destination is a bare name unless it goes to another
/// directory, in which case the full path is used.
#[inline]
pub fn compile_arguments(
    source: &Path,
    action: &ActionConfig,
    naming: &NamingConfig,
    extra_args: Option<&str>,
) -> Vec<String> {
    let mut parameters = Vec::new();

    parameters.push(CLIParameter::new_string("i", &file_name(source)));

    if let Some(cut) = &action.cut {
        parameters.push(CLIParameter::new_string("ss", &cut.from));
        parameters.push(CLIParameter::new_string("to", &cut.to));
    }

    if let Some(hardsub) = &action.hardsub {
        let subtitles = subtitle_name(source, hardsub.subfile_extension.trim());
        parameters.push(CLIParameter::new_string(
            "vf",
            &format!("subtitles={}", escape_filter_value(&subtitles)),
        ));
    }

    if let Some(transcode) = &action.transcode {
        parameters.push(CLIParameter::new_string("c:v", transcode.codec()));
        parameters.extend(
            [
                CLIParameter::new_optional_string("preset", transcode.preset.as_deref()),
                CLIParameter::new_optional_string("tune", transcode.tune.as_deref()),
                transcode.crf.map(|crf| CLIParameter::new_number("crf", f64::from(crf))),
                CLIParameter::new_optional_string("b:v", transcode.avg_bitrate.as_deref()),
                CLIParameter::new_optional_string("bufsize", transcode.bufsize.as_deref()),
            ]
            .into_iter()
            .flatten(),
        );
    }

    let mut arguments = Vec::with_capacity(parameters.len() * 2 + 2);
    for parameter in &parameters {
        parameter.push_to(&mut arguments);
    }

    if let Some(extra_args) = extra_args {
        arguments.extend(extra_args.split_whitespace().map(str::to_owned));
    }

    CLIParameter::new_bool("y").push_to(&mut arguments);

    let destination = destination_path(source, naming);
    if source.parent() == Some(destination_dir(source, naming)) {
        arguments.push(file_name(&destination));
    } else {
        arguments.push(destination.to_string_lossy().into_owned());
    }

    arguments
}

/// Equivalent shell command line, for display only.
#[inline]
pub fn command_line(program: &str, arguments: &[String]) -> String {
    let words = iter::once(program).chain(arguments.iter().map(String::as_str));
    shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

fn escape_chars(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A `-vf` option value is unescaped twice: once by the filtergraph parser,
/// then once by the filter's option parser.
fn escape_filter_value(value: &str) -> String {
    escape_chars(&escape_chars(value, &OPTION_SPECIAL_CHARS), &GRAPH_SPECIAL_CHARS)
}
