use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliOptions {
    pub scenario_path: PathBuf,
    pub realtime: bool,
    pub transcript_path: Option<PathBuf>,
    pub quiet_snapshots: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    Run(CliOptions),
    Help,
}

pub(crate) fn parse_args(args: &[String]) -> Result<CliCommand, String> {
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        return Ok(CliCommand::Help);
    }

    let mut realtime = false;
    let mut transcript_path = None;
    let mut quiet_snapshots = false;
    let mut scenario_path = None;
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--realtime" => {
                realtime = true;
                index += 1;
            }
            "--quiet-snapshots" => {
                quiet_snapshots = true;
                index += 1;
            }
            "--transcript" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --transcript".to_string())?;
                transcript_path = Some(PathBuf::from(value));
                index += 2;
            }
            flag if flag.starts_with("--") => {
                return Err(format!("unknown option '{flag}'\n{}", usage_text()));
            }
            path => {
                if scenario_path.is_some() {
                    return Err(format!("unexpected argument '{path}'"));
                }
                scenario_path = Some(PathBuf::from(path));
                index += 1;
            }
        }
    }

    let scenario_path = scenario_path.ok_or_else(|| "missing scenario path".to_string())?;
    Ok(CliCommand::Run(CliOptions {
        scenario_path,
        realtime,
        transcript_path,
        quiet_snapshots,
    }))
}

pub(crate) fn usage_text() -> String {
    "usage: capture_server [--realtime] [--transcript <path>] [--quiet-snapshots] <scenario.json>\n\
     \n\
     Runs a scripted capture point match and prints published zone snapshots\n\
     as JSON lines, followed by the final ownership of every zone.\n\
     \n\
     environment:\n\
     \x20 CAPTURE_TPS          simulation ticks per second (default 60)\n\
     \x20 CAPTURE_PUBLISH_HZ   max snapshot publishes per zone per second (default 10)\n\
     \x20 RUST_LOG             log filter (default info)"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_flags_in_any_order() {
        let command = parse_args(&args(&[
            "--transcript",
            "out/match.json",
            "scenario.json",
            "--realtime",
        ]))
        .expect("valid args");

        assert_eq!(
            command,
            CliCommand::Run(CliOptions {
                scenario_path: PathBuf::from("scenario.json"),
                realtime: true,
                transcript_path: Some(PathBuf::from("out/match.json")),
                quiet_snapshots: false,
            })
        );
    }

    #[test]
    fn help_flag_short_circuits() {
        assert_eq!(parse_args(&args(&["--help"])), Ok(CliCommand::Help));
        assert_eq!(parse_args(&args(&["-h", "x.json"])), Ok(CliCommand::Help));
    }

    #[test]
    fn empty_args_print_usage() {
        let error = parse_args(&[]).expect_err("usage");
        assert!(error.starts_with("usage: capture_server"));
    }

    #[test]
    fn rejects_missing_and_extra_values() {
        assert_eq!(
            parse_args(&args(&["scenario.json", "--transcript"])),
            Err("missing value for --transcript".to_string())
        );
        assert_eq!(
            parse_args(&args(&["--quiet-snapshots"])),
            Err("missing scenario path".to_string())
        );
        assert_eq!(
            parse_args(&args(&["a.json", "b.json"])),
            Err("unexpected argument 'b.json'".to_string())
        );
        assert!(parse_args(&args(&["--fast", "a.json"]))
            .expect_err("unknown flag")
            .starts_with("unknown option '--fast'"));
    }
}
