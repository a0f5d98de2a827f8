//! CLI command definitions and dispatch for the `statelang` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod inspect;
pub mod run;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

/// Validate and run state machine definitions.
#[derive(Parser)]
#[command(name = "statelang", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress status output; only command results and errors are printed.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans as OpenTelemetry JSON on stdout. Not combinable with
    /// `--json`, which also writes to stdout.
    #[arg(long, global = true, conflicts_with = "json")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a definition file (JSON or YAML).
    Validate {
        /// Path to the definition.
        file: PathBuf,
    },

    /// Run a definition and print its output.
    Run {
        /// Path to the definition.
        file: PathBuf,

        /// Execution input as inline JSON.
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read the execution input from a JSON file.
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Execution id (defaults to a fresh UUIDv7).
        #[arg(long)]
        execution_id: Option<String>,

        /// Engine configuration (TOML).
        #[arg(long, env = "STATELANG_CONFIG")]
        config: Option<PathBuf>,

        /// Static task result, as RESOURCE=JSON. Repeatable.
        #[arg(long = "stub", value_parser = parse_stub)]
        stubs: Vec<(String, Value)>,
    },

    /// Evaluate a path expression against an input document.
    Path {
        /// Path expression, e.g. `$.items[0:2]`.
        expr: String,

        /// Input document as inline JSON.
        #[arg(long, default_value = "{}")]
        input: String,
    },

    /// Evaluate an intrinsic call against an input document.
    Eval {
        /// Intrinsic call, e.g. `States.Format('{}', $.name)`.
        call: String,

        /// Input document as inline JSON.
        #[arg(long, default_value = "{}")]
        input: String,
    },
}

/// Parse `RESOURCE=JSON` for `--stub`.
///
/// Splits on the first `=`; the right side must be valid JSON.
pub fn parse_stub(s: &str) -> Result<(String, Value), String> {
    let (resource, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected RESOURCE=JSON, got '{s}'"))?;
    if resource.is_empty() {
        return Err("resource name must not be empty".to_string());
    }
    let value = serde_json::from_str(raw)
        .map_err(|e| format!("invalid JSON for stub '{resource}': {e}"))?;
    Ok((resource.to_string(), value))
}

/// Parse an inline JSON argument.
pub fn parse_json_arg(flag: &str, raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("--{flag} is not valid JSON: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_validate() {
        let cli = Cli::try_parse_from(["statelang", "validate", "machine.json"]).unwrap();
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        match cli.command {
            Commands::Validate { file } => assert_eq!(file, PathBuf::from("machine.json")),
            _ => panic!("expected validate"),
        }
    }

    #[test]
    fn test_parse_run_with_stubs() {
        let cli = Cli::try_parse_from([
            "statelang",
            "-vv",
            "--json",
            "run",
            "flow.yaml",
            "--input",
            r#"{"a":1}"#,
            "--execution-id",
            "exec-1",
            "--stub",
            "arn:charge={\"ok\":true}",
            "--stub",
            "lookup=[1,2]",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                file,
                input,
                input_file,
                execution_id,
                stubs,
                ..
            } => {
                assert_eq!(file, PathBuf::from("flow.yaml"));
                assert_eq!(input.as_deref(), Some(r#"{"a":1}"#));
                assert!(input_file.is_none());
                assert_eq!(execution_id.as_deref(), Some("exec-1"));
                assert_eq!(
                    stubs,
                    vec![
                        ("arn:charge".to_string(), json!({ "ok": true })),
                        ("lookup".to_string(), json!([1, 2])),
                    ]
                );
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_input_and_input_file_conflict() {
        let result = Cli::try_parse_from([
            "statelang",
            "run",
            "flow.json",
            "--input",
            "{}",
            "--input-file",
            "in.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_short_quiet_flag() {
        let cli = Cli::try_parse_from(["statelang", "-q", "validate", "m.json"]).unwrap();
        assert!(cli.quiet);
        let cli = Cli::try_parse_from(["statelang", "validate", "m.json", "-q"]).unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn test_otel_conflicts_with_json() {
        assert!(Cli::try_parse_from(["statelang", "--otel", "--json", "validate", "m.json"]).is_err());
        let cli = Cli::try_parse_from(["statelang", "--otel", "validate", "m.json"]).unwrap();
        assert!(cli.otel);
    }

    #[test]
    fn test_bad_stub_is_rejected() {
        let result = Cli::try_parse_from(["statelang", "run", "flow.json", "--stub", "noequals"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_path_defaults_input() {
        let cli = Cli::try_parse_from(["statelang", "path", "$.a", "--quiet"]).unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::Path { expr, input } => {
                assert_eq!(expr, "$.a");
                assert_eq!(input, "{}");
            }
            _ => panic!("expected path"),
        }
    }

    #[test]
    fn test_parse_stub() {
        assert_eq!(parse_stub("a=1").unwrap(), ("a".to_string(), json!(1)));
        assert!(parse_stub("k=v={\"x\":1}").is_err());
        assert_eq!(
            parse_stub("res={\"x\":\"a=b\"}").unwrap(),
            ("res".to_string(), json!({ "x": "a=b" }))
        );
        assert!(parse_stub("=1").is_err());
        assert!(parse_stub("a=nope").is_err());
    }

    #[test]
    fn test_parse_json_arg() {
        assert_eq!(parse_json_arg("input", r#"{"a":[1]}"#).unwrap(), json!({ "a": [1] }));
        let err = parse_json_arg("input", "{").unwrap_err();
        assert!(err.to_string().starts_with("--input is not valid JSON"));
    }
}
