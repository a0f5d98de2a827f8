//! `statelang run`: execute a definition with stubbed task results.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use console::style;
use serde_json::Value;

use statelang_core::workflow::definition::load_state_machine_file;
use statelang_core::workflow::executor::{ExecutionResult, RunStatus, StateMachineExecutor};
use statelang_core::workflow::resolver::{ResolverRegistry, StaticResolver};
use statelang_types::config::EngineConfig;

use super::parse_json_arg;

/// Arguments of `statelang run`, detached from clap.
pub struct RunArgs {
    pub file: PathBuf,
    pub input: Option<String>,
    pub input_file: Option<PathBuf>,
    pub execution_id: Option<String>,
    pub config: Option<PathBuf>,
    pub stubs: Vec<(String, Value)>,
}

/// Load an [`EngineConfig`] from a TOML file, or defaults when absent.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: EngineConfig =
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))?;
    if !(config.time_scale >= 0.0 && config.time_scale.is_finite()) {
        bail!("time_scale must be a non-negative number, got {}", config.time_scale);
    }
    tracing::debug!(path = %path.display(), ?config, "loaded engine config");
    Ok(config)
}

fn read_input(args: &RunArgs) -> Result<Value> {
    if let Some(path) = &args.input_file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input {}", path.display()))?;
        return serde_json::from_str(&raw)
            .with_context(|| format!("input file {} is not valid JSON", path.display()));
    }
    match &args.input {
        Some(raw) => parse_json_arg("input", raw),
        None => Ok(serde_json::json!({})),
    }
}

fn build_registry(stubs: &[(String, Value)]) -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();
    for (resource, value) in stubs {
        registry.register(resource.as_str(), StaticResolver(value.clone()));
    }
    registry
}

/// Run the definition and print the final output.
pub async fn run(args: RunArgs, json: bool, quiet: bool) -> Result<()> {
    let result = execute(&args).await?;
    report(
        &result,
        json,
        quiet,
        &mut std::io::stdout().lock(),
        &mut std::io::stderr().lock(),
    )
}

async fn execute(args: &RunArgs) -> Result<ExecutionResult> {
    let sm = load_state_machine_file(&args.file)
        .with_context(|| format!("invalid definition: {}", args.file.display()))?;
    let config = load_config(args.config.as_deref())?;
    let input = read_input(args)?;
    let registry = build_registry(&args.stubs);

    let executor = StateMachineExecutor::new(Arc::new(sm), registry, config);
    let result = match &args.execution_id {
        Some(id) => executor.execute_detailed(id, input).await,
        None => executor.start(input).await,
    };

    result.map_err(|e| anyhow!("execution failed ({}): {e}", e.error_name()))
}

/// Write the run result. The output document goes to `out`; the status
/// line goes to `status` unless `quiet`.
pub fn report(
    result: &ExecutionResult,
    json: bool,
    quiet: bool,
    out: &mut impl Write,
    status: &mut impl Write,
) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(result)?)?;
        return Ok(());
    }

    if !quiet {
        writeln!(
            status,
            "  {} {} ({} transitions: {})",
            style("✓").green().bold(),
            style(&result.execution_id).cyan(),
            result.transitions.len(),
            result.transitions.join(" → ")
        )?;
    }
    writeln!(out, "{}", serde_json::to_string_pretty(&result.output)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statelang_types::config::UnresolvedTaskPolicy;
    use std::io::Write;

    fn args(file: &Path) -> RunArgs {
        RunArgs {
            file: file.to_path_buf(),
            input: None,
            input_file: None,
            execution_id: None,
            config: None,
            stubs: Vec::new(),
        }
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.time_scale, 1.0);
        assert_eq!(config.unresolved_task, UnresolvedTaskPolicy::PassThrough);
    }

    #[test]
    fn test_load_config_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "time_scale = 0.0\nunresolved_task = \"fail\"\n\n[retry]\nmax_attempts = 5"
        )
        .unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.time_scale, 0.0);
        assert_eq!(config.unresolved_task, UnresolvedTaskPolicy::Fail);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_rate, 2.0);
    }

    #[test]
    fn test_load_config_rejects_negative_time_scale() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time_scale = -1.0").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_read_input_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.json");
        std::fs::write(&path, r#"{"from":"file"}"#).unwrap();

        let mut a = args(Path::new("unused.json"));
        assert_eq!(read_input(&a).unwrap(), json!({}));

        a.input = Some(r#"{"from":"flag"}"#.to_string());
        assert_eq!(read_input(&a).unwrap(), json!({ "from": "flag" }));

        a.input = None;
        a.input_file = Some(path);
        assert_eq!(read_input(&a).unwrap(), json!({ "from": "file" }));
    }

    fn finished() -> ExecutionResult {
        ExecutionResult {
            execution_id: "exec-1".to_string(),
            output: json!({ "done": true }),
            transitions: vec!["a".to_string(), "b".to_string()],
            status: RunStatus::Terminated,
        }
    }

    #[test]
    fn test_report_prints_status_line_and_output() {
        let (mut out, mut status) = (Vec::new(), Vec::new());
        report(&finished(), false, false, &mut out, &mut status).unwrap();

        let output: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(output, json!({ "done": true }));
        let status = String::from_utf8(status).unwrap();
        assert!(status.contains("exec-1"));
        assert!(status.contains("a → b"));
    }

    #[test]
    fn test_report_quiet_keeps_only_output() {
        let (mut out, mut status) = (Vec::new(), Vec::new());
        report(&finished(), false, true, &mut out, &mut status).unwrap();

        assert!(status.is_empty());
        let output: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(output, json!({ "done": true }));
    }

    #[test]
    fn test_report_json_writes_full_result() {
        let (mut out, mut status) = (Vec::new(), Vec::new());
        report(&finished(), true, false, &mut out, &mut status).unwrap();

        assert!(status.is_empty());
        let result: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(result["execution_id"], json!("exec-1"));
        assert_eq!(result["transitions"], json!(["a", "b"]));
        assert_eq!(result["status"], json!("Terminated"));
    }

    #[tokio::test]
    async fn test_registry_serves_stubs() {
        let registry = build_registry(&[("charge".to_string(), json!({ "ok": true }))]);
        let resolver = registry.get("charge").unwrap();
        assert_eq!(resolver.invoke_boxed(json!(null)).await.unwrap(), json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("flow.json");
        std::fs::write(
            &file,
            r#"{"StartAt":"t","States":{"t":{"Type":"Task","Resource":"charge","ResultPath":"$.r","End":true}}}"#,
        )
        .unwrap();

        let mut a = args(&file);
        a.input = Some(r#"{"a":1}"#.to_string());
        a.stubs = vec![("charge".to_string(), json!("ok"))];
        let result = execute(&a).await.unwrap();
        assert_eq!(result.output, json!({ "a": 1, "r": "ok" }));
        assert_eq!(result.transitions, vec!["t"]);
        assert_eq!(result.status, RunStatus::Terminated);
    }

    #[tokio::test]
    async fn test_run_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("flow.json");
        std::fs::write(
            &file,
            r#"{"StartAt":"f","States":{"f":{"Type":"Fail","Error":"Nope"}}}"#,
        )
        .unwrap();

        let err = run(args(&file), false, false).await.unwrap_err();
        assert!(err.to_string().contains("(Nope)"));
    }
}
