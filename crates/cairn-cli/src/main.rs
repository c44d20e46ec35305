// CLI for operators: inspect and edit an artifact store by URI

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cairn_core::{ArtifactStore, AsyncArtifactStore, OffloadedStore, ResultStore};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(name = "cairn")]
#[command(about = "Cairn - pluggable artifact storage", long_about = None)]
struct Cli {
    /// Backend store URI (file:///abs/dir, memory://label)
    #[arg(long, env = "CAIRN_BACKEND_STORE_URI", global = true)]
    backend_store_uri: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Commands {
    #[command(flatten)]
    Artifact(ArtifactCommands),

    /// Versioned result documents
    Result {
        #[command(subcommand)]
        command: ResultCommands,
    },
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum ArtifactCommands {
    /// Store an artifact (reads stdin unless --file is given)
    Put {
        id: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Print an artifact (writes stdout unless --output is given)
    Get {
        id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check whether an artifact exists (exit 1 when absent)
    Has { id: String },

    /// Delete an artifact (succeeds when absent)
    Delete { id: String },

    /// List artifact identifiers under a prefix
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum ResultCommands {
    /// Append a new version (JSON from --data or stdin)
    Write {
        model: String,
        version: String,
        result: String,
        #[arg(short, long)]
        data: Option<String>,
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Read one result (latest unless --result-version is given)
    Read {
        model: String,
        version: String,
        result: String,
        #[arg(long)]
        result_version: Option<u64>,
    },

    /// Latest version of every result under a model version
    List {
        model: String,
        version: String,
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Delete one version, one result, or every result under a model version
    Delete {
        model: String,
        version: String,
        result: Option<String>,
        #[arg(long, requires = "result")]
        result_version: Option<u64>,
        #[arg(short, long, conflicts_with = "result")]
        tag: Option<String>,
    },

    /// Models and their versions
    Models,
}

/// コマンドの結果（エラーとは別に、has の「存在しない」を表す）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Absent,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Absent => ExitCode::FAILURE,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// RUST_LOG があればそれを優先
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let uri = cli
        .backend_store_uri
        .context("--backend-store-uri (or CAIRN_BACKEND_STORE_URI) is required")?;

    let store = tokio::task::spawn_blocking(move || ArtifactStore::open(&uri))
        .await?
        .context("failed to open artifact store")?;
    let store = Arc::new(store);
    debug!(backend = store.describe(), "opened");

    run_and_close(store, cli.command, &mut std::io::stdout()).await
}

/// コマンドを実行し、成否にかかわらずストアを閉じる（コマンドのエラーを優先して返す）
async fn run_and_close<W: Write + Send>(
    store: Arc<ArtifactStore>,
    command: Commands,
    out: &mut W,
) -> anyhow::Result<Outcome> {
    let outcome = execute(&store, command, out).await;
    let closed = tokio::task::spawn_blocking(move || store.close()).await;
    let outcome = outcome?;
    closed?.context("failed to close artifact store")?;
    Ok(outcome)
}

async fn execute<W: Write + Send>(
    store: &Arc<ArtifactStore>,
    command: Commands,
    out: &mut W,
) -> anyhow::Result<Outcome> {
    match command {
        Commands::Result { command } => {
            run_result(ResultStore::new(store.clone()), command, out).await
        }
        Commands::Artifact(command) => {
            run_artifact(&OffloadedStore::new(store.clone()), command, out).await
        }
    }
}

async fn run_artifact<W: Write + Send>(
    store: &OffloadedStore,
    command: ArtifactCommands,
    out: &mut W,
) -> anyhow::Result<Outcome> {
    match command {
        ArtifactCommands::Put { id, file } => {
            let data = match file {
                Some(path) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };
            store.put(&id, data).await?;
        }
        ArtifactCommands::Get { id, output } => {
            let data = store.get(&id).await?;
            match output {
                Some(path) => tokio::fs::write(&path, &data)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => {
                    out.write_all(&data)?;
                    out.flush()?;
                }
            }
        }
        ArtifactCommands::Has { id } => {
            let exists = store.has(&id).await?;
            writeln!(out, "{exists}")?;
            if !exists {
                return Ok(Outcome::Absent);
            }
        }
        ArtifactCommands::Delete { id } => store.delete(&id).await?,
        ArtifactCommands::List { prefix } => {
            for id in store.list(&prefix).await? {
                writeln!(out, "{id}")?;
            }
        }
    }
    Ok(Outcome::Success)
}

async fn run_result<W: Write + Send>(
    results: ResultStore,
    command: ResultCommands,
    out: &mut W,
) -> anyhow::Result<Outcome> {
    let data = match &command {
        ResultCommands::Write { data: None, .. } => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            Some(buf)
        }
        ResultCommands::Write { data, .. } => data.clone(),
        _ => None,
    };

    // ResultStore は同期 API なので blocking pool で実行
    let output = tokio::task::spawn_blocking(move || apply_result(&results, command, data)).await??;

    if let Some(value) = output {
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    }
    Ok(Outcome::Success)
}

fn apply_result(
    results: &ResultStore,
    command: ResultCommands,
    data: Option<String>,
) -> anyhow::Result<Option<serde_json::Value>> {
    let value = match command {
        ResultCommands::Write {
            model,
            version,
            result,
            tag,
            ..
        } => {
            let raw = data.unwrap_or_default();
            let data: serde_json::Value =
                serde_json::from_str(&raw).context("result data is not valid JSON")?;
            let written = results.write_result(&model, &version, &result, data, tag.as_deref())?;
            serde_json::json!({ "version": written })
        }
        ResultCommands::Read {
            model,
            version,
            result,
            result_version,
        } => serde_json::to_value(results.read_result(&model, &version, &result, result_version)?)?,
        ResultCommands::List { model, version, tag } => {
            serde_json::to_value(results.read_results(&model, &version, tag.as_deref())?)?
        }
        ResultCommands::Delete {
            model,
            version,
            result,
            result_version,
            tag,
        } => {
            match (result, result_version) {
                (Some(result), Some(v)) => {
                    results.delete_result_version(&model, &version, &result, v)?
                }
                (Some(result), None) => results.delete_result(&model, &version, &result)?,
                (None, _) => {
                    let deleted = results.delete_results(&model, &version, tag.as_deref())?;
                    return Ok(Some(serde_json::json!({ "deleted": deleted })));
                }
            }
            return Ok(None);
        }
        ResultCommands::Models => serde_json::to_value(results.models()?)?,
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::StoreState;
    use clap::CommandFactory;
    use rstest::rstest;
    use serde_json::json;

    fn parse(args: &[&str]) -> Commands {
        let argv = std::iter::once("cairn").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().command
    }

    fn memory_store() -> Arc<ArtifactStore> {
        Arc::new(ArtifactStore::open("memory://cli").unwrap())
    }

    async fn exec(store: &Arc<ArtifactStore>, args: &[&str]) -> (anyhow::Result<Outcome>, String) {
        let mut out = Vec::new();
        let outcome = execute(store, parse(args), &mut out).await;
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "cairn",
            "has",
            "a/b",
            "--backend-store-uri",
            "memory://x",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.backend_store_uri.as_deref(), Some("memory://x"));
        assert!(cli.verbose);
        assert_eq!(
            cli.command,
            Commands::Artifact(ArtifactCommands::Has { id: "a/b".into() })
        );
    }

    #[rstest]
    #[case(&["result", "delete", "m", "v", "r", "--result-version", "1"], Some("r"), Some(1), None)]
    #[case(&["result", "delete", "m", "v", "r"], Some("r"), None, None)]
    #[case(&["result", "delete", "m", "v", "--tag", "t0"], None, None, Some("t0"))]
    #[case(&["result", "delete", "m", "v"], None, None, None)]
    fn result_delete_arguments(
        #[case] args: &[&str],
        #[case] expected_result: Option<&str>,
        #[case] expected_version: Option<u64>,
        #[case] expected_tag: Option<&str>,
    ) {
        let Commands::Result {
            command:
                ResultCommands::Delete {
                    result,
                    result_version,
                    tag,
                    ..
                },
        } = parse(args)
        else {
            panic!("expected result delete");
        };
        assert_eq!(result.as_deref(), expected_result);
        assert_eq!(result_version, expected_version);
        assert_eq!(tag.as_deref(), expected_tag);
    }

    #[rstest]
    #[case(&["result", "delete", "m", "v", "--result-version", "1"])]
    #[case(&["result", "delete", "m", "v", "r", "--tag", "t0"])]
    #[case(&["put"])]
    fn conflicting_or_missing_arguments_are_rejected(#[case] args: &[&str]) {
        let argv = std::iter::once("cairn").chain(args.iter().copied());
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[tokio::test]
    async fn has_reports_presence_and_absence() {
        let store = memory_store();
        store.put("a/b.bin", b"x").unwrap();

        let (outcome, out) = exec(&store, &["has", "a/b.bin"]).await;
        assert_eq!(outcome.unwrap(), Outcome::Success);
        assert_eq!(out, "true\n");

        let (outcome, out) = exec(&store, &["has", "a/missing.bin"]).await;
        assert_eq!(outcome.unwrap(), Outcome::Absent);
        assert_eq!(out, "false\n");
    }

    #[tokio::test]
    async fn get_list_and_delete_artifacts() {
        let store = memory_store();
        store.put("a/b.bin", b"payload").unwrap();
        store.put("a/c.bin", b"other").unwrap();

        let (outcome, out) = exec(&store, &["get", "a/b.bin"]).await;
        assert_eq!(outcome.unwrap(), Outcome::Success);
        assert_eq!(out, "payload");

        let (_, out) = exec(&store, &["list", "a/"]).await;
        assert_eq!(out, "a/b.bin\na/c.bin\n");

        exec(&store, &["delete", "a/b.bin"]).await.0.unwrap();
        exec(&store, &["delete", "a/b.bin"]).await.0.unwrap();
        assert!(!store.has("a/b.bin").unwrap());
    }

    #[tokio::test]
    async fn failing_command_still_closes_the_store() {
        let store = memory_store();
        let mut out = Vec::new();
        let err = run_and_close(store.clone(), parse(&["get", "missing"]), &mut out)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"), "{err}");
        assert_eq!(store.state(), StoreState::Closed);
    }

    #[tokio::test]
    async fn successful_command_closes_the_store() {
        let store = memory_store();
        let mut out = Vec::new();
        let outcome = run_and_close(store.clone(), parse(&["list"]), &mut out)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(store.state(), StoreState::Closed);
    }

    #[tokio::test]
    async fn result_delete_dispatches_on_arguments() {
        let store = memory_store();
        for (result, tag) in [("r0", "t0"), ("r0", "t0"), ("r1", "t1"), ("r2", "t0")] {
            let (outcome, _) = exec(
                &store,
                &["result", "write", "m", "v", result, "--data", "{}", "--tag", tag],
            )
            .await;
            outcome.unwrap();
        }

        // 1 バージョンだけ消す
        exec(&store, &["result", "delete", "m", "v", "r0", "--result-version", "1"])
            .await
            .0
            .unwrap();
        let (_, out) = exec(&store, &["result", "read", "m", "v", "r0"]).await;
        let record: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(record["version"], json!(0));

        // タグ付きの result をまとめて消す
        let (_, out) = exec(&store, &["result", "delete", "m", "v", "--tag", "t0"]).await;
        let deleted: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(deleted, json!({ "deleted": 2 }));

        // result を丸ごと消す
        exec(&store, &["result", "delete", "m", "v", "r1"]).await.0.unwrap();
        let (outcome, _) = exec(&store, &["result", "read", "m", "v", "r1"]).await;
        assert!(outcome.is_err());

        let (_, out) = exec(&store, &["result", "list", "m", "v"]).await;
        assert_eq!(serde_json::from_str::<serde_json::Value>(&out).unwrap(), json!([]));
    }

    #[tokio::test]
    async fn result_write_rejects_invalid_json() {
        let store = memory_store();
        let (outcome, _) = exec(&store, &["result", "write", "m", "v", "r", "--data", "{oops"]).await;
        let err = outcome.unwrap_err();
        assert!(err.to_string().contains("not valid JSON"), "{err}");
    }
}
