use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

mod config;
mod display;
mod download;
mod extract;
mod filename;
mod generate;
mod locator;
mod pipeline;
mod relay;
mod status;

use config::{render_settings, ConfigStore, Settings, SettingsReason, SettingsUpdate};
use download::DirectoryDownloader;
use extract::{ExtractionWorker, PdfExtractLoader};
use generate::{GeminiClient, DEFAULT_MODEL};
use pipeline::{Orchestrator, RunOutcome};
use status::{Status, StatusReporter};

const EXIT_FAILURE: i32 = 1;
const EXIT_NEEDS_CONFIGURATION: i32 = 2;

fn cli() -> Command {
    Command::new("pdfnamer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Rename a PDF paper to Author_Year_Title.pdf using a generative model")
        .long_about(
            "Extracts the text of the first pages of a PDF, asks Gemini for a filename\n\
            of the form Surname[_Surname]_Year_Title.pdf and saves the PDF under it.\n\
            \n\
            Run `pdfnamer config set --key <KEY>` once before the first rename.",
        )
        .subcommand_required(true)
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .global(true)
                .help("Only log errors")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .env("PDFNAMER_CONFIG")
                .global(true)
                .help("Settings file (default: <config dir>/pdfnamer/settings.json)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("api-key")
                .long("api-key")
                .value_name("KEY")
                .env("GEMINI_API_KEY")
                .hide_env_values(true)
                .global(true)
                .help("Gemini API key, overriding the stored one"),
        )
        .subcommand(
            Command::new("rename")
                .about("Extract, generate a filename and save the PDF under it")
                .arg(
                    Arg::new("locator")
                        .value_name("URL_OR_PATH")
                        .required(true)
                        .help("http(s):// or file:// URL, or a local path"),
                )
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .short('o')
                        .value_name("DIR")
                        .default_value(".")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Directory the renamed PDF is saved to"),
                )
                .arg(
                    Arg::new("model")
                        .long("model")
                        .value_name("NAME")
                        .default_value(DEFAULT_MODEL)
                        .help("Gemini model name"),
                )
                .arg(
                    Arg::new("endpoint")
                        .long("endpoint")
                        .value_name("URL")
                        .conflicts_with("model")
                        .help("Full generateContent endpoint URL"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Show or change the stored settings")
                .subcommand_required(true)
                .subcommand(
                    Command::new("show").about("Show the current settings").arg(
                        Arg::new("reason")
                            .long("reason")
                            .value_name("REASON")
                            .value_parser(["no_api_key"])
                            .help("Why the settings are being shown"),
                    ),
                )
                .subcommand(
                    Command::new("set")
                        .about("Validate and store settings")
                        .arg(
                            Arg::new("key")
                                .long("key")
                                .value_name("KEY")
                                .help("API key to store"),
                        )
                        .arg(
                            Arg::new("prompt")
                                .long("prompt")
                                .value_name("TEXT")
                                .conflicts_with("prompt-file")
                                .help("Prompt template; an empty value restores the default"),
                        )
                        .arg(
                            Arg::new("prompt-file")
                                .long("prompt-file")
                                .value_name("PATH")
                                .value_parser(clap::value_parser!(PathBuf))
                                .help("Read the prompt template from a file"),
                        )
                        .arg(
                            Arg::new("pages")
                                .long("pages")
                                .value_name("N")
                                .value_parser(clap::value_parser!(u32))
                                .help("Number of PDF pages to read (1 or more)"),
                        ),
                )
                .subcommand(
                    Command::new("reset-prompt").about("Restore the built-in prompt template"),
                ),
        )
        .subcommand(
            Command::new("worker")
                .about("Run the extraction worker on stdin/stdout (JSON lines)"),
        )
}

fn init_tracing(quiet: bool) {
    // stdout is reserved for the worker protocol and command output
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn config_store(matches: &ArgMatches) -> Result<ConfigStore> {
    let path = match matches.get_one::<PathBuf>("config") {
        Some(path) => path.clone(),
        None => ConfigStore::default_path()?,
    };
    debug!(path = %path.display(), "Using settings file");
    Ok(ConfigStore::new(path))
}

/// Logs status events the way a toolbar badge would show them. The task ends
/// after the first final status (done, error or cleared) it logs.
fn spawn_status_renderer(status: &StatusReporter) -> JoinHandle<()> {
    let mut events = status.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.status {
                Status::Busy => info!(run_id = %event.run_id, badge = event.status.badge(), "Working"),
                Status::Success => info!(run_id = %event.run_id, badge = event.status.badge(), "Done"),
                Status::Error => warn!(run_id = %event.run_id, badge = event.status.badge(), "Failed"),
                Status::Cleared => debug!(run_id = %event.run_id, "Badge cleared"),
            }
            if event.status != Status::Busy {
                break;
            }
        }
    })
}

async fn run_rename(matches: &ArgMatches, sub: &ArgMatches) -> Result<i32> {
    let store = config_store(matches)?;
    let api_key_override = matches.get_one::<String>("api-key").cloned();

    match &api_key_override {
        Some(_) => info!("Using API key from command line or environment"),
        None => debug!("Using stored API key, if any"),
    }

    let generator = match sub.get_one::<String>("endpoint") {
        Some(endpoint) => GeminiClient::with_endpoint(endpoint.clone()),
        None => {
            let model = sub
                .get_one::<String>("model")
                .map(String::as_str)
                .unwrap_or(DEFAULT_MODEL);
            GeminiClient::with_model(model)
        }
    }
    .context("failed to create the generation client")?;

    let output_dir = sub
        .get_one::<PathBuf>("output-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let status = StatusReporter::new();
    let renderer = spawn_status_renderer(&status);

    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(PdfExtractLoader::new()),
        Arc::new(generator),
        Arc::new(DirectoryDownloader::new(output_dir)),
    )
    .with_api_key_override(api_key_override.clone())
    .with_status(status);

    let locator = sub.get_one::<String>("locator").map(String::as_str);
    let outcome = orchestrator.trigger(locator).await;

    // The final status is already queued; wait until it has been logged.
    match outcome {
        RunOutcome::Aborted => renderer.abort(),
        _ => {
            let _ = renderer.await;
        }
    }

    let code = match outcome {
        RunOutcome::Completed { saved_to, .. } => {
            println!("{}", saved_to.display());
            0
        }
        RunOutcome::NeedsConfiguration(reason) => {
            let resolved = store.load()?.resolve(api_key_override.as_deref());
            eprint!("{}", render_settings(&resolved, store.path(), Some(reason)));
            EXIT_NEEDS_CONFIGURATION
        }
        RunOutcome::Failed(_) | RunOutcome::Aborted => EXIT_FAILURE,
    };
    Ok(code)
}

fn run_config(matches: &ArgMatches, sub: &ArgMatches) -> Result<i32> {
    let store = config_store(matches)?;
    let current = store.load()?;

    match sub.subcommand() {
        Some(("show", show)) => {
            let reason = show
                .get_one::<String>("reason")
                .and_then(|r| SettingsReason::parse(r));
            let resolved = current.resolve(matches.get_one::<String>("api-key").map(String::as_str));
            print!("{}", render_settings(&resolved, store.path(), reason));
        }
        Some(("set", set)) => {
            let system_prompt = match set.get_one::<PathBuf>("prompt-file") {
                Some(path) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                ),
                None => set.get_one::<String>("prompt").cloned(),
            };
            let update = SettingsUpdate {
                api_key: set.get_one::<String>("key").cloned(),
                system_prompt,
                page_count: set.get_one::<u32>("pages").copied(),
            };

            let updated = match update.apply(&current) {
                Ok(settings) => settings,
                Err(e) => {
                    eprintln!("{}", e);
                    return Ok(EXIT_FAILURE);
                }
            };
            store.save(&updated)?;
            info!(path = %store.path().display(), "Settings saved");
        }
        Some(("reset-prompt", _)) => {
            let updated = Settings {
                system_prompt: None,
                ..current
            };
            store.save(&updated)?;
            info!("Prompt template restored to the default");
        }
        _ => unreachable!("subcommand_required"),
    }
    Ok(0)
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("quiet"));

    let result = match matches.subcommand() {
        Some(("rename", sub)) => run_rename(&matches, sub).await,
        Some(("config", sub)) => run_config(&matches, sub),
        Some(("worker", _)) => {
            let worker = ExtractionWorker::new(Arc::new(PdfExtractLoader::new()));
            worker.serve_stdio().await.map(|_| 0)
        }
        _ => unreachable!("subcommand_required"),
    };

    match result {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            process::exit(EXIT_FAILURE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn parses_rename_with_global_flags() {
        let matches = cli()
            .try_get_matches_from([
                "pdfnamer",
                "rename",
                "https://example.org/a.pdf",
                "-o",
                "/tmp/out",
                "--quiet",
            ])
            .unwrap();
        assert!(matches.get_flag("quiet"));
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "rename");
        assert_eq!(
            sub.get_one::<PathBuf>("output-dir"),
            Some(&PathBuf::from("/tmp/out"))
        );
        assert_eq!(sub.get_one::<String>("model").map(String::as_str), Some(DEFAULT_MODEL));
    }

    #[tokio::test(start_paused = true)]
    async fn status_renderer_finishes_after_the_final_status() {
        let status = StatusReporter::new();
        let renderer = spawn_status_renderer(&status);
        let run_id = uuid::Uuid::new_v4();

        status.busy(run_id);
        status.error(run_id);

        tokio::time::timeout(std::time::Duration::from_millis(100), renderer)
            .await
            .expect("renderer should stop at the final status")
            .unwrap();
    }

    #[tokio::test]
    async fn status_renderer_keeps_running_while_busy() {
        let status = StatusReporter::new();
        let renderer = spawn_status_renderer(&status);

        status.busy(uuid::Uuid::new_v4());
        tokio::task::yield_now().await;
        assert!(!renderer.is_finished());
        renderer.abort();
    }

    #[test]
    fn config_set_rejects_both_prompt_sources() {
        let result = cli().try_get_matches_from([
            "pdfnamer", "config", "set", "--prompt", "x", "--prompt-file", "p.txt",
        ]);
        assert!(result.is_err());
    }
}
