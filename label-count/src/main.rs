use anyhow::{Context, Result};
use label_count::{
    adapter::{self, InvocationEvent, InvocationResult},
    config::Config,
    LocalStore,
};
use std::{path::PathBuf, process::ExitCode};
use structopt::StructOpt;
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone, StructOpt)]
/// Count per-class annotations of a YOLO dataset and publish a summary.
enum Args {
    /// Run with a configuration file.
    Run {
        #[structopt(long, default_value = "count.json5")]
        /// configuration file
        config_file: PathBuf,
    },
    /// Handle a trigger event and print the result as JSON.
    Event {
        #[structopt(long)]
        /// directory holding one sub-directory per bucket
        store_root: PathBuf,
        /// event JSON file, read from stdin if omitted
        event_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    label_count::logging::init();

    let result = match Args::from_args() {
        Args::Run { config_file } => {
            let config = Config::open(&config_file).with_context(|| {
                format!("failed to load config file '{}'", config_file.display())
            })?;
            let store = config.store.build();
            adapter::invoke(&store, &config.count).await
        }
        Args::Event {
            store_root,
            event_file,
        } => {
            let text = match event_file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read event file '{}'", path.display()))?,
                None => {
                    let mut text = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut text)
                        .await
                        .context("failed to read event from stdin")?;
                    text
                }
            };
            let event: InvocationEvent =
                serde_json::from_str(&text).context("failed to parse the event")?;
            let store = LocalStore::new(store_root);
            let result = adapter::handle_event(&store, event).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            result
        }
    };

    Ok(report(&result))
}

fn report(result: &InvocationResult) -> ExitCode {
    if result.is_success() {
        eprintln!("{}", result.message);
        ExitCode::SUCCESS
    } else {
        eprintln!("error: {}", result.message);
        ExitCode::FAILURE
    }
}
