//! Command-line surface for interacting with a Dosecast server.

use clap::{Args, Parser, Subcommand, ValueEnum};
use url::Url;
use uuid::Uuid;

use crate::client::{AppContext, CliResult, parse_url};
use crate::commands::chat::handle_chat;
use crate::commands::predict::{handle_images, handle_predict};
use crate::commands::view::handle_view;

const DEFAULT_TIMEOUT_SECS: u64 = 960;
const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";

/// Parses CLI arguments, executes the requested command, and reports errors.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let request_id = Uuid::new_v4().to_string();
    tracing::debug!(command = command_label(&cli.command), %request_id, "dispatching");

    let result = match AppContext::from_cli(&cli, &request_id) {
        Ok(ctx) => dispatch(cli.command, cli.output, &ctx).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

async fn dispatch(command: Command, format: OutputFormat, ctx: &AppContext) -> CliResult<()> {
    match command {
        Command::Predict(args) => handle_predict(ctx, args, format).await,
        Command::Images(args) => handle_images(ctx, args, format).await,
        Command::View(args) => handle_view(ctx, args, format).await,
        Command::Chat(args) => handle_chat(ctx, args, format).await,
    }
}

#[derive(Parser)]
#[command(name = "dosecast", about = "Trigger and browse Dosecast dose predictions")]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "DOSECAST_API_URL",
        value_parser = parse_url,
        default_value = DEFAULT_API_URL
    )]
    pub(crate) api_url: Url,
    #[arg(
        long,
        global = true,
        env = "DOSECAST_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        help = "Per-request timeout; predictions can take minutes"
    )]
    pub(crate) timeout: u64,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run (or reuse) the dose prediction for a patient.
    Predict(PredictArgs),
    /// List image URLs for a patient without running the model.
    Images(PatientArgs),
    /// Show the image URLs at one slice position.
    View(ViewArgs),
    /// Send a chat message; a prediction intent triggers a run.
    Chat(ChatArgs),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct PatientArgs {
    pub(crate) patient: String,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct PredictArgs {
    pub(crate) patient: String,
    #[arg(long, help = "Run the model even if predictions already exist")]
    pub(crate) force: bool,
    #[arg(long, help = "Retry while another prediction is running")]
    pub(crate) wait: bool,
    #[arg(long, default_value_t = 5)]
    pub(crate) retry_secs: u64,
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
    pub(crate) max_attempts: u32,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ViewArgs {
    pub(crate) patient: String,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub(crate) slice: i64,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ChatArgs {
    pub(crate) patient: String,
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub(crate) message: Vec<String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Predict(_) => "predict",
        Command::Images(_) => "images",
        Command::View(_) => "view",
        Command::Chat(_) => "chat",
    }
}
