use axosoft_client::browser::{BrowserLauncher, NoBrowser, SystemBrowser};
use axosoft_client::client::CreateOutcome;
use axosoft_client::models::NewItem;
use axosoft_client::{
    logging, ApiError, ApiResult, AppConfig, AxosoftSession, HttpTransport, ItemType,
    ResourceItem, SledSettings,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "axosoft-cli")]
#[command(about = "Browse and edit Axosoft work items", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write JSON logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Print URLs instead of launching a browser
    #[arg(long, global = true)]
    no_browser: bool,
}

#[derive(Subcommand)]
enum Commands {
    Login {
        /// Axosoft site, e.g. acme.axosoft.com
        #[arg(short, long)]
        domain: Option<String>,
        /// Authorization code; read from stdin when omitted
        #[arg(short, long)]
        code: Option<String>,
    },
    Logout,
    Me,
    Projects,
    SetProject {
        #[arg(short, long)]
        id: i64,
    },
    Items {
        #[arg(short = 't', long = "type")]
        item_type: ItemType,
        /// Only items assigned to me
        #[arg(short, long)]
        mine: bool,
        #[arg(short, long)]
        search: Option<String>,
    },
    Show {
        #[arg(short = 't', long = "type")]
        item_type: ItemType,
        #[arg(short, long)]
        id: i64,
    },
    Create {
        #[arg(short = 't', long = "type")]
        item_type: ItemType,
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Time estimate in hours
        #[arg(short, long)]
        estimate: String,
    },
    LogTime {
        #[arg(short = 't', long = "type")]
        item_type: ItemType,
        #[arg(short, long)]
        id: i64,
        #[arg(short = 'H', long)]
        hours: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    Delete {
        #[arg(short = 't', long = "type")]
        item_type: ItemType,
        #[arg(short, long)]
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Send an edited item (JSON file) back to the server
    Save {
        #[arg(short, long)]
        file: PathBuf,
    },
    Open {
        #[arg(short = 't', long = "type")]
        item_type: ItemType,
        #[arg(short, long)]
        id: i64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = logging::init(cli.verbose, cli.log_dir.as_deref());

    let result = if cli.no_browser {
        run(cli.command, NoBrowser)
    } else {
        run(cli.command, SystemBrowser)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = %err, "command failed");
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
    }
}

fn run<B: BrowserLauncher>(command: Commands, browser: B) -> ApiResult<()> {
    let config = AppConfig::from_env()?;
    let settings = SledSettings::open(&config.settings_path)?;
    let transport = HttpTransport::new()?;
    let mut session = AxosoftSession::new(&config, settings, transport, browser)?;

    match command {
        Commands::Login { domain, code } => {
            if let Some(domain) = domain {
                session.set_domain(&domain)?;
            }
            let url = session.begin_login()?;
            println!("Authorize in your browser: {url}");
            let code = match code {
                Some(code) => code,
                None => prompt("code")?,
            };
            session.finish_login(&code)?;
            let me = session.me()?;
            println!("Successfully Logged In as {}", me.display_name());
        }
        Commands::Logout => {
            session.log_out()?;
            println!("Successfully Logged Out");
        }
        Commands::Me => {
            let me = session.me()?;
            println!("{} (#{})", me.display_name(), me.id);
        }
        Commands::Projects => {
            let current = session.current_project()?;
            for project in session.projects()? {
                let marker = if current.as_ref().and_then(Value::as_i64) == Some(project.id) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {:>6}  {}", project.id, project.name);
            }
        }
        Commands::SetProject { id } => {
            session.set_project(id)?;
            println!("You have set #{id} as the current project");
        }
        Commands::Items { item_type, mine, search } => {
            let items = match (search, mine) {
                (Some(text), _) => session.search_items(item_type, &text)?,
                (None, true) => session.my_items(item_type)?,
                (None, false) => session.items(item_type, &Default::default())?,
            };
            if items.is_empty() {
                println!("No Items Found");
            }
            for item in items {
                println!("{}", item.label());
            }
        }
        Commands::Show { item_type, id } => {
            let item = session.item(item_type, id)?;
            println!("{}", pretty(&item.to_value())?);
        }
        Commands::Create { item_type, name, description, estimate } => {
            let new_item = NewItem {
                name,
                description,
                estimate_hours: estimate,
            };
            let outcome = session.create_item(item_type, &new_item)?;
            if let CreateOutcome::PartialFailureWithData { message, .. } = &outcome {
                eprintln!("warning: {message}");
            }
            match outcome.id() {
                Some(id) => println!("Created {item_type} #{id}"),
                None => println!("Created {item_type}"),
            }
        }
        Commands::LogTime { item_type, id, hours, description } => {
            let item = session.item(item_type, id)?;
            session.log_time(&item, &hours, &description)?;
            println!("Logged {hours}h on {}", item.label());
        }
        Commands::Delete { item_type, id, yes } => {
            let item = session.item(item_type, id)?;
            if !yes {
                let answer = prompt(&format!(
                    "You are about to delete Item #{}. Are you sure? [y/N]",
                    item.id
                ))?;
                if !answer.eq_ignore_ascii_case("y") && !answer.eq_ignore_ascii_case("yes") {
                    return Ok(());
                }
            }
            session.delete_item(&item)?;
            println!("Deleted {}", item.label());
        }
        Commands::Save { file } => {
            let edited = fs::read_to_string(&file)
                .map_err(|e| ApiError::InvalidItem(format!("{}: {e}", file.display())))?;
            let saved = session.save_item(&edited)?;
            println!("Saved #{}", saved.get("id").and_then(Value::as_i64).unwrap_or_default());
        }
        Commands::Open { item_type, id } => {
            let item = ResourceItem {
                id,
                item_type: item_type.to_string(),
                name: String::new(),
                extra: Default::default(),
            };
            let url = session.open_in_browser(&item)?;
            println!("{url}");
        }
    }

    Ok(())
}

fn prompt(label: &str) -> ApiResult<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Sorted keys, four-space indent: the layout item views are edited in.
fn pretty(value: &Value) -> ApiResult<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}
