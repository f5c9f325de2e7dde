use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use restorer_contracts::chat::{parse_intent, Action, SESSION_HELP_COMMANDS};
use restorer_contracts::events::EventWriter;
use restorer_contracts::outcome::RestorationOutcome;
use restorer_contracts::session::Completion;
use restorer_engine::{GeminiRestorer, RestorationController, RestorerConfig};
use uuid::Uuid;

mod render;

use render::{phase_label, render_session, BANNER, FOOTER};

#[derive(Debug, Parser)]
#[command(
    name = "photo-restorer",
    version,
    about = "Restore old photographs with a Gemini image model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: open a photo, restore it, save the result.
    Session(SessionArgs),
    /// Restore one photo and write `<name>-restored.<ext>` into --out.
    Restore(RestoreArgs),
}

#[derive(Debug, Parser)]
struct SessionArgs {
    /// Photo to stage on startup.
    file: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Parser)]
struct RestoreArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
}

enum UiEvent {
    Line(String),
    InputClosed,
    RestoreFinished {
        attempt: u64,
        outcome: RestorationOutcome,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("photo-restorer error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    // Without a credential there is nothing to serve; fail before any session.
    let config = RestorerConfig::from_env()?;
    match cli.command {
        Command::Session(args) => run_session(args, config),
        Command::Restore(args) => run_restore(args, config),
    }
}

fn build_controller(
    config: RestorerConfig,
    model: Option<String>,
    out: &Path,
    events: Option<PathBuf>,
) -> Result<RestorationController> {
    fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let events_path = events.unwrap_or_else(|| out.join("events.jsonl"));
    let client = GeminiRestorer::new(config.with_model(model));
    log::info!("using model {} via {}", client.model(), client.endpoint());
    let client = Arc::new(client);
    let writer = EventWriter::new(events_path, Uuid::new_v4().to_string());
    RestorationController::new(client, writer)
}

fn run_restore(args: RestoreArgs, config: RestorerConfig) -> Result<i32> {
    let mut controller = build_controller(config, args.model, &args.out, args.events)?;
    if let Err(err) = controller.select_file(&args.input) {
        controller.finish()?;
        return Err(err.into());
    }
    println!("{}", render_session(controller.session()));
    eprintln!("Restoring your memory...");
    controller.restore_blocking()?;

    let code = if controller.session().restored().is_some() {
        let path = controller.save_restored(&args.out)?;
        println!("Saved restored photo to {}", path.display());
        0
    } else {
        eprintln!("{}", controller.session().error().unwrap_or("Restoration failed."));
        1
    };
    controller.finish()?;
    Ok(code)
}

fn run_session(args: SessionArgs, config: RestorerConfig) -> Result<i32> {
    let mut controller = build_controller(config, args.model, &args.out, args.events)?;
    let (tx, rx) = mpsc::channel();
    spawn_stdin_reader(tx.clone());

    println!("{BANNER} ({FOOTER}). Type /help for commands.");
    if let Some(file) = args.file.as_deref() {
        open_file(&mut controller, file);
    }
    print_prompt()?;

    let mut input_closed = false;
    while let Ok(event) = rx.recv() {
        match event {
            UiEvent::Line(line) => {
                if handle_line(&mut controller, &line, &tx, &args.out) == Flow::Quit {
                    break;
                }
                print_prompt()?;
            }
            UiEvent::InputClosed => {
                input_closed = true;
                if !controller.session().is_restoring() {
                    break;
                }
                println!("Waiting for the restoration in progress to finish...");
            }
            UiEvent::RestoreFinished { attempt, outcome } => {
                println!();
                match controller.finish_restore(attempt, outcome) {
                    Completion::Applied => println!("{}", render_session(controller.session())),
                    Completion::Stale => {
                        println!("Attempt {attempt} settled after the photo was replaced; /restore is available again.")
                    }
                }
                if input_closed {
                    if !controller.session().is_restoring() {
                        break;
                    }
                } else {
                    print_prompt()?;
                }
            }
        }
    }

    controller.finish()?;
    Ok(0)
}

fn spawn_stdin_reader(tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        let mut handle = stdin.lock();
        let mut line = String::new();
        loop {
            line.clear();
            match handle.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let input = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(UiEvent::Line(input)).is_err() {
                        return;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::error!("stdin read failed: {err}");
                    break;
                }
            }
        }
        let _ = tx.send(UiEvent::InputClosed);
    });
}

fn print_prompt() -> Result<()> {
    print!("> ");
    io::stdout().flush()?;
    Ok(())
}

fn handle_line(
    controller: &mut RestorationController,
    line: &str,
    tx: &Sender<UiEvent>,
    out_dir: &Path,
) -> Flow {
    let intent = parse_intent(line);
    log::debug!("{:?} <- {:?}", intent.action, intent.raw);
    match intent.action {
        Action::Noop => {}
        Action::Help => {
            println!("Commands: {}", SESSION_HELP_COMMANDS.join(" "));
            println!("A line without a leading command is opened as a photo path.");
        }
        Action::Open => match intent.path {
            Some(path) => open_file(controller, Path::new(&path)),
            None => println!("/open requires a path"),
        },
        Action::Restore => {
            let tx = tx.clone();
            let started = controller.spawn_restore(move |attempt, outcome| {
                let _ = tx.send(UiEvent::RestoreFinished { attempt, outcome });
            });
            match started {
                Ok(_) => println!("{}", render_session(controller.session())),
                Err(err) => println!("{err}"),
            }
        }
        Action::Save => {
            let target = intent
                .path
                .map(PathBuf::from)
                .unwrap_or_else(|| out_dir.to_path_buf());
            match controller.save_restored(&target) {
                Ok(path) => println!("Saved restored photo to {}", path.display()),
                Err(err) => println!("Save failed: {err:#}"),
            }
        }
        Action::Status => {
            println!("State: {}", phase_label(controller.session().phase()));
            println!("{}", render_session(controller.session()));
        }
        Action::Quit => return Flow::Quit,
        Action::Unknown => {
            println!(
                "Unknown command /{}. Type /help for commands.",
                intent.command.unwrap_or_default()
            );
        }
    }
    Flow::Continue
}

fn open_file(controller: &mut RestorationController, path: &Path) {
    match controller.select_file(path) {
        Ok(()) => println!("{}", render_session(controller.session())),
        Err(err) => println!("Error: {err}"),
    }
}
