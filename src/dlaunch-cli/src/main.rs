mod control;
mod frontend;
mod report;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use control::{ControlCommand, ControlSocket};
use dlaunch_core::{init_logging, AppDirs, Config, History, LogMode, ProviderEntry};
use dlaunch_plugin::ExternalProvider;
use dlaunch_runtime::{Launcher, Layout, Registry, Scheduler};
use frontend::{LineInput, Outcome};
use report::QueryReport;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Parser)]
#[command(name = "dlaunch", version, about = "On-demand application launcher")]
struct Cli {
    /// Declare an external provider: NAME ENTRY OPTIONS (repeatable)
    #[arg(
        long = "provider",
        num_args = 3,
        value_names = ["NAME", "ENTRY", "OPTIONS"],
        action = ArgAction::Append
    )]
    providers: Vec<String>,
    /// Config file (defaults to config.toml in the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the resident launcher
    Run {
        /// Start with the launcher shown
        #[arg(long)]
        visible: bool,
    },
    /// Show the resident launcher
    Show,
    /// Hide the resident launcher
    Hide,
    /// Stop the resident launcher
    Quit,
    /// Query every provider once and print the aggregated results
    Query {
        text: String,
        /// How long to wait for asynchronous providers
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Provider management commands
    #[command(subcommand)]
    Providers(ProvidersCommand),
}

#[derive(Debug, Subcommand)]
enum ProvidersCommand {
    /// List declared providers and their parsed options
    List,
}

impl Command {
    fn log_mode(&self) -> LogMode {
        match self {
            Command::Run { .. } => LogMode::Resident,
            Command::Query { json: true, .. } => LogMode::Quiet,
            _ => LogMode::OneShot,
        }
    }
}

impl Cli {
    /// Config-declared providers followed by command-line ones.
    fn declarations(&self, config: &Config) -> Vec<ProviderEntry> {
        let mut entries = config.providers.clone();
        entries.extend(self.providers.chunks_exact(3).map(|chunk| ProviderEntry {
            name: chunk[0].clone(),
            entry: chunk[1].clone(),
            options: chunk[2].clone(),
        }));
        entries
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let config = load_config(&cli, &dirs)?;
    let _logging = init_logging(&config.logging, &dirs, cli.command.log_mode())?;

    match &cli.command {
        Command::Show => send_control(&dirs, ControlCommand::Show),
        Command::Hide => send_control(&dirs, ControlCommand::Hide),
        Command::Quit => send_control(&dirs, ControlCommand::Quit),
        Command::Providers(ProvidersCommand::List) => {
            print_providers(&cli.declarations(&config));
            Ok(())
        }
        Command::Query {
            text,
            timeout_ms,
            json,
        } => {
            let launcher = build_launcher(&cli, &config, None)?;
            run_query(launcher, &config, text, Duration::from_millis(*timeout_ms), *json)
        }
        Command::Run { visible } => {
            let history = load_history(&config, &dirs);
            let launcher = build_launcher(&cli, &config, history)?;
            run_resident(launcher, &config, &dirs, *visible)
        }
    }
}

fn load_config(cli: &Cli, dirs: &AppDirs) -> Result<Config> {
    match &cli.config {
        Some(path) => {
            dirs.ensure_exists()?;
            Config::load_from(path)
                .with_context(|| format!("cannot load config {}", path.display()))
        }
        None => Ok(Config::load_or_default(dirs)?),
    }
}

fn send_control(dirs: &AppDirs, command: ControlCommand) -> Result<()> {
    control::send(&dirs.control_socket(), command)?;
    tracing::debug!(%command, "control command sent");
    Ok(())
}

fn load_history(config: &Config, dirs: &AppDirs) -> Option<History> {
    if !config.history.enabled {
        return None;
    }
    let path = config.history.path(dirs);
    match History::load(&path) {
        Ok(history) => Some(history),
        Err(err) => {
            tracing::warn!(error = %err, "history unavailable, keeping it in memory");
            Some(History::in_memory())
        }
    }
}

fn build_registry(declarations: &[ProviderEntry]) -> Result<Registry> {
    let mut registry = Registry::new();
    for declaration in declarations {
        let provider = ExternalProvider::from_declaration(
            declaration.name.as_str(),
            declaration.entry.as_str(),
            &declaration.options,
        )
        .with_context(|| format!("invalid options for provider '{}'", declaration.name))?;
        registry
            .register(Box::new(provider))
            .with_context(|| format!("cannot register provider '{}'", declaration.name))?;
    }
    registry.init_all();
    Ok(registry)
}

fn build_launcher(cli: &Cli, config: &Config, history: Option<History>) -> Result<Launcher> {
    let registry = build_registry(&cli.declarations(config))?;
    if registry.is_empty() {
        tracing::warn!("no providers declared; add [[providers]] to config.toml or use --provider");
    }
    let layout = Layout::from_display(config.display.width, config.display.lines);
    Ok(Launcher::new(registry, history, layout))
}

fn run_query(
    mut launcher: Launcher,
    config: &Config,
    text: &str,
    timeout: Duration,
    json: bool,
) -> Result<()> {
    let scheduler = Scheduler::new(config.scheduler.poll_timeout().min(timeout));
    launcher.set_input(text);

    let deadline = Instant::now() + timeout;
    while launcher.registry().has_pending() && Instant::now() < deadline {
        let outcome = scheduler.tick(launcher.registry_mut(), &[])?;
        if outcome.has_changes() {
            launcher.refresh();
        }
    }
    if launcher.registry().has_pending() {
        tracing::info!("timed out waiting for asynchronous providers");
    }

    let report = QueryReport::from_launcher(&launcher);
    let mut stdout = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
    } else {
        report.write_text(&mut stdout)?;
    }
    Ok(())
}

fn run_resident(mut launcher: Launcher, config: &Config, dirs: &AppDirs, visible: bool) -> Result<()> {
    let control = ControlSocket::bind(&dirs.control_socket())?;
    let stdin = io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .context("failed to duplicate stdin")?;
    let mut input = LineInput::new(File::from(stdin));
    let scheduler = Scheduler::new(config.scheduler.poll_timeout());
    let mut stdout = io::stdout();

    tracing::info!(
        providers = launcher.registry().len(),
        control = %control.path().display(),
        "dlaunch running"
    );
    if visible {
        launcher.show();
        frontend::render(&launcher, &mut stdout)?;
    }

    loop {
        let read_input = launcher.is_visible() && !input.is_closed();
        let outcome = {
            let mut sources = vec![control.as_fd()];
            if read_input {
                sources.push(input.as_fd());
            }
            scheduler.tick(launcher.registry_mut(), &sources)?
        };

        let mut redraw = false;
        if outcome.has_changes() {
            launcher.refresh();
            redraw = launcher.is_visible();
        }

        for source in outcome.external {
            if source == 0 {
                for command in control.accept_commands()? {
                    tracing::debug!(%command, "control command received");
                    match command {
                        ControlCommand::Show => {
                            launcher.show();
                            redraw = true;
                        }
                        ControlCommand::Hide => launcher.hide(),
                        ControlCommand::Quit => return Ok(()),
                    }
                }
                continue;
            }

            for line in input.read_lines()? {
                let parsed = match frontend::parse_line(&line) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        writeln!(stdout, "{err}")?;
                        continue;
                    }
                };
                match frontend::apply(&mut launcher, parsed) {
                    Outcome::Continue => redraw = true,
                    Outcome::Activated(activation) => {
                        tracing::info!(
                            provider = %activation.provider_name,
                            text = %activation.text,
                            dispatched = activation.dispatched,
                            "activated"
                        );
                        redraw = launcher.is_visible();
                    }
                    Outcome::Summary => {
                        frontend::render_summary(&launcher, &mut stdout)?;
                        redraw = false;
                    }
                    Outcome::Hidden => redraw = false,
                    Outcome::Quit => return Ok(()),
                }
                if !launcher.is_visible() {
                    break;
                }
            }
            if input.is_closed() {
                tracing::info!("front-end input closed");
                return Ok(());
            }
        }

        if redraw && launcher.is_visible() {
            frontend::render(&launcher, &mut stdout)?;
        }
    }
}

fn print_providers(declarations: &[ProviderEntry]) {
    if declarations.is_empty() {
        println!("No providers declared. Add [[providers]] to config.toml or pass --provider.");
        return;
    }

    for declaration in declarations {
        println!("Provider: {}", declaration.name);
        println!("  entry: {}", declaration.entry);
        match ExternalProvider::from_declaration(
            declaration.name.as_str(),
            declaration.entry.as_str(),
            &declaration.options,
        ) {
            Ok(provider) => {
                let options = provider.options();
                println!("  backend: {}", provider.backend().describe());
                println!(
                    "  priority: {}  history: {}  async: {}",
                    options.priority, options.history, options.asynchronous
                );
                if let Some(command) = &options.retry_command {
                    println!(
                        "  retry: {} (every {}s at most)",
                        command,
                        options.retry_delay.as_secs()
                    );
                }
            }
            Err(err) => println!("  invalid options: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_flags_take_three_values_and_repeat() {
        let cli = Cli::try_parse_from([
            "dlaunch",
            "--provider",
            "cmd",
            "complete-cmd",
            "PRIORITY=1",
            "--provider",
            "ssh",
            "/run/ssh.sock",
            "TYPE=UNIXSOCK",
            "query",
            "ls",
        ])
        .unwrap();

        let mut config = Config::default();
        config.providers.push(ProviderEntry {
            name: "files".into(),
            entry: "browse".into(),
            options: String::new(),
        });
        let names: Vec<String> = cli
            .declarations(&config)
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["files", "cmd", "ssh"]);
        assert!(matches!(
            cli.command,
            Command::Query { ref text, timeout_ms: 2000, json: false } if text == "ls"
        ));
    }

    #[test]
    fn run_and_control_commands_parse() {
        let cli = Cli::try_parse_from(["dlaunch", "run", "--visible"]).unwrap();
        assert!(matches!(cli.command, Command::Run { visible: true }));
        let cli = Cli::try_parse_from(["dlaunch", "--config", "/tmp/d.toml", "show"]).unwrap();
        assert!(matches!(cli.command, Command::Show));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/d.toml")));
        assert!(Cli::try_parse_from(["dlaunch", "--provider", "only-name", "show"]).is_err());
    }

    #[test]
    fn only_the_resident_process_logs_to_file() {
        let mode = |args: &[&str]| Cli::try_parse_from(args).unwrap().command.log_mode();
        assert_eq!(mode(&["dlaunch", "run"]), LogMode::Resident);
        assert_eq!(mode(&["dlaunch", "show"]), LogMode::OneShot);
        assert_eq!(mode(&["dlaunch", "query", "ls"]), LogMode::OneShot);
        assert_eq!(mode(&["dlaunch", "query", "ls", "--json"]), LogMode::Quiet);
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("typo.toml");
        let cli = Cli::try_parse_from([
            "dlaunch",
            "--config",
            missing.to_str().unwrap(),
            "providers",
            "list",
        ])
        .unwrap();
        assert!(load_config(&cli, &AppDirs::rooted(dir.path())).is_err());

        let cli = Cli::try_parse_from(["dlaunch", "providers", "list"]).unwrap();
        let config = load_config(&cli, &AppDirs::rooted(dir.path())).unwrap();
        assert!(config.providers.is_empty());
    }

    #[test]
    fn registry_rejects_bad_declarations() {
        let entry = |name: &str, options: &str| ProviderEntry {
            name: name.into(),
            entry: "cat".into(),
            options: options.into(),
        };

        let registry = build_registry(&[entry("a", ""), entry("b", "PRIORITY=2")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.entries()[1].priority(), 2);

        assert!(build_registry(&[entry("a", "TYPE=PIPE")]).is_err());
        assert!(build_registry(&[entry("a:b", "")]).is_err());
        assert!(build_registry(&[entry("a", ""), entry("a", "")]).is_err());
    }

    #[test]
    fn disabled_history_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = AppDirs::rooted(dir.path());
        let mut config = Config::default();
        config.history.enabled = false;
        assert!(load_history(&config, &dirs).is_none());

        config.history.enabled = true;
        dirs.ensure_exists().unwrap();
        let history = load_history(&config, &dirs).unwrap();
        assert!(history.is_empty());
    }
}
