use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use pbcore::config::civ4_ini::{fix_altroot_login, INI_FILE, SMTP_LOGIN_KEY};
use pbcore::games::{LauncherConfig, DEFAULT_CONFIG_FILE};
use pbcore::launcher::process::{plan_launch, supervise};
use pbcore::savemeta::SaveHeader;
use pbcore::select::{list_saves, select};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
Syntax: pbstart gameid [savegame] [password]

 gameid:   Selects the game. Add games to the launcher config and use the
           'seed' directory as template for a new altroot.
 savegame: If the server loads a save automatically, it takes the filename
           defined in pbSettings.json. Use this argument to override it.
           The full filename isn't required: the youngest save whose path
           matches the regular expression is selected and stored.
           Useful to load the latest save of a player.
 password: Overrides the stored admin password. Be careful, a wrong password
           traps the server in an endless loop and it has to be killed
           manually.

       pbstart list gameid [pattern]
           Print the 20 youngest saves, optionally filtered by pattern.";

#[derive(Parser, Debug)]
#[command(
    name = "pbstart",
    about = "Select a save and keep a Civ4 Pitboss server running",
    version,
    args_conflicts_with_subcommands = true,
    disable_help_subcommand = true
)]
struct Cli {
    /// Launcher configuration file
    #[arg(long, global = true, env = "PB_LAUNCHER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    cmd: Option<Cmd>,
    #[command(flatten)]
    start: StartArgs,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print out names of the 20 youngest saves
    List {
        /// Game id
        game: String,
        /// Regular expression matched against the save paths
        pattern: Option<String>,
    },
    /// Print help and exit
    Help,
}

#[derive(ClapArgs, Debug)]
struct StartArgs {
    /// Game id
    game: Option<String>,
    /// Regular expression selecting the save to load
    save: Option<String>,
    /// Replaces the stored admin password
    password: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = LauncherConfig::load(&cli.config)?;

    let cli = if cli.cmd.is_none() && cli.start.game.is_none() {
        print_menu(&config);
        let words = read_menu_choice()?;
        Cli::try_parse_from(std::iter::once("pbstart".to_string()).chain(words))?
    } else {
        cli
    };

    match cli.cmd {
        Some(Cmd::Help) => {
            println!("{HELP}");
            Ok(ExitCode::SUCCESS)
        }
        Some(Cmd::List { game, pattern }) => {
            print_saves(&config, &game, pattern.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        None => match cli.start.game {
            Some(game) => start(
                &config,
                &game,
                cli.start.save.as_deref(),
                cli.start.password.as_deref(),
            ),
            None => {
                println!("{HELP}");
                Ok(ExitCode::FAILURE)
            }
        },
    }
}

fn print_menu(config: &LauncherConfig) {
    println!("==== Select Game/Altroot ====");
    println!("ID - Description\n");
    for game in config.games() {
        println!("  {:>10.10} - {}", game.id, game.name);
    }
    println!("  list [game id] [save pattern] - Print out names of 20 youngest saves.");
    println!("  {:>10} - Print help and exit", "help");
}

fn read_menu_choice() -> Result<Vec<String>> {
    print!("> ");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read selection")?;
    Ok(split_choice(&line))
}

fn split_choice(line: &str) -> Vec<String> {
    line.split(' ')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn print_saves(config: &LauncherConfig, game_id: &str, pattern: Option<&str>) -> Result<()> {
    let saves = list_saves(config, game_id, pattern)?;
    println!("Youngest saves for {}:", pattern.unwrap_or(""));
    for (i, save) in saves.iter().enumerate() {
        let created: chrono::DateTime<chrono::Local> = save.created.into();
        println!(
            "{:2} {:>23.23} {}",
            i + 1,
            created.format("%a %b %e %H:%M:%S %Y").to_string(),
            save.path.display()
        );
    }
    Ok(())
}

fn start(
    config: &LauncherConfig,
    game_id: &str,
    save: Option<&str>,
    password: Option<&str>,
) -> Result<ExitCode> {
    let game = config
        .game(game_id)
        .with_context(|| format!("Unknown game `{game_id}`"))?;
    println!("\n==== Start {} ====\n", game.name);

    if let Err(e) = fix_altroot_login(&game.altroot) {
        tracing::error!(
            "The option '{}' in '{}' doesn't contain the altroot path and the automated fix failed: {}",
            SMTP_LOGIN_KEY,
            INI_FILE,
            e
        );
        return Ok(ExitCode::FAILURE);
    }

    let selection = select(config, game_id, save, password, &SaveHeader);
    if selection.is_abort() {
        return Ok(ExitCode::FAILURE);
    }

    let launch = plan_launch(config, game, &selection)?;
    println!("Start Command:\n{}", launch.command_line());

    supervise(
        &launch,
        Duration::from_secs(config.restart_timeout),
        config.max_restarts,
    )?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        let cli = Cli::try_parse_from(["pbstart", "2", "turn50", "secret"]).unwrap();
        assert!(cli.cmd.is_none());
        assert_eq!(cli.start.game.as_deref(), Some("2"));
        assert_eq!(cli.start.save.as_deref(), Some("turn50"));
        assert_eq!(cli.start.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_parse_list() {
        let cli = Cli::try_parse_from(["pbstart", "list", "1", "Alice"]).unwrap();
        match cli.cmd {
            Some(Cmd::List { game, pattern }) => {
                assert_eq!(game, "1");
                assert_eq!(pattern.as_deref(), Some("Alice"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_help_and_empty() {
        let cli = Cli::try_parse_from(["pbstart", "help"]).unwrap();
        assert!(matches!(cli.cmd, Some(Cmd::Help)));

        let cli = Cli::try_parse_from(["pbstart"]).unwrap();
        assert!(cli.cmd.is_none());
        assert!(cli.start.game.is_none());
    }

    #[test]
    fn test_parse_config_flag() {
        let cli = Cli::try_parse_from(["pbstart", "--config", "/etc/pb.json", "1"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/pb.json"));
        assert_eq!(cli.start.game.as_deref(), Some("1"));
    }

    #[test]
    fn test_split_choice() {
        assert_eq!(split_choice("list 1 Alice\n"), vec!["list", "1", "Alice"]);
        assert_eq!(split_choice("2  turn50\r\n"), vec!["2", "turn50"]);
        assert!(split_choice("\n").is_empty());
    }
}
