use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::games::{GameConfig, LauncherConfig};
use crate::paths::altroot_for_game;
use crate::select::{AbortReason, SelectionResult};

/// Community-patched server binary, preferred when installed.
pub const PATCHED_EXE: &str = "Civ4BeyondSword_PitBoss2014.exe";
/// Stock server binary.
pub const STOCK_EXE: &str = "Civ4BeyondSword_PitBoss.exe";

/// Output lines dropped when output filtering is on.
const NOISE_PREFIXES: &[&str] = &["FTranslator::AddText", "fixme:"];

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("executable not found, is the install path correct? {0:?}")]
    ExecutableNotFound(PathBuf),
    #[error("altroot directory {0:?} not found, copy 'seed' to create a new game")]
    AltrootNotFound(PathBuf),
    #[error("launch aborted: {0}")]
    Aborted(AbortReason),
    #[error("failed to prepare {path:?}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Configuration for launching the server.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Path to the server executable.
    pub binary: PathBuf,
    /// Command-line arguments.
    pub arguments: Vec<String>,
    /// Working directory.
    pub working_dir: Option<PathBuf>,
    /// Compatibility layer running the binary (`wine`), if any.
    pub runner: Option<String>,
    /// Wrapper commands prepended before the runner (e.g. xvfb-run).
    pub wrapper_commands: Vec<String>,
    /// Command started in the background right before each launch.
    pub pre_launch: Vec<String>,
    /// Drop known noise lines from the server output.
    pub filter_output: bool,
}

impl LaunchConfig {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            arguments: Vec::new(),
            working_dir: None,
            runner: None,
            wrapper_commands: Vec::new(),
            pre_launch: Vec::new(),
            filter_output: false,
        }
    }

    pub fn with_arguments(mut self, args: Vec<String>) -> Self {
        self.arguments = args;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = Some(runner.into());
        self
    }

    pub fn with_wrapper(mut self, commands: Vec<String>) -> Self {
        self.wrapper_commands = commands;
        self
    }

    pub fn with_pre_launch(mut self, command: Vec<String>) -> Self {
        self.pre_launch = command;
        self
    }

    pub fn with_output_filter(mut self, enabled: bool) -> Self {
        self.filter_output = enabled;
        self
    }

    /// Full argument vector: wrapper, runner, binary, arguments.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.wrapper_commands.clone();
        argv.extend(self.runner.iter().cloned());
        argv.push(self.binary.display().to_string());
        argv.extend(self.arguments.iter().cloned());
        argv
    }

    /// Shell-quoted command line, for display.
    pub fn command_line(&self) -> String {
        shell_words::join(self.argv())
    }

    fn command(&self) -> Command {
        let argv = self.argv();
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Pick the server binary inside the install directory.
pub fn locate_executable(civ4_path: &Path) -> PathBuf {
    let patched = civ4_path.join(PATCHED_EXE);
    if patched.exists() {
        patched
    } else {
        civ4_path.join(STOCK_EXE)
    }
}

/// Server arguments for `mod_name` and `altroot`.
///
/// The game only accepts the mod as `mod= "<name>"\"`, which reaches the
/// binary as `mod=` followed by `<name>"`.
pub fn server_arguments(mod_name: &str, altroot: &Path) -> Vec<String> {
    vec![
        "mod=".to_string(),
        format!("{mod_name}\""),
        format!("/ALTROOT={}", altroot_for_game(altroot)),
    ]
}

/// Build the launch for `game` from a finished selection.
pub fn plan_launch(
    config: &LauncherConfig,
    game: &GameConfig,
    selection: &SelectionResult,
) -> Result<LaunchConfig, LaunchError> {
    if let Some(reason) = &selection.abort {
        return Err(LaunchError::Aborted(reason.clone()));
    }

    let binary = locate_executable(&config.civ4_path);
    if !binary.exists() {
        return Err(LaunchError::ExecutableNotFound(binary));
    }
    if !game.altroot.exists() {
        return Err(LaunchError::AltrootNotFound(game.altroot.clone()));
    }

    if let Some(save) = &selection.save {
        tracing::info!("Save: {}", save.display());
    }

    let mut launch = LaunchConfig::new(binary)
        .with_arguments(server_arguments(&selection.mod_name, &game.altroot))
        .with_working_dir(&config.civ4_path)
        .with_output_filter(config.filter_output);

    if cfg!(windows) {
        return Ok(launch);
    }
    launch = launch.with_runner("wine");

    if config.xvfb.enabled {
        let dir = config.xvfb.dir_for(&game.id);
        let cookie = config.xvfb.cookie_for(&game.id);
        if !dir.exists() {
            tracing::info!("Create directory for XV framebuffer: {}", dir.display());
            std::fs::create_dir_all(&dir).map_err(|source| LaunchError::Prepare {
                path: dir.clone(),
                source,
            })?;
        }
        launch = launch
            .with_wrapper(xvfb_wrapper(&dir, &cookie))
            .with_pre_launch(vec![
                "sh".to_string(),
                "-c".to_string(),
                format!(
                    "sleep 3; xauth merge {}",
                    shell_words::quote(&cookie.display().to_string())
                ),
            ]);
    }

    Ok(launch)
}

fn xvfb_wrapper(dir: &Path, cookie: &Path) -> Vec<String> {
    vec![
        "xvfb-run".to_string(),
        "-a".to_string(),
        "-e".to_string(),
        "/dev/shm/xvfb.err".to_string(),
        format!("--auth-file={}", cookie.display()),
        "-s".to_string(),
        format!("-fbdir {} -screen 0 640x480x24", dir.display()),
    ]
}

/// Whether a server output line is known noise.
pub fn is_noise(line: &str) -> bool {
    NOISE_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Copy `input` to `output` line by line, leaving out noise lines.
///
/// Lines are passed through as bytes; Wine output isn't always UTF-8.
fn copy_filtered(input: impl Read, mut output: impl Write) -> io::Result<()> {
    let mut reader = BufReader::new(input);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        if !is_noise(&String::from_utf8_lossy(&line)) {
            output.write_all(&line)?;
        }
    }
}

/// Run the server once and wait for it to exit.
pub fn run_once(config: &LaunchConfig) -> Result<ExitStatus> {
    if !config.pre_launch.is_empty() {
        let spawned = Command::new(&config.pre_launch[0])
            .args(&config.pre_launch[1..])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            tracing::warn!("Pre-launch command failed: {e}");
        }
    }

    let mut cmd = config.command();
    if config.filter_output {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to launch {}", config.binary.display()))?;

    if config.filter_output {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        std::thread::scope(|s| {
            if let Some(err) = stderr {
                let _ = s.spawn(move || copy_filtered(err, io::stderr()));
            }
            if let Some(out) = stdout {
                if let Err(e) = copy_filtered(out, io::stdout()) {
                    tracing::debug!("Output filter stopped: {e}");
                }
            }
        });
    }

    child
        .wait()
        .with_context(|| format!("Failed to wait for {}", config.binary.display()))
}

/// Keep the server running: start it, wait for it to exit, wait
/// `restart_timeout`, start it again.
///
/// Stops after `max_restarts` restarts if set.
pub fn supervise(
    config: &LaunchConfig,
    restart_timeout: Duration,
    max_restarts: Option<u32>,
) -> Result<()> {
    let mut restarts = 0u32;
    loop {
        let status = run_once(config)?;
        tracing::info!("Server exited with {status}");

        if max_restarts.is_some_and(|max| restarts >= max) {
            return Ok(());
        }
        restarts += 1;

        let secs = restart_timeout.as_secs();
        let mut stdout = io::stdout();
        print!("\nRestart server in {secs} seconds.");
        stdout.flush().ok();
        for _ in 0..secs {
            std::thread::sleep(Duration::from_secs(1));
            print!(".");
            stdout.flush().ok();
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::PersistStatus;

    fn selection(mod_name: &str) -> SelectionResult {
        SelectionResult {
            save: None,
            mod_name: mod_name.to_string(),
            autostart: false,
            abort: None,
            persist: PersistStatus::NotRequested,
        }
    }

    fn install(tmp: &Path, exes: &[&str]) -> LauncherConfig {
        let civ4 = tmp.join("civ4");
        std::fs::create_dir_all(&civ4).unwrap();
        for exe in exes {
            std::fs::write(civ4.join(exe), b"MZ").unwrap();
        }
        std::fs::create_dir_all(tmp.join("PB1")).unwrap();
        LauncherConfig::new(civ4, tmp).with_game("1", "Pitboss 1", "PB1")
    }

    #[test]
    fn test_launch_config_builder() {
        let config = LaunchConfig::new("/civ4/Civ4BeyondSword_PitBoss.exe")
            .with_arguments(vec!["mod=".to_string()])
            .with_working_dir("/civ4")
            .with_runner("wine")
            .with_output_filter(true);

        assert_eq!(config.binary, PathBuf::from("/civ4/Civ4BeyondSword_PitBoss.exe"));
        assert_eq!(config.arguments, vec!["mod="]);
        assert_eq!(config.working_dir, Some(PathBuf::from("/civ4")));
        assert_eq!(config.runner.as_deref(), Some("wine"));
        assert!(config.filter_output);
        assert!(config.wrapper_commands.is_empty());
        assert!(config.pre_launch.is_empty());
    }

    #[test]
    fn test_argv_order() {
        let config = LaunchConfig::new("/civ4/pb.exe")
            .with_arguments(vec!["mod=".to_string(), "PB Mod_v7\"".to_string()])
            .with_runner("wine")
            .with_wrapper(vec!["xvfb-run".to_string(), "-a".to_string()]);
        assert_eq!(
            config.argv(),
            vec!["xvfb-run", "-a", "wine", "/civ4/pb.exe", "mod=", "PB Mod_v7\""]
        );
        let line = config.command_line();
        assert!(line.starts_with("xvfb-run -a wine /civ4/pb.exe "));
        assert_eq!(shell_words::split(&line).unwrap(), config.argv());
    }

    #[test]
    fn test_locate_prefers_patched() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(locate_executable(tmp.path()), tmp.path().join(STOCK_EXE));
        std::fs::write(tmp.path().join(PATCHED_EXE), b"MZ").unwrap();
        assert_eq!(locate_executable(tmp.path()), tmp.path().join(PATCHED_EXE));
    }

    #[cfg(unix)]
    #[test]
    fn test_server_arguments() {
        assert_eq!(
            server_arguments("PB Mod_v7", Path::new("/srv/PBs/PB1")),
            vec!["mod=", "PB Mod_v7\"", "/ALTROOT=Z:\\srv\\PBs\\PB1"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_plan_launch_wine() {
        let tmp = tempfile::tempdir().unwrap();
        let config = install(tmp.path(), &[STOCK_EXE]);
        let game = config.game("1").unwrap();

        let launch = plan_launch(&config, game, &selection("PB Mod_v7")).unwrap();
        assert_eq!(launch.runner.as_deref(), Some("wine"));
        assert_eq!(launch.binary, tmp.path().join("civ4").join(STOCK_EXE));
        assert_eq!(launch.working_dir, Some(tmp.path().join("civ4")));
        assert_eq!(launch.arguments[1], "PB Mod_v7\"");
        assert!(launch.wrapper_commands.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_plan_launch_xvfb() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = install(tmp.path(), &[PATCHED_EXE]);
        config.xvfb.enabled = true;
        config.xvfb.dir = tmp.path().join("fb-{GAMEID}").display().to_string();
        config.xvfb.cookie = tmp.path().join("cookie-{GAMEID}").display().to_string();
        let game = config.game("1").unwrap().clone();

        let launch = plan_launch(&config, &game, &selection("PB Mod_v7")).unwrap();
        assert_eq!(launch.wrapper_commands[0], "xvfb-run");
        assert!(launch.wrapper_commands[4].ends_with("cookie-1"));
        assert!(tmp.path().join("fb-1").is_dir());
        assert_eq!(launch.pre_launch[0], "sh");
    }

    #[test]
    fn test_plan_launch_refusals() {
        let tmp = tempfile::tempdir().unwrap();
        let config = install(tmp.path(), &[]);
        let game = config.game("1").unwrap();
        assert!(matches!(
            plan_launch(&config, game, &selection("m")),
            Err(LaunchError::ExecutableNotFound(_))
        ));

        let config = install(tmp.path(), &[STOCK_EXE]).with_game("2", "Pitboss 2", "PB2");
        let game = config.game("2").unwrap();
        assert!(matches!(
            plan_launch(&config, game, &selection("m")),
            Err(LaunchError::AltrootNotFound(_))
        ));

        let mut aborted = selection("m");
        aborted.abort = Some(AbortReason::NoSaveFound("king".to_string()));
        let game = config.game("1").unwrap();
        assert!(matches!(
            plan_launch(&config, game, &aborted),
            Err(LaunchError::Aborted(_))
        ));
    }

    #[test]
    fn test_noise_filter() {
        assert!(is_noise("fixme:ntdll:NtQuerySystemInformation"));
        assert!(is_noise("FTranslator::AddText TXT_KEY_FOO"));
        assert!(!is_noise("Pitboss server started"));

        let input = "fixme:d3d\nhello\nFTranslator::AddText x\nworld\n";
        let mut out = Vec::new();
        copy_filtered(input.as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello\nworld\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_supervise_bounded() {
        let config = LaunchConfig::new("true");
        supervise(&config, Duration::ZERO, Some(1)).unwrap();
    }
}
