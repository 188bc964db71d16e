//! Workspace tasks for relpool.
//!
//! Run with `cargo xtask <command>`. `ci` runs the offline checks and, when
//! `PG_HOST` is set, the live PostgreSQL tests as well.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use xshell::{Shell, cmd};

/// Variables read by the live tests and the demo.
const PG_VARS: [&str; 5] = ["PG_HOST", "PG_PORT", "PG_USERNAME", "PG_PASSWORD", "PG_DBNAME"];

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace tasks for relpool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check formatting, lint, run the mock-driver tests, then the live tests if PG_HOST is set
    Ci,
    /// Check formatting
    Fmt,
    /// Lint every crate and target, warnings denied
    Clippy,
    /// Run the tests that need no database
    Test,
    /// Run the ignored relpool-postgres tests against the server named by PG_*
    LiveTest,
    /// Run the demo binary against the server named by PG_* or an env file
    Demo {
        /// Env file passed to the demo
        #[arg(long, default_value = ".env")]
        env_file: PathBuf,
    },
    /// Fuzz a connection-setting parser (needs nightly and cargo-fuzz)
    Fuzz {
        #[arg(value_enum)]
        target: FuzzTarget,
        /// Stop after this many seconds
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
    /// Build the API documentation
    Doc,
}

#[derive(Clone, Copy, ValueEnum)]
enum FuzzTarget {
    ConnectionString,
    ParseDuration,
}

impl FuzzTarget {
    fn name(self) -> &'static str {
        match self {
            Self::ConnectionString => "connection_string",
            Self::ParseDuration => "parse_duration",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.command {
        Command::Ci => ci(&sh)?,
        Command::Fmt => fmt(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Test => test(&sh)?,
        Command::LiveTest => live_test(&sh)?,
        Command::Demo { env_file } => demo(&sh, env_file)?,
        Command::Fuzz { target, seconds } => fuzz(&sh, target, seconds)?,
        Command::Doc => doc(&sh)?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout).context("invalid UTF-8 in cargo output")?;
    Ok(PathBuf::from(path.trim())
        .parent()
        .context("failed to get workspace root")?
        .to_path_buf())
}

fn ci(sh: &Shell) -> Result<()> {
    fmt(sh)?;
    clippy(sh)?;
    test(sh)?;

    if std::env::var_os("PG_HOST").is_some() {
        live_test(sh)?;
    } else {
        println!("PG_HOST is not set; skipping live PostgreSQL tests.");
        println!("Point PG_* at a disposable database and run `cargo xtask live-test`.");
    }
    Ok(())
}

fn fmt(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo test --workspace").run()?;
    Ok(())
}

fn live_test(sh: &Shell) -> Result<()> {
    let missing: Vec<&str> = PG_VARS
        .into_iter()
        .filter(|var| std::env::var_os(var).is_none())
        .collect();
    if !missing.is_empty() {
        println!("Unset, using test defaults: {}", missing.join(", "));
    }
    cmd!(sh, "cargo test -p relpool-postgres --test live -- --ignored").run()?;
    Ok(())
}

fn demo(sh: &Shell, env_file: PathBuf) -> Result<()> {
    if !env_file.exists() && std::env::var_os("PG_HOST").is_none() {
        bail!(
            "{} not found and PG_HOST is not set; the demo needs {}",
            env_file.display(),
            PG_VARS.join(", ")
        );
    }
    cmd!(sh, "cargo run -p relpool-demo -- --env-file {env_file}").run()?;
    Ok(())
}

fn fuzz(sh: &Shell, target: FuzzTarget, seconds: u64) -> Result<()> {
    let _dir = sh.push_dir("fuzz");
    let name = target.name();
    let max_time = format!("-max_total_time={seconds}");
    cmd!(sh, "cargo +nightly fuzz run {name} -- {max_time}").run()?;
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo doc --workspace --no-deps").run()?;
    Ok(())
}
