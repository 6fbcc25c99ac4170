//! Basic example: drive an interactive shell over a pty
//!
//! Spawns a shell with a known prompt, runs a few commands and reads their
//! output and exit statuses.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example basic_shell
//! cargo run --example basic_shell -- "bash --norc -i"
//! ```

use std::env;
use std::time::Duration;

use shexpect::{CmdOptions, Error, ShellError, ShellSessionBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=shexpect::transcript=info to see the session)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command = env::args().nth(1).unwrap_or_else(|| "sh -i".to_string());
    println!("Spawning {command}...");

    let mut shell = ShellSessionBuilder::new(&command)
        .name("shell")
        .env("PS1", "$ ")
        .env("ENV", "")
        .sink(shexpect::LogSink::Log(log::Level::Info))
        .spawn()
        .await?;
    println!("Shell pid: {}", shell.pid());

    let timeout = Duration::from_secs(10);

    println!("\nExecuting: uname -a");
    println!("{}", "-".repeat(50));
    println!("{}", shell.cmd_output("uname -a", timeout).await?);
    println!("{}", "-".repeat(50));

    let response = shell.cmd_status_output("ls /", timeout).await?;
    println!(
        "\n`{}` exited with {} after {:?} ({} entries)",
        response.command,
        response.status,
        response.elapsed,
        response.lines().count()
    );

    let status = shell.cmd_status("test -d /nonexistent", timeout).await?;
    println!("test -d /nonexistent: {status}");

    // Only 0 is accepted by default
    match shell.cmd("ls /nonexistent", &CmdOptions::default()).await {
        Err(Error::Shell(ShellError::Cmd { status, output, .. })) => {
            println!("ls failed with status {status}: {}", output.trim());
        }
        other => println!("unexpected: {other:?}"),
    }

    let output = shell
        .cmd("ls /nonexistent", &CmdOptions::default().ignore_all_errors(true))
        .await?;
    println!("ignored errors, output: {output:?}");

    println!("\nTerminating...");
    shell.terminate()?;
    println!("Exit status: {:?}", shell.get_status(Duration::from_secs(2)).await);

    Ok(())
}
