//! Process example: one-shot commands and the process tree
//!
//! Runs a command to completion with [`shexpect::execute`], then starts a
//! background job in a shell session and lists the shell's children.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example processes
//! ```

use std::time::Duration;

use shexpect::process::Signal;
use shexpect::{Session, ShellSessionBuilder, execute};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let date = execute("date -u", Duration::from_secs(5)).await?;
    println!("date: {}", date.trim());

    let mut shell = ShellSessionBuilder::new("sh -i")
        .env("PS1", "$ ")
        .env("ENV", "")
        .spawn()
        .await?;

    shell.cmd_output("sleep 30 &", Duration::from_secs(5)).await?;
    for child in shell.child_pids(|child| child.command.starts_with("sleep"))? {
        println!("child {}: {}", child.pid, child.command);
    }
    shell.terminate()?;

    // A bare session, interrupted with a signal
    let session = Session::spawn("sleep 30", true)?;
    session.kill(Signal::SIGINT)?;
    println!(
        "sleep exited with {:?}",
        session.get_status(Duration::from_secs(2)).await
    );

    Ok(())
}
