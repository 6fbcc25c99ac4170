//! Non-tty example: drive a shell over pipes
//!
//! Without a terminal there is no prompt and no echo. Every command is
//! followed by a marker line carrying its exit status, which tells the
//! session where the output ends.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example nontty_pipes
//! ```

use std::time::Duration;

use shexpect::{LogSink, ShellSessionBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let sink = LogSink::store();
    let mut shell = ShellSessionBuilder::new("sh")
        .name("pipes")
        .use_pty(false)
        .tty(false)
        .sink(sink.clone())
        .spawn()
        .await?;

    let timeout = Duration::from_secs(10);

    let response = shell
        .cmd_status_output("echo out; echo err >&2; (exit 3)", timeout)
        .await?;
    println!("output:\n{response}");
    println!("status: {}", response.status);

    let listing = shell.cmd_output("ls / | head -n 5", timeout).await?;
    for line in listing.lines() {
        println!("  {line}");
    }

    shell.terminate()?;

    println!("\nTranscript:");
    if let Some(records) = sink.records() {
        println!("{records}");
    }

    Ok(())
}
