use std::{
    error::Error,
    io::{self, BufRead, Write},
    path::PathBuf,
    thread,
};

use alarm_dispatch::{Command, Config, EventSink, Scheduler};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// config file to use instead of the default one
    #[clap(long, short)]
    config: Option<PathBuf>,
    /// overrides `worker_capacity` from the config
    #[clap(long)]
    capacity: Option<usize>,
    #[clap(subcommand)]
    command: Option<Subcommands>,
}

#[derive(Subcommand)]
enum Subcommands {
    /// writes the default config file
    Init {
        #[clap(long, short)]
        force: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    simple_file_logger::init_logger!("alarm_dispatch")
        .map_err(|e| format!("couldn't initialize logger: {e:?}"))?;

    let args = Args::parse();
    let path = match args.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    if let Some(Subcommands::Init { force }) = args.command {
        if force || !path.exists() {
            Config::new().save(path.clone())?;
            println!("wrote {}", path.display());
        } else {
            println!("{} already exists, use --force to overwrite", path.display());
        }
        return Ok(());
    }

    let mut config = Config::load_or_default(path)?;
    if let Some(capacity) = args.capacity {
        config.worker_capacity = capacity;
        config.validate()?;
    }

    let (sink, events) = EventSink::channel();
    let printer = thread::Builder::new()
        .name("printer".to_string())
        .spawn(move || {
            for event in events {
                println!("{event}");
            }
        })?;
    let scheduler = Scheduler::start(&config, sink)?;

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("alarm> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                // rejections are printed from the event stream
                if let Err(e) = scheduler.submit(command) {
                    log::debug!("command rejected: {e}");
                }
            }
            Err(e) => {
                log::debug!("unparsable line {:?}", e.line);
                eprintln!("{e}");
            }
        }
    }

    scheduler.shutdown();
    // the scheduler held the last senders, so the printer sees the channel close
    if printer.join().is_err() {
        log::error!("printer thread panicked");
    }
    Ok(())
}
