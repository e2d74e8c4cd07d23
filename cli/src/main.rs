use anyhow::{anyhow, Result};
use chrono::Local;
use clap::Parser;

use dirwatch::{DirWatcher, Error, EventMask, WatchEvent};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to directory to watch
    #[arg(default_value = ".")]
    path: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut watcher = DirWatcher::open(&args.path, EventMask::all())
        .map_err(|e| anyhow!("can't watch {}: {}", args.path, e))?;
    println!("watching {} for changes...", args.path);

    loop {
        let event = watcher.watch().map_err(|e| anyhow!("watch failed: {}", e))?;
        print_event(&event, watcher.last_error());
    }
}

fn print_event(event: &WatchEvent, error: Option<Error>) {
    let time = Local::now().format("%H:%M:%S");

    if event.kind.contains(EventMask::CREATE) {
        println!("[{}] created: {}", time, event.name);
    } else if event.kind.contains(EventMask::MODIFY) {
        println!("[{}] modified: {}", time, event.name);
    } else if event.kind.contains(EventMask::DELETE) {
        println!("[{}] deleted: {}", time, event.name);
    } else if event.kind.contains(EventMask::RENAME) {
        let old = if event.name.is_empty() {
            "?"
        } else {
            event.name.as_str()
        };
        match &event.new_name {
            Some(new_name) => println!("[{}] rename: {} -> {}", time, old, new_name),
            None => println!("[{}] rename: {} -> ?", time, old),
        }
        if error == Some(Error::IncompleteEvent) {
            println!("[{}] ({})", time, Error::IncompleteEvent);
        }
    }
}
