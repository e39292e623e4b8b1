use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use manning_tune::cli::{execute, get_args};

fn main() -> Result<()> {
    let args = get_args();
    let settings = args.load_settings()?;
    manning_tune::log::init(&settings.log_level)?;

    // Ctrl+C only raises the flag; the runner does the cleanup
    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = interrupt.clone();
        ctrlc::set_handler(move || interrupt.store(true, Ordering::SeqCst))
            .context("Failed to set Ctrl+C handler")?;
    }

    execute(args.command, &settings, interrupt)
}
