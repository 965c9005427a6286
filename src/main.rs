use anyhow::Result;
use std::time;
use xcf::{
    cli::{parse_cli, init_verbose, Command, FULL_VERSION},
    commands::{concat, fill_tags, gtcheck, view},
    utils::util::handle_error_and_exit,
};

fn runner() -> Result<()> {
    let cli = parse_cli();
    init_verbose(&cli);
    log::trace!("CLI options set: {:?}", cli);

    log::info!(
        "Running {}-{} [{}]",
        env!("CARGO_PKG_NAME"),
        *FULL_VERSION,
        cli.command.name()
    );

    let start_timer = time::Instant::now();
    match cli.command {
        Command::View(args) => view(args)?,
        Command::Concat(args) => concat(args)?,
        Command::FillTags(args) => fill_tags(args)?,
        Command::Gtcheck(args) => gtcheck(args)?,
    }
    log::info!("Total execution time: {:.2?}", start_timer.elapsed());

    log::info!("{} end", env!("CARGO_PKG_NAME"));
    Ok(())
}

fn main() {
    if let Err(e) = runner() {
        handle_error_and_exit(e);
    }
}
