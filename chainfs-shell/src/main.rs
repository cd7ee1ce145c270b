mod shell;

use std::io::{self, BufRead, Write};
use std::process;

use chainfs::{ChainFs, FileBlockEmulator};
use clap::{value_parser, Arg, Command};
use log::info;

use crate::shell::{Outcome, Shell};

pub fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("chainfs: {}", e);
        process::exit(1);
    }
}

fn run() -> chainfs::Result<()> {
    let matches = Command::new("chainfs")
        .about("Interactive shell over a chained block file system image")
        .arg(
            Arg::new("disk")
                .short('d')
                .long("disk")
                .value_name("PATH")
                .default_value("disk.img")
                .help("Backing file of the volume, created when missing"),
        )
        .arg(
            Arg::new("blocks")
                .short('b')
                .long("blocks")
                .value_name("N")
                .default_value("2048")
                .value_parser(value_parser!(usize))
                .help("Blocks in the volume; an existing smaller volume is grown"),
        )
        .get_matches();

    let disk = matches
        .get_one::<String>("disk")
        .map_or("disk.img", String::as_str);
    let blocks = matches.get_one::<usize>("blocks").copied().unwrap_or(2048);

    let fs: ChainFs<FileBlockEmulator> = ChainFs::open_or_create(disk, blocks)?;
    info!("opened {} with {} blocks", disk, fs.disk().num_blocks());
    let mut shell = Shell::new(fs)?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", shell.prompt());
        io::stdout().flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        match shell.execute(&line) {
            Ok(Outcome::Continue(output)) => print!("{}", output),
            Ok(Outcome::Exit) => break,
            Err(e) => eprintln!("{}", e),
        }
    }
    shell.sync()
}
