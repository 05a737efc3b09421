use std::path::PathBuf;

use clap::Parser;

use oberon0c::cli;
use oberon0c::logger;

#[derive(Parser, Debug)]
#[command(name = "oberon0c", about = "Oberon-0 compiler")]
struct Args {
    /// Turn on verbose logging.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    action: Action,
}

#[derive(clap::Subcommand, Debug)]
enum Action {
    /// Checks files for problems without emitting code.
    Check { files: Vec<PathBuf> },
    /// Compiles a module to an instruction listing.
    Compile {
        file: PathBuf,

        /// Write the listing to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Prints the version.
    Version,
}

pub fn main() -> Result<(), String> {
    let args = Args::parse();

    logger::configure(args.verbose)?;

    match args.action {
        Action::Check { files } => cli::check(files, false),
        Action::Compile { file, output } => cli::compile(file, output, false),
        Action::Version => {
            println!("oberon0c version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
