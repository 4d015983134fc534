use clap::Parser;
use kmersieve::filter::{self, Args};

fn main() {
    let args = Args::parse();
    if let Err(e) = filter::run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
