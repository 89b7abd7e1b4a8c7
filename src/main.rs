use std::env;
use std::process;

use keysonic_cli::{run, Args, Output};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().skip(1).collect();

    let result = Args::parse(&args).and_then(|args| run(&args));

    match result {
        Ok(Output::Stdout(text)) => {
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        Ok(Output::Wrote(path)) => {
            eprintln!("Wrote {}", path.display());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
