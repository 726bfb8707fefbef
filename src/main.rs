use ansi_rgb::{green, Foreground};
use clap::{arg, command, ArgMatches};
use lox_scheme::ast_printer::print_stmts;
use lox_scheme::error::LoxError;
use lox_scheme::Lox;
use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::fs;
use std::process;
use tracing_subscriber::EnvFilter;

const HISTORY_PATH: &str = "history.txt";

fn main() {
    init_tracing();
    let matches = command!()
        .arg(arg!([script] "Lox script to run; starts a prompt when omitted"))
        .arg(arg!(--scheme "Print the program as Scheme instead of running it"))
        .arg(arg!(--pretty "With --scheme, wrap the output in a pretty-print call"))
        .arg(arg!(--ast "Print the parsed program instead of running it"))
        .get_matches();
    if let Some(filename) = matches.value_of("script") {
        run_file(filename, &matches);
    } else {
        run_prompt(&matches);
    }
}

/// Logs only when asked to through `RUST_LOG`.
fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run_file(filename: &str, matches: &ArgMatches) {
    let contents = match fs::read_to_string(filename) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Could not read {}: {}", filename, e);
            process::exit(66);
        }
    };
    let mut lox = Lox::new();
    if let Err(e) = run(&mut lox, &contents, matches) {
        eprintln!("{}", e);
        process::exit(e.exit_code());
    }
}

fn run(lox: &mut Lox, source: &str, matches: &ArgMatches) -> Result<(), LoxError> {
    if matches.is_present("scheme") {
        print!("{}", lox.transpile(source, matches.is_present("pretty"))?);
    } else if matches.is_present("ast") {
        println!("{}", print_stmts(&lox.parse(source)?));
    } else {
        lox.run(source)?;
    }
    Ok(())
}

fn run_prompt(matches: &ArgMatches) {
    let mut rl = Editor::<()>::new();
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No previous history.");
    }
    let mut lox = Lox::new();
    loop {
        let read_line = rl.readline(&">> ".fg(green()).to_string());
        match read_line {
            Ok(line) => {
                rl.add_history_entry(line.as_str());
                if let Err(e) = run(&mut lox, &line, matches) {
                    eprintln!("{}", e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    if let Err(e) = rl.save_history(HISTORY_PATH) {
        eprintln!("Could not save history: {}", e);
    }
}
