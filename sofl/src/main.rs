#[macro_use]
extern crate clap;

use clap::{AppSettings, Arg, SubCommand};
use std::path::Path;

fn input_arg<'a, 'b>(help: &'a str) -> Arg<'a, 'b> {
    Arg::with_name("INPUT").help(help).required(true).index(1)
}

fn lib_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("lib")
        .long("lib")
        .takes_value(true)
        .value_name("LIB")
        .default_value("slib")
        .help("Root directory for @/ library imports")
}

fn main() {
    tracing_subscriber::fmt::init();

    let matches = app_from_crate!()
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("parse")
                .about("Parse source into a JSON syntax tree")
                .arg(input_arg("Input .sofl file")),
        )
        .subcommand(
            SubCommand::with_name("analyze-validate-translate")
                .about("Analyze a parsed tree, validate it, and emit assembly")
                .arg(input_arg("Input .json file")),
        )
        .subcommand(
            SubCommand::with_name("execute")
                .about("Execute assembly on the abstract machine")
                .arg(input_arg("Input .sasm or .bsasm file")),
        )
        .subcommand(
            SubCommand::with_name("binarify")
                .about("Compact textual assembly into a binary image")
                .arg(input_arg("Input .sasm file")),
        )
        .subcommand(
            SubCommand::with_name("compile-and-run")
                .about("Compile a program and run it on the board")
                .arg(input_arg("Input .sofl file"))
                .arg(lib_arg()),
        )
        .subcommand(
            SubCommand::with_name("compile-and-debug")
                .about("Compile a program and step it interactively")
                .arg(input_arg("Input .sofl file"))
                .arg(lib_arg()),
        )
        .get_matches();

    let outcome = match matches.subcommand() {
        ("parse", Some(sub)) => {
            let input = Path::new(sub.value_of("INPUT").unwrap());
            sofl::parse(input).map(|_| ())
        }
        ("analyze-validate-translate", Some(sub)) => {
            let input = Path::new(sub.value_of("INPUT").unwrap());
            sofl::analyze_validate_translate(input).map(|_| ())
        }
        ("execute", Some(sub)) => {
            let input = Path::new(sub.value_of("INPUT").unwrap());
            sofl::execute(input).map(|execution| {
                println!("{}", execution.output);
                println!("Steps: {}", execution.steps);
            })
        }
        ("binarify", Some(sub)) => {
            let input = Path::new(sub.value_of("INPUT").unwrap());
            sofl::binarify(input).map(|_| ())
        }
        ("compile-and-run", Some(sub)) => {
            let input = Path::new(sub.value_of("INPUT").unwrap());
            let lib = Path::new(sub.value_of("lib").unwrap());
            sofl::compile_and_run(input, lib).map(|execution| {
                println!("{}", execution.output);
                println!("Cycles: {}", execution.steps);
            })
        }
        ("compile-and-debug", Some(sub)) => {
            let input = Path::new(sub.value_of("INPUT").unwrap());
            let lib = Path::new(sub.value_of("lib").unwrap());
            sofl::compile_and_debug(input, lib)
        }
        _ => unreachable!(),
    };

    if let Err(err) = outcome {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
