use std::{env, fs, path::PathBuf};

use clap::{Command, arg, value_parser};

fn input_arg() -> clap::Arg {
    arg!(<INPUT> "URL to fetch, local HTML file, or '-' for stdin")
}

fn config_arg() -> clap::Arg {
    arg!(<CONFIG> "Project configuration (YAML, or JSON by extension)").value_parser(value_parser!(PathBuf))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = Command::new("gleaner")
        .version("0.1.0")
        .about("Point-and-click HTML extraction from the command line")
        .arg(arg!(-v --verbose "Enable debug logging").global(true))
        .subcommand(
            Command::new("run")
                .about("Run a project against its targets")
                .arg(config_arg())
                .arg(arg!(--html <INPUT> "Run against this HTML instead of fetching the targets"))
                .arg(
                    arg!(-f --format <FORMAT> "Output format (json, jsonl, sql)")
                        .value_parser(["json", "jsonl", "sql"]),
                )
                .arg(arg!(-o --output <FILE> "Output file (default: stdout)").value_parser(value_parser!(PathBuf)))
                .arg(arg!(--save "Write to the project's output directory"))
                .arg(arg!(-j --jobs <N> "Concurrent fetch workers")),
        )
        .subcommand(
            Command::new("extract")
                .about("Execute a project's rules on one document and print the record")
                .arg(config_arg())
                .arg(input_arg())
                .arg(arg!(--compact "Print the record on a single line")),
        )
        .subcommand(
            Command::new("select")
                .about("Synthesize selectors for the first element a CSS query locates")
                .arg(input_arg())
                .arg(arg!(<CSS> "CSS query locating the element"))
                .arg(arg!(-n --candidates <N> "Number of candidates to print").default_value("3")),
        )
        .subcommand(
            Command::new("detect-list")
                .about("Detect the repeating list around an element")
                .arg(input_arg())
                .arg(arg!(<CSS> "CSS query locating the seed element"))
                .arg(arg!(--contiguous "Only take the run of siblings containing the seed"))
                .arg(arg!(--"max-climb" <N> "Ancestor levels to climb looking for repetition").default_value("0"))
                .arg(arg!(--name <NAME> "Name of the generated list rule").default_value("items")),
        )
        .subcommand(
            Command::new("detect-table")
                .about("Detect the table around a cell")
                .arg(input_arg())
                .arg(arg!(<CSS> "CSS query locating a cell"))
                .arg(arg!(--name <NAME> "Name of the generated list rule").default_value("table_data")),
        )
        .subcommand(
            Command::new("test")
                .about("Probe every rule's selector against a document")
                .arg(config_arg())
                .arg(input_arg())
                .arg(arg!(--json "Print probe results as JSON")),
        )
        .subcommand(Command::new("schema").about("Print SQL DDL for a project's tables").arg(config_arg()))
        .arg(
            arg!(--completions <SHELL> "Generate shell completion script")
                .value_name("SHELL")
                .value_parser(["bash", "zsh", "fish", "powershell"]),
        );

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "gleaner", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "gleaner", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "gleaner", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "gleaner", &completions_dir).unwrap();

    println!("cargo:warning=Shell completions generated in: {}", completions_dir.display());
}
