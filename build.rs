// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn engine_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("url")
            .short('u')
            .long("url")
            .required(true)
            .value_name("URL")
            .help("Database connection string (SQLite file path or :memory:)"),
    )
    .arg(
        Arg::new("location")
            .short('l')
            .long("location")
            .value_name("DIR")
            .default_value("Sql_Scripts")
            .help("Directory containing migration scripts (repeatable)"),
    )
    .arg(
        Arg::new("schema")
            .short('s')
            .long("schema")
            .value_name("NAME")
            .help("Schema managed by the engine (repeatable)"),
    )
    .arg(
        Arg::new("metadata_table")
            .long("metadata-table")
            .value_name("NAME")
            .default_value("changelog")
            .help("Name of the metadata table"),
    )
    .arg(
        Arg::new("placeholder")
            .short('p')
            .long("placeholder")
            .value_name("KEY=VALUE")
            .help("Placeholder value substituted into script bodies (repeatable)"),
    )
}

fn build_cli() -> Command {
    Command::new("sqlshift")
        .version(env!("CARGO_PKG_VERSION"))
        .author("sqlshift Contributors")
        .about("Schema migration engine with versioned SQL scripts")
        .subcommand_required(false)
        .subcommand(
            engine_args(Command::new("migrate"))
                .about("Apply outstanding migrations up to the target version")
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .value_name("VERSION")
                        .default_value("latest")
                        .help("Version cap, or \"latest\""),
                ),
        )
        .subcommand(
            engine_args(Command::new("validate"))
                .about("Check the recorded history against the on-disk scripts"),
        )
        .subcommand(
            engine_args(Command::new("repair"))
                .about("Rewrite ledger checksums to match the on-disk scripts"),
        )
        .subcommand(
            engine_args(Command::new("erase"))
                .about("Drop or empty the managed schemas, consent markers permitting")
                .arg(
                    Arg::new("disabled")
                        .long("disabled")
                        .action(clap::ArgAction::SetTrue)
                        .help("Safety switch: log and do nothing"),
                ),
        )
        .subcommand(
            engine_args(Command::new("info"))
                .about("Show discovered scripts and the ledger state"),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("sqlshift.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
