// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: registry index URL
fn index_arg() -> Arg {
    Arg::new("index")
        .long("index")
        .value_name("URL")
        .default_value("https://atlaslinux.github.io/pandora/index.acl")
        .help("Registry index URL (http/https or a local path)")
}

fn build_cli() -> Command {
    Command::new("pandora")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Home-directory package manager with an immutable store and atomic profile swaps")
        .subcommand(Command::new("init").about("Initialize the pandora root and run a recovery sweep"))
        .subcommand(
            Command::new("fetch")
                .about("Fetch and cache a package's manifest without installing")
                .arg(Arg::new("name").required(true).help("Package name"))
                .arg(Arg::new("version").required(true).help("Package version"))
                .arg(index_arg()),
        )
        .subcommand(
            Command::new("install")
                .about("Install a package and activate it into a profile")
                .arg(Arg::new("spec").required(true).help("Package spec as name@version"))
                .arg(index_arg())
                .arg(
                    Arg::new("no_activate")
                        .long("no-activate")
                        .action(ArgAction::SetTrue)
                        .help("Import into the store but skip profile activation"),
                )
                .arg(
                    Arg::new("profile")
                        .long("profile")
                        .default_value("default")
                        .help("Profile label to activate into"),
                )
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .action(ArgAction::SetTrue)
                        .help("Assume yes for the activation prompt"),
                ),
        )
        .subcommand(
            Command::new("pack")
                .about("Pack files or directories into a .pnd archive")
                .arg(Arg::new("archive").required(true))
                .arg(Arg::new("inputs").required(true).num_args(1..)),
        )
        .subcommand(
            Command::new("unpack")
                .about("Unpack a .pnd archive")
                .arg(Arg::new("archive").required(true))
                .arg(Arg::new("dest")),
        )
        .subcommand(Command::new("show").about("Show the active profile and store contents"))
        .subcommand(
            Command::new("key-add")
                .about("Trust a manifest-signing key")
                .arg(Arg::new("file").required(true))
                .arg(Arg::new("id").long("id").help("Key id (defaults to the file stem)")),
        )
}

fn main() -> std::io::Result<()> {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR set by cargo"));

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer: Vec<u8> = Vec::new();
    man.render(&mut buffer)?;
    fs::write(out_dir.join("pandora.1"), buffer)?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
