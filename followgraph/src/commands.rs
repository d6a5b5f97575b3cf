use crate::CLAP_STYLING;
use clap::{arg, command};
use followgraph_core::config::SESSION_ENV;
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("followgraph")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("followgraph")
        .styles(CLAP_STYLING)
        .about("Crawls the follower graph around an account, politely")
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" ... "Increase log verbosity (-v info, -vv debug, -vvv trace)")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(--"session-id" <SESSION_ID>)
                .required(false)
                .env(SESSION_ENV)
                .hide_env_values(true)
                .help("Value of the sessionid cookie of a logged-in account (default: anonymous)")
                .global(true),
        )
        .arg(
            arg!(--"base-url" <URL>)
                .required(false)
                .help("Override the remote host")
                .value_parser(clap::value_parser!(Url))
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            command!("profile")
                .about("Look up a single account and print it as JSON")
                .arg(arg!(<USERNAME>).help("The account to look up")),
        )
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl followers outward from an account, generation by generation, \
                honouring rate and depth limits.",
                )
                .arg(arg!(<USERNAME>).help("The account to start from"))
                .arg(
                    arg!(-l --"limits" <PATH>)
                        .required(false)
                        .help("JSON file with crawl limits (missing keys keep their defaults)"),
                )
                .arg(
                    arg!(-g --"generations" <NUM>)
                        .required(false)
                        .help("Generations to explore beyond the root's own followers")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(
                    arg!(--"followers" <NUM>)
                        .required(false)
                        .help("Maximum followers kept per account, 0 for unlimited")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of async workers fetching pages in parallel.")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"include-following")
                        .required(false)
                        .help("Also crawl the accounts each user follows")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"no-images")
                        .required(false)
                        .help("Skip downloading profile pictures")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
}
