pub mod config;
pub mod crawl;
pub mod report;

use colored::Colorize;

pub fn print_banner() {
    let banner = r#"
   __       _ _                                       _
  / _| ___ | | | _____      ____ _ _ __ __ _ _ __ | |__
 | |_ / _ \| | |/ _ \ \ /\ / / _` | '__/ _` | '_ \| '_ \
 |  _| (_) | | | (_) \ V  V / (_| | | | (_| | |_) | | | |
 |_|  \___/|_|_|\___/ \_/\_/ \__, |_|  \__,_| .__/|_| |_|
                             |___/          |_|
"#;
    eprintln!("{}", banner.bright_magenta());
    eprintln!(
        "  {} {}\n",
        "follower graph crawler".bright_white().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
