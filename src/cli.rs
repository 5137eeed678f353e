use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("quota-guard")
        .about("Probe a rate-limited HTTP API from behind a client-side quota guard")
        .arg(
            Arg::new("url")
                .long("url")
                .num_args(1)
                .help("Target URL to request"),
        )
        .arg(
            Arg::new("count")
                .long("count")
                .num_args(1)
                .value_parser(clap::value_parser!(u32))
                .default_value("1")
                .help("Number of guarded requests to issue"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
}

pub fn init_logging(level: Option<&str>) {
    // Respect explicit level, else default to info, allow env override via RUST_LOG
    if let Some(lvl) = level {
        std::env::set_var("RUST_LOG", lvl);
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
