use std::process::ExitCode;

fn main() -> ExitCode {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();

    nodeconf_cli::run()
}
