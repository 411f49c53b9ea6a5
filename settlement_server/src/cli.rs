use std::{env, env::VarError};

/// There's no real CLI for the server. Any argument prints the help text and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Only non-secret variables. The gateway keys, webhook hash and admin key are never printed.
    const DISPLAY_ENVS: [&str; 18] = [
        "RUST_LOG",
        "SETTLE_HOST",
        "SETTLE_PORT",
        "SETTLE_DATABASE_URL",
        "SETTLE_RUN_MIGRATIONS",
        "SETTLE_GATEWAY_BASE_URL",
        "SETTLE_GATEWAY_REDIRECT_URL",
        "SETTLE_CATALOG_BASE_URL",
        "SETTLE_USE_X_FORWARDED_FOR",
        "SETTLE_USE_FORWARDED",
        "SETTLE_RELEASE_INTERVAL_SECS",
        "SETTLE_RELEASE_BATCH_SIZE",
        "SETTLE_PAYMENT_GRACE_MINS",
        "SETTLE_PLATFORM_FEE_BPS",
        "SETTLE_MIN_WITHDRAWAL",
        "SETTLE_MAX_WITHDRAWAL",
        "SETTLE_WITHDRAWAL_FEE_BPS",
        "SETTLE_WITHDRAWAL_FEE_FIXED",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
