// coolcache-server: in-memory key-value server speaking RESP.

use clap::{Arg, Command};
use server::ServerConfig;
use server::config::{apply_config_file, parse_save_schedule};
use std::path::PathBuf;
use tracing::info;

fn validate_port_value(value: &str) -> Result<u16, String> {
    value
        .parse::<u16>()
        .map_err(|_| "Invalid port number".to_owned())
}

fn validate_save_value(value: &str) -> Result<String, String> {
    parse_save_schedule(value)
        .map(|_| value.to_owned())
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "coolcache starting");

    let matches = Command::new("CoolCache Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("An in-memory key-value server speaking the RESP protocol")
        .arg(
            Arg::new("port")
                .help("The port to listen on")
                .short('p')
                .long("port")
                .value_parser(validate_port_value)
                .default_value("6379"),
        )
        .arg(
            Arg::new("dir")
                .help("Directory holding the snapshot file")
                .long("dir")
                .default_value("./"),
        )
        .arg(
            Arg::new("dbfilename")
                .help("Snapshot file name inside --dir")
                .long("dbfilename")
                .default_value("dump.rdb"),
        )
        .arg(
            Arg::new("replicaof")
                .help("Run as a follower of the given leader. Eg. --replicaof 10.0.0.5 6379")
                .long("replicaof")
                .num_args(2)
                .value_names(["HOST", "PORT"]),
        )
        .arg(
            Arg::new("save")
                .help("Auto-save schedule as alternating seconds/changes. Eg. \"900 1 300 10\"")
                .long("save")
                .value_parser(validate_save_value),
        )
        .arg(
            Arg::new("config")
                .help("Optional TOML config file")
                .long("config"),
        )
        .get_matches();

    let mut config = ServerConfig::default();

    if let Some(path) = matches.get_one::<String>("config")
        && let Err(e) = apply_config_file(&mut config, &PathBuf::from(path))
    {
        eprintln!("FATAL: failed to load config: {}", e);
        std::process::exit(1);
    }

    config.port = *matches.get_one::<u16>("port").expect("port has a default");
    config.dir = PathBuf::from(matches.get_one::<String>("dir").expect("dir has a default"));
    config.dbfilename = matches
        .get_one::<String>("dbfilename")
        .expect("dbfilename has a default")
        .clone();
    if let Some(mut replicaof) = matches.get_many::<String>("replicaof") {
        let host = replicaof.next().expect("clap enforces two values").clone();
        let port = replicaof.next().expect("clap enforces two values");
        let port = match port.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                eprintln!("FATAL: invalid --replicaof port '{}'", port);
                std::process::exit(1);
            }
        };
        config.replicaof = Some((host, port));
    }
    if let Some(save) = matches.get_one::<String>("save") {
        config.save_schedule = parse_save_schedule(save).expect("validated by clap");
    }

    if let Err(e) = server::run(config).await {
        eprintln!("FATAL: {}", e);
        std::process::exit(1);
    }
}
