// coolcache-cli: interactive shell for a CoolCache server.
//
// Host and port come from flags, falling back to COOLCACHE_HOST and
// COOLCACHE_PORT, then to localhost:6379.

use clap::{Arg, Command};
use coolcache::{ShellClient, format_reply};
use std::env;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn validate_port_value(value: &str) -> Result<u16, String> {
    value
        .parse::<u16>()
        .map_err(|_| "Invalid port number".to_owned())
}

#[tokio::main]
async fn main() {
    let matches = Command::new("CoolCache CLI")
        .version(env!("CARGO_PKG_VERSION"))
        .about("An interactive client for the CoolCache server")
        .arg(
            Arg::new("host")
                .help("Server host to connect to (default: COOLCACHE_HOST or 127.0.0.1)")
                .short('H')
                .long("host"),
        )
        .arg(
            Arg::new("port")
                .help("Server port to connect to (default: COOLCACHE_PORT or 6379)")
                .short('p')
                .long("port")
                .value_parser(validate_port_value),
        )
        .get_matches();

    let host = matches
        .get_one::<String>("host")
        .cloned()
        .or_else(|| env::var("COOLCACHE_HOST").ok())
        .unwrap_or_else(|| "127.0.0.1".to_owned());
    let port = matches.get_one::<u16>("port").copied().unwrap_or_else(|| {
        env::var("COOLCACHE_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(6379)
    });
    let host = host.as_str();

    let mut client = match ShellClient::connect(host, port).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not connect to {}:{}: {}", host, port, e);
            std::process::exit(1);
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout
            .write_all(format!("{}:{}> ", host, port).as_bytes())
            .await
            .expect("stdout");
        stdout.flush().await.expect("stdout");

        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        let tokens: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens[0].eq_ignore_ascii_case("exit") {
            break;
        }
        match client.request(&tokens).await {
            Ok(reply) => println!("{}", format_reply(&reply)),
            Err(e) => {
                eprintln!("{}", e);
                break;
            }
        }
        // QUIT is answered, then the server closes; mirror that here.
        if tokens[0].eq_ignore_ascii_case("quit") {
            break;
        }
    }
}
