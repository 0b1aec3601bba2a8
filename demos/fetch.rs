//! Fetch a URL that may require Negotiate or NTLM authentication and print
//! the JSON it returns.
//!
//! # Usage
//!
//! ```bash
//! # as the current login session, against http://localhost:3000
//! cargo run --example fetch --features sspi
//!
//! # as someone else, against an explicit SPN
//! cargo run --example fetch --features sspi -- --url http://web.corp/api \
//!     -t HTTP/web.corp -u alice -p secret -d CORP
//! ```
//!
//! Set `RUST_LOG=negotiate_http=debug` to watch the handshake rounds.

use std::env;
use std::fmt;
use std::process;

const DEFAULT_URL: &str = "http://localhost:3000";
const DEFAULT_DOMAIN: &str = "LOCAL";

fn usage() -> ! {
    eprintln!("Usage: fetch [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --url <url>              Absolute url (default: {})", DEFAULT_URL);
    eprintln!("  -t, --target <spn>       Target name (SPN)");
    eprintln!("  -u, --user <user>        Run as user");
    eprintln!("  -p, --password <pass>    User password");
    eprintln!("  -d, --domain <domain>    Windows domain (default: {})", DEFAULT_DOMAIN);
    eprintln!("  -h, --help               Print this help");
    process::exit(1);
}

#[derive(Default)]
struct Args {
    url: Option<String>,
    target: Option<String>,
    user: Option<String>,
    password: Option<String>,
    domain: Option<String>,
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("url", &self.url)
            .field("target", &self.target)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("domain", &self.domain)
            .finish()
    }
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut iter = env::args().skip(1);
    while let Some(flag) = iter.next() {
        let slot = match flag.as_str() {
            "--url" => &mut args.url,
            "-t" | "--target" => &mut args.target,
            "-u" | "--user" => &mut args.user,
            "-p" | "--password" => &mut args.password,
            "-d" | "--domain" => &mut args.domain,
            "-h" | "--help" => usage(),
            // a bare argument is the url
            other if !other.starts_with('-') && args.url.is_none() => {
                args.url = Some(other.to_owned());
                continue;
            }
            _ => usage(),
        };
        *slot = Some(iter.next().unwrap_or_else(|| usage()));
    }
    args
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = parse_args();
    log::debug!("args: {:?}", args);
    let url = args.url.as_deref().unwrap_or(DEFAULT_URL);

    let mut client = negotiate_http::Client::builder().build()?;
    if let Some(user) = args.user {
        client.set_credentials(
            args.domain.as_deref().unwrap_or(DEFAULT_DOMAIN),
            user,
            args.password.unwrap_or_default(),
        )?;
    }
    if let Some(target) = args.target {
        client.set_target_name(target)?;
    }

    match client.fetch(url).await {
        Ok(response) => {
            println!("status: {} after {} round(s)", response.status(), response.rounds());
            let json: serde_json::Value = response.json().await?;
            println!("json: {:#}", json);
        }
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(2);
        }
    }

    Ok(())
}
