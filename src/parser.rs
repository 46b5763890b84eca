//! This module is responsible for parsing the command line.

use clap::Parser;

/// Send ICMP echo requests to a host until interrupted.
#[derive(Parser, Debug)]
#[command(name = "icmp-ping", version, about, long_about = None)]
pub struct Cli {
    /// Host name or IPv4 address to ping
    pub hostname: Option<String>,
}

pub fn usage(program: &str) -> String {
    format!("Usage: sudo {} hostname", program)
}

/// Parses the command line and returns the hostname to ping.
///
/// Prints usage to stdout and exits with status 1 when no hostname is given.
pub fn parse_input() -> String {
    let cli = Cli::parse();
    match cli.hostname.filter(|h| !h.is_empty()) {
        Some(host) => host,
        None => {
            let program = std::env::args().next().unwrap_or_else(|| "icmp-ping".into());
            println!("{}", usage(&program));
            std::process::exit(1)
        }
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::{usage, Cli};

    #[test]
    fn hostname() {
        let cli = Cli::try_parse_from(["icmp-ping", "example.com"]).unwrap();
        assert_eq!(cli.hostname.as_deref(), Some("example.com"));
    }

    #[test]
    fn missing_hostname_is_not_a_clap_error() {
        let cli = Cli::try_parse_from(["icmp-ping"]).unwrap();
        assert!(cli.hostname.is_none());
    }

    #[test]
    fn too_many_arguments() {
        assert!(Cli::try_parse_from(["icmp-ping", "a", "b"]).is_err());
    }

    #[test]
    fn usage_line() {
        assert_eq!(usage("./ping"), "Usage: sudo ./ping hostname");
    }
}
