use clap::{Arg, Command};
use coordinator::{Coordinator, CoordinatorConfig};
use tracing::{error, info};

fn validate_port(value: &str) -> Result<u16, String> {
    value
        .parse::<u16>()
        .map_err(|_| "Invalid port number".to_owned())
}

fn validate_namespace(value: &str) -> Result<String, String> {
    if value.is_empty() || value.contains('.') {
        return Err("Namespace must be non-empty and must not contain '.'".to_owned());
    }
    Ok(value.to_owned())
}

/// Parse `ns=host:port[,ns=host:port...]`.
fn validate_seed_nodes(value: &str) -> Result<Vec<(String, String)>, String> {
    value
        .split(',')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (namespace, address) = pair
                .split_once('=')
                .ok_or_else(|| format!("Expected ns=host:port, got '{pair}'"))?;
            validate_namespace(namespace)?;
            let port = address
                .rsplit_once(':')
                .map(|(_, port)| port)
                .ok_or_else(|| format!("Address '{address}' is missing a port"))?;
            validate_port(port)?;
            Ok((namespace.to_owned(), address.to_owned()))
        })
        .collect()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "coordinator starting");

    let matches = Command::new("Benchlink Coordinator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Control-plane message router hosting one namespace")
        .arg(
            Arg::new("port")
                .help("The control port to listen on")
                .short('p')
                .long("port")
                .value_parser(validate_port)
                .default_value("12300"),
        )
        .arg(
            Arg::new("namespace")
                .help("The namespace hosted by this coordinator (default: host name)")
                .short('n')
                .long("namespace")
                .value_parser(validate_namespace),
        )
        .arg(
            Arg::new("coordinators")
                .help("Peer coordinators to join, as ns=host:port[,ns=host:port...]")
                .short('c')
                .long("coordinators")
                .value_parser(validate_seed_nodes),
        )
        .get_matches();

    let config = CoordinatorConfig {
        port: *matches.get_one::<u16>("port").expect("port has a default"),
        namespace: matches.get_one::<String>("namespace").cloned(),
        seed_nodes: matches
            .get_one::<Vec<(String, String)>>("coordinators")
            .cloned()
            .unwrap_or_default(),
        ..CoordinatorConfig::default()
    };

    let coordinator = match Coordinator::bind(config).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        outcome = coordinator.run() => {
            if let Err(e) = outcome {
                error!(error = %e, "coordinator failed");
                std::process::exit(2);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_node_lists_parse_and_validate() {
        let nodes =
            validate_seed_nodes("N2=127.0.0.1:60001,N3=lab-pc:12300").expect("valid list");
        assert_eq!(
            nodes,
            vec![
                ("N2".to_owned(), "127.0.0.1:60001".to_owned()),
                ("N3".to_owned(), "lab-pc:12300".to_owned()),
            ]
        );

        assert!(validate_seed_nodes("N2").is_err());
        assert!(validate_seed_nodes("N2=nohost").is_err());
        assert!(validate_seed_nodes("bad.ns=127.0.0.1:1").is_err());
    }
}
