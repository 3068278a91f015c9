use clap::{Arg, Command};
use proxy::{Proxy, ProxyConfig};
use tracing::{error, info};

fn validate_port(value: &str) -> Result<u16, String> {
    value
        .parse::<u16>()
        .map_err(|_| "Invalid port number".to_owned())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "proxy starting");

    let matches = Command::new("Benchlink Proxy")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Data-plane fan-out relay for measurement and log streams")
        .arg(
            Arg::new("ingress_port")
                .help("The port publishers connect to")
                .long("ingress-port")
                .value_parser(validate_port)
                .default_value("11100"),
        )
        .arg(
            Arg::new("egress_port")
                .help("The port subscribers connect to")
                .long("egress-port")
                .value_parser(validate_port)
                .default_value("11099"),
        )
        .get_matches();

    let config = ProxyConfig {
        ingress_port: *matches
            .get_one::<u16>("ingress_port")
            .expect("ingress port has a default"),
        egress_port: *matches
            .get_one::<u16>("egress_port")
            .expect("egress port has a default"),
        ..ProxyConfig::default()
    };

    let proxy = match Proxy::bind(config).await {
        Ok(proxy) => proxy,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        outcome = proxy.run() => {
            if let Err(e) = outcome {
                error!(error = %e, "proxy failed");
                std::process::exit(2);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
}
