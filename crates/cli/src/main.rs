//! Podium operator CLI
//!
//! A command-line tool for adding hosts, running probes between them and
//! reading back pass rates and latency from the podium daemon.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use client::{MeshRequest, RunTrafficRequest};
use commands::{hosts, params, results, traffic};

/// Podium CLI
#[derive(Parser)]
#[command(name = "podctl")]
#[command(author, version, about = "CLI for the Podium traffic verification control plane", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via PODIUM_API_URL env var)
    #[arg(long, env = "PODIUM_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Transport a probe runs over
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
}

impl Protocol {
    fn as_wire(self) -> String {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Http => "HTTP",
        }
        .to_string()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage agent hosts
    #[command(subcommand)]
    Hosts(HostsCommands),

    /// Register a single probe from SRC to DST
    Run {
        /// Source endpoint
        #[arg(long)]
        src: String,

        /// Destination endpoint
        #[arg(long)]
        dst: String,

        /// Destination port
        #[arg(long, short)]
        port: u16,

        /// Probe protocol
        #[arg(long, value_enum, default_value = "tcp")]
        protocol: Protocol,

        /// Expect the probe to fail
        #[arg(long)]
        expect_fail: bool,

        /// Stop the request after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Register a probe between every ordered pair of hosts
    Mesh {
        /// Hosts taking part (comma separated or repeated)
        #[arg(required = true, value_delimiter = ',')]
        hosts: Vec<String>,

        /// Destination port
        #[arg(long, short)]
        port: u16,

        /// Probe protocol
        #[arg(long, value_enum, default_value = "tcp")]
        protocol: Protocol,

        /// Expect the probes to fail
        #[arg(long)]
        expect_fail: bool,

        /// Stop the request after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Start every rule of a request
    Start {
        /// Request ID
        reqid: String,
    },

    /// Stop every rule of a request
    Stop {
        /// Request ID
        reqid: String,
    },

    /// List the rules of a request
    Rules {
        /// Request ID
        reqid: String,
    },

    /// Feed placeholder records for a request through the local pipeline
    Mock {
        /// Request ID
        reqid: String,
    },

    /// Show the records of a request
    Results {
        /// Request ID
        reqid: String,

        /// Only records from the last N seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Record filter as key=value (result, source, destination, protocol, port, ruleid)
        #[arg(long = "filter", short = 'F')]
        filters: Vec<String>,
    },

    /// Show pass and fail counts and percentages
    Stats {
        /// Request ID
        reqid: String,

        /// Only records from the last N seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Show fleet-wide latency
    Latency {
        /// Request ID
        reqid: String,

        /// Reduction (avg, min, max)
        #[arg(long, short, default_value = "avg")]
        method: String,

        /// Only records from the last N seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Read or write agent parameters
    #[command(subcommand)]
    Param(ParamCommands),

    /// Show the coordinator's primary monitor
    Monitor,
}

#[derive(Subcommand)]
pub enum HostsCommands {
    /// Provision hosts and learn their endpoints
    Add {
        /// Hosts to add (comma separated or repeated)
        #[arg(required = true, value_delimiter = ',')]
        hosts: Vec<String>,
    },

    /// Uninstall the agent from hosts
    Remove {
        /// Hosts to clean up (comma separated or repeated)
        #[arg(required = true, value_delimiter = ',')]
        hosts: Vec<String>,

        /// Also delete the agent's record database
        #[arg(long)]
        remove_db: bool,
    },

    /// Check whether the agent on a host answers
    Up {
        /// Host address
        host: String,
    },

    /// Show which host owns an endpoint
    Endpoint {
        /// Endpoint address
        endpoint: String,
    },

    /// Start or stop resource monitoring on a host
    Monitoring {
        /// Host address
        host: String,

        /// Turn monitoring off instead of on
        #[arg(long)]
        off: bool,
    },

    /// Start or stop a packet capture on a host
    Pcap {
        /// Host address
        host: String,

        /// Capture file name on the host
        #[arg(long)]
        file: String,

        /// Interface to capture on
        #[arg(long, short)]
        interface: Option<String>,

        /// Extra capture arguments
        #[arg(long)]
        args: Option<String>,

        /// Stop the capture instead of starting it
        #[arg(long)]
        stop: bool,
    },
}

#[derive(Subcommand)]
pub enum ParamCommands {
    /// Read a parameter
    Get {
        /// Endpoint whose host is asked
        endpoint: String,

        /// Parameter name (e.g. MAX_QUEUE_SIZE)
        name: String,
    },

    /// Set a parameter
    Set {
        /// Endpoint whose host is changed
        endpoint: String,

        /// Parameter name
        name: String,

        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    if let Err(e) = run(cli).await {
        if verbose {
            output::print_error(&format!("{:?}", e));
        } else {
            output::print_error(&format!("{:#}", e));
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file_config = config::Config::load()?;
    let api_url = file_config.resolve_api_url(cli.api_url);
    let format = cli
        .format
        .or_else(|| {
            file_config
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_name)
        })
        .unwrap_or_default();
    if cli.verbose {
        output::print_info(&format!("Using API at {}", api_url));
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Hosts(hosts_cmd) => match hosts_cmd {
            HostsCommands::Add { hosts } => {
                hosts::add_hosts(&client, hosts, format).await?;
            }
            HostsCommands::Remove { hosts, remove_db } => {
                hosts::stop_service(&client, hosts, remove_db, format).await?;
            }
            HostsCommands::Up { host } => {
                hosts::host_up(&client, &host, format).await?;
            }
            HostsCommands::Endpoint { endpoint } => {
                hosts::endpoint_host(&client, &endpoint, format).await?;
            }
            HostsCommands::Monitoring { host, off } => {
                hosts::set_monitoring(&client, &host, !off).await?;
            }
            HostsCommands::Pcap {
                host,
                file,
                interface,
                args,
                stop,
            } => {
                hosts::pcap(&client, &host, file, interface, args, stop).await?;
            }
        },
        Commands::Run {
            src,
            dst,
            port,
            protocol,
            expect_fail,
            duration,
        } => {
            let request = RunTrafficRequest {
                src,
                dst,
                port,
                protocol: protocol.as_wire(),
                connected: !expect_fail,
                duration_secs: duration,
            };
            traffic::run(&client, request, format).await?;
        }
        Commands::Mesh {
            hosts,
            port,
            protocol,
            expect_fail,
            duration,
        } => {
            let request = MeshRequest {
                hosts,
                port,
                protocol: protocol.as_wire(),
                connected: !expect_fail,
                duration_secs: duration,
            };
            traffic::mesh(&client, request, format).await?;
        }
        Commands::Start { reqid } => {
            traffic::control(&client, &reqid, true, format).await?;
        }
        Commands::Stop { reqid } => {
            traffic::control(&client, &reqid, false, format).await?;
        }
        Commands::Rules { reqid } => {
            traffic::rules(&client, &reqid, format).await?;
        }
        Commands::Mock { reqid } => {
            traffic::mock(&client, &reqid).await?;
        }
        Commands::Results {
            reqid,
            duration,
            filters,
        } => {
            results::results(&client, &reqid, duration, &filters, format).await?;
        }
        Commands::Stats { reqid, duration } => {
            results::stats(&client, &reqid, duration, format).await?;
        }
        Commands::Latency {
            reqid,
            method,
            duration,
        } => {
            results::latency(&client, &reqid, &method, duration, format).await?;
        }
        Commands::Param(param_cmd) => match param_cmd {
            ParamCommands::Get { endpoint, name } => {
                params::get_param(&client, &endpoint, &name, format).await?;
            }
            ParamCommands::Set {
                endpoint,
                name,
                value,
            } => {
                params::set_param(&client, &endpoint, &name, &value).await?;
            }
        },
        Commands::Monitor => {
            hosts::monitor_status(&client, format).await?;
        }
    }

    Ok(())
}
