use clap::{Parser, Subcommand};
use im_provider::config::{self, Config};
use im_provider::error::Result;
use im_provider::matter::device_types::sample_node;
use im_provider::matter::invoke::{InvokeRequest, ResponseCollector, WriteAttributeRequest};
use im_provider::matter::legacy::{
    AcknowledgingDispatch, AttributeValueDecoder, AttributeValueEncoder, LegacyDataModel,
    MemoryStorage,
};
use im_provider::matter::persistence::JsonFileStore;
use im_provider::matter::registry::{Registry, RegistryConfig};
use im_provider::matter::types::{
    AttrId, AttrPath, ClusterId, ClusterPath, CmdId, CmdPath, EndptId, Value,
};
use im_provider::matter::{
    ChangeLog, ClusterShim, DataModelProvider, ServerCluster, ServerClusterContext,
};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Numeric id, decimal or `0x` hex.
fn parse_id<T: TryFrom<u64>>(text: &str) -> std::result::Result<T, String> {
    config::parse_number(text)
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| format!("invalid id: {}", text))
}

/// JSON when it parses, otherwise the raw text as a string.
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::from(text))
}

#[derive(Parser, Debug)]
#[command(name = "im-provider", version, about = "Interaction-model provider")]
struct Cli {
    /// JSON registry description (built-in sample node when omitted)
    #[arg(long, env = "IM_REGISTRY_PATH")]
    registry: Option<PathBuf>,

    /// Persistent state file
    #[arg(long, env = "IM_STATE_PATH")]
    state: Option<PathBuf>,

    /// Shim-served cluster paths, e.g. "2:6,3:0x45"
    #[arg(long, env = "IM_SHIM_PATHS")]
    shim: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every visible endpoint, cluster, attribute and command
    Tree,
    /// Read one attribute
    Read {
        #[arg(value_parser = parse_id::<EndptId>)]
        endpoint: EndptId,
        #[arg(value_parser = parse_id::<ClusterId>)]
        cluster: ClusterId,
        #[arg(value_parser = parse_id::<AttrId>)]
        attribute: AttrId,
    },
    /// Write one attribute
    Write {
        #[arg(value_parser = parse_id::<EndptId>)]
        endpoint: EndptId,
        #[arg(value_parser = parse_id::<ClusterId>)]
        cluster: ClusterId,
        #[arg(value_parser = parse_id::<AttrId>)]
        attribute: AttrId,
        /// JSON value; bare text is written as a string
        value: String,
        #[arg(long)]
        timed: bool,
    },
    /// Invoke one command
    Invoke {
        #[arg(value_parser = parse_id::<EndptId>)]
        endpoint: EndptId,
        #[arg(value_parser = parse_id::<ClusterId>)]
        cluster: ClusterId,
        #[arg(value_parser = parse_id::<CmdId>)]
        command: CmdId,
        /// JSON arguments
        args: Option<String>,
        #[arg(long)]
        timed: bool,
    },
}

fn build_provider(config: &Config) -> Result<DataModelProvider> {
    let registry = match &config.registry_path {
        Some(path) => RegistryConfig::load(path)?.into_registry()?,
        None => {
            info!("No registry description given, serving the sample node");
            Registry::new(sample_node())?
        }
    };

    let legacy = Arc::new(LegacyDataModel::new(
        Arc::new(registry),
        Arc::new(MemoryStorage::new()),
        Arc::new(AcknowledgingDispatch),
    ));
    let provider = DataModelProvider::new(legacy.clone());

    let shim = Arc::new(ClusterShim::new(legacy, config.shim_paths.iter().copied()));
    if !shim.paths().is_empty() {
        match provider.register_server_cluster(shim) {
            Ok(()) => info!("Compatibility shim serving {:?}", config.shim_paths),
            Err(e) => warn!("Compatibility shim not registered: {}", e),
        }
    }

    let storage = Arc::new(JsonFileStore::new(config.state_path.clone()));
    provider.startup(ServerClusterContext::new(storage, Arc::new(ChangeLog::new())))?;
    Ok(provider)
}

fn print_tree(provider: &DataModelProvider) {
    let mut endpoint = provider.first_endpoint();
    while let Some(ep) = endpoint {
        match ep.parent_id {
            Some(parent) => println!("Endpoint 0x{:04X} (parent 0x{:04X})", ep.id, parent),
            None => println!("Endpoint 0x{:04X}", ep.id),
        }

        let mut device_type = provider.first_device_type(ep.id);
        while let Some(dt) = device_type {
            println!("  device type 0x{:04X} rev {}", dt.device_type, dt.revision);
            device_type = provider.next_device_type(ep.id, dt.device_type);
        }

        let mut cluster = provider.first_cluster(ep.id);
        while let Some(c) = cluster {
            println!(
                "  cluster 0x{:04X} rev {} features 0x{:X} dataver {}",
                c.path.cluster_id, c.info.revision, c.info.feature_map, c.info.data_version
            );

            let mut attribute = provider.first_attribute(&c.path);
            while let Some(a) = attribute {
                let list = if a.is_list() { " list" } else { "" };
                let rw = if a.info.write_privilege.is_some() { "rw" } else { "r" };
                println!("    attribute 0x{:04X} {}{}", a.path.attr_id, rw, list);
                attribute = provider.next_attribute(&a.path);
            }

            let mut accepted = provider.first_accepted_command(&c.path);
            while let Some(cmd) = accepted {
                println!(
                    "    accepts 0x{:02X} ({:?})",
                    cmd.path.cmd_id, cmd.info.invoke_privilege
                );
                accepted = provider.next_accepted_command(&cmd.path);
            }

            let mut generated = provider.first_generated_command(&c.path);
            while let Some(cmd) = generated {
                println!("    generates 0x{:02X}", cmd.cmd_id);
                generated = provider.next_generated_command(&cmd);
            }

            cluster = provider.next_cluster(&c.path);
        }

        endpoint = provider.next_endpoint(ep.id);
    }
}

fn run(command: Command, provider: &DataModelProvider) -> Result<()> {
    match command {
        Command::Tree => print_tree(provider),
        Command::Read {
            endpoint,
            cluster,
            attribute,
        } => {
            let path = AttrPath::new(endpoint, cluster, attribute);
            let mut encoder = AttributeValueEncoder::new(path);
            provider.read_attribute(&path, &mut encoder)?;
            let dataver = encoder.data_version();
            let value = encoder.into_value().unwrap_or(Value::Null);
            println!("{} = {} (dataver {})", path, serde_json::to_string(&value)?, dataver);
        }
        Command::Write {
            endpoint,
            cluster,
            attribute,
            value,
            timed,
        } => {
            let path = AttrPath::new(endpoint, cluster, attribute);
            let mut request = WriteAttributeRequest::new(path);
            if timed {
                request = request.timed();
            }
            let mut decoder = AttributeValueDecoder::new(parse_value(&value));
            provider.write_attribute(&request, &mut decoder)?;
            let dataver = provider
                .get_cluster_info(&ClusterPath::new(endpoint, cluster))
                .map(|info| info.data_version);
            println!("{} written (dataver {:?})", path, dataver);
        }
        Command::Invoke {
            endpoint,
            cluster,
            command,
            args,
            timed,
        } => {
            let path = CmdPath::new(endpoint, cluster, command);
            let mut request = InvokeRequest::new(path);
            if timed {
                request = request.timed();
            }
            let args = args.as_deref().map(parse_value).unwrap_or(Value::Null);
            let mut collector = ResponseCollector::new();
            match provider.invoke(&request, &args, &mut collector) {
                Some(status) => println!("{} -> {}", path, status),
                None => {
                    for response in collector.responses() {
                        println!("{} -> {:?}", path, response);
                    }
                }
            }
        }
    }
    Ok(())
}

fn main() {
    config::load_dotenv();
    init_logger();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = cli.registry {
        config.registry_path = Some(path);
    }
    if let Some(path) = cli.state {
        config.state_path = path;
    }
    if let Some(paths) = cli.shim {
        match config::parse_cluster_paths(&paths) {
            Ok(p) => config.shim_paths = p,
            Err(e) => {
                error!("Invalid --shim: {}", e);
                std::process::exit(2);
            }
        }
    }
    info!("State file: {:?}", config.state_path);

    let provider = match build_provider(&config) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Failed to build data model: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, &provider) {
        error!("{}", e);
        std::process::exit(1);
    }
}
