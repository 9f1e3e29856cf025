use clap::Parser;
use radius_policy::{Component, ConfigSection, Dictionary, MemoryDictionary, Rcode, Request};
use radius_vserver::{
    CompileError, CompiledSection, Config, Environment, Interpreter, ModuleError, ModuleLoader,
    ProtocolModule, Scheduler, VirtualServers,
};
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Virtual server configuration checker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "vserver-check")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "vserver.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't load servers)
    #[arg(short, long)]
    validate: bool,

    /// Keep listeners open until Ctrl+C
    #[arg(long)]
    hold: bool,
}

/// Accepts every section and runs nothing
struct DryRun;

impl Interpreter for DryRun {
    fn compile(
        &self,
        section: &ConfigSection,
        component: Component,
    ) -> Result<CompiledSection, CompileError> {
        debug!(
            section = %section.display_name(),
            component = %component,
            "Accepted section"
        );
        Ok(CompiledSection::new(section, ()))
    }

    fn run(&self, _section: &CompiledSection, _request: &mut Request, default: Rcode) -> Rcode {
        default
    }
}

/// Protocol module that goes through the lifecycle without doing I/O
struct Inert {
    namespace: String,
}

impl ProtocolModule for Inert {
    fn name(&self) -> &str {
        &self.namespace
    }

    fn open(&mut self, _scheduler: &Scheduler, conf: &ConfigSection) -> Result<(), ModuleError> {
        info!("  {} listener at {}", self.namespace, conf.location);
        Ok(())
    }
}

fn loader(protocols: &[String]) -> ModuleLoader {
    protocols.iter().fold(ModuleLoader::new(), |loader, namespace| {
        let ns = namespace.clone();
        loader.register(namespace.clone(), move |_| {
            Ok(Box::new(Inert { namespace: ns.clone() }) as Box<dyn ProtocolModule>)
        })
    })
}

fn print_summary(servers: &VirtualServers, dict: &MemoryDictionary) {
    println!("Virtual servers: {}", servers.servers().len());
    for server in servers.servers() {
        match server.namespace() {
            Some(ns) => println!("  {} (namespace {})", server.name(), ns),
            None => println!("  {}", server.name()),
        }
        for listener in server.listeners() {
            let kind = listener.namespace().unwrap_or("old-style");
            println!("    listen {} - {}", kind, listener.section().location);
        }
        for comp in server.compiled_components() {
            let Some(compiled) = server.compiled(comp) else {
                continue;
            };
            let names = compiled.subsection_names();
            if names.is_empty() {
                println!("    {}", comp);
            } else {
                println!("    {} [{}]", comp, names.join(", "));
            }
        }
    }

    println!();
    println!("Dynamic types:");
    for comp in servers.capabilities().components() {
        let Some(ta) = comp.type_attribute() else {
            continue;
        };
        let Some(da) = dict.attr_by_num(ta.number) else {
            continue;
        };
        for value in dict.values(&da) {
            println!("  {} {} = {}", da.name, value.alias, value.value);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate {
                eprintln!("Configuration validation failed!");
                eprintln!("   Error: {}", e);
                process::exit(1);
            }

            warn!("Could not load config file from: {}", cli.config_path);
            info!("Creating example configuration at: {}", cli.config_path);
            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }
            info!("Please edit {} and run again", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        println!("Configuration validated successfully!");
        println!();
        println!("Configuration summary:");
        println!("  Servers: {}", config.servers);
        println!("  Protocols: {}", config.protocols.join(", "));
        println!("  Log level: {}", config.log_level.as_deref().unwrap_or("info"));
        let caps = config.capabilities();
        println!(
            "  Proxy: {}  Accounting: {}  Session: {}  CoA: {}",
            caps.proxy, caps.accounting, caps.session, caps.coa
        );
        println!("  Extra dictionary values: {}", config.dictionary.len());
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("vserver-check v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    let dict = match config.dictionary() {
        Ok(dict) => Arc::new(dict),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let env = Environment::new(
        dict.clone() as Arc<dyn Dictionary>,
        Arc::new(DryRun),
        Arc::new(loader(&config.protocols)),
    )
    .with_capabilities(config.capabilities());

    let scheduler = match Scheduler::current() {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let result = VirtualServers::bootstrap_file(&config.servers, env).and_then(|mut servers| {
        servers.compile()?;
        servers.instantiate()?;
        servers.open(&scheduler)?;
        Ok(servers)
    });

    let servers = match result {
        Ok(servers) => servers,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    info!("All virtual servers loaded");
    println!();
    print_summary(&servers, &dict);

    if cli.hold {
        info!("Listeners open. Press Ctrl+C to stop");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {}", e);
            process::exit(1);
        }
        info!("Shutting down");
    }
}
