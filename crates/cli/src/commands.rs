//! `chord` subcommands and their console output.

use crate::client::{Client, Subscription};
use crate::registry::TagRegistry;
use anyhow::{anyhow, bail, Context};
use clap::{Args, Subcommand};
use corelib::{NodeSnapshot, Topology, Trace};
use node::{run_coordinator, run_member, LocalRing, RingConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

pub type CommandResult = anyhow::Result<()>;

/// Where the ring configuration comes from.
#[derive(Debug, Clone, Args)]
pub struct RingArgs {
    /// TOML ring configuration; built-in defaults when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the identifier width M.
    #[arg(long)]
    pub bits: Option<u32>,
}

impl RingArgs {
    fn load(&self) -> anyhow::Result<RingConfig> {
        let mut config = match &self.config {
            Some(path) => RingConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RingConfig::default(),
        };
        if let Some(bits) = self.bits {
            config.bits = bits;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Options shared by commands that talk to a running coordinator.
#[derive(Debug, Clone, Args)]
pub struct ClientArgs {
    #[command(flatten)]
    pub ring: RingArgs,

    /// Coordinator address; defaults to the configured host and port.
    #[arg(long)]
    pub coordinator: Option<SocketAddr>,

    /// Address the client listens on for replies.
    #[arg(long, default_value = "127.0.0.1:0")]
    pub reply: SocketAddr,

    /// Tag registry shared by every client of this ring.
    #[arg(long, default_value = "chord-tags.json")]
    pub tags: PathBuf,
}

impl ClientArgs {
    async fn connect(&self, config: &RingConfig) -> anyhow::Result<Client> {
        let coordinator = self.coordinator.unwrap_or_else(|| config.coordinator_addr());
        let tags = TagRegistry::load(&self.tags, config.space()?, config.hash)
            .with_context(|| format!("loading {}", self.tags.display()))?;
        Ok(Client::new(coordinator, self.reply, tags).await?)
    }

    fn save(&self, client: &Client) -> CommandResult {
        client
            .tags()
            .save(&self.tags)
            .with_context(|| format!("saving {}", self.tags.display()))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one ring member and wait for the coordinator to join it.
    Member {
        #[arg(long)]
        listen: SocketAddr,
    },

    /// Run the coordinator and join the configured members, which must
    /// already be listening.
    Coordinator {
        #[command(flatten)]
        ring: RingArgs,
    },

    /// Run the coordinator and every member in this process.
    Local {
        #[command(flatten)]
        ring: RingArgs,

        /// Publish `tag=url[,url...]` once the ring is up. Repeatable.
        #[arg(long = "publish", value_name = "TAG=URLS")]
        publishes: Vec<String>,

        /// Run a subscribe query after the publishes. Repeatable.
        #[arg(long = "subscribe", value_name = "QUERY")]
        queries: Vec<String>,

        /// Print every member's routing state.
        #[arg(long)]
        dump: bool,

        /// Keep serving after the scripted requests.
        #[arg(long)]
        serve: bool,
    },

    /// Publish URLs under a tag, replacing what it held before.
    Publish {
        #[command(flatten)]
        client: ClientArgs,

        tag: String,

        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Query tags joined by `and` / `or`, evaluated left to right.
    ///
    /// Tags missing from the registry were never published and match nothing.
    Subscribe {
        #[command(flatten)]
        client: ClientArgs,

        query: String,
    },

    /// Walk the ring and print every member's state.
    Dump {
        #[command(flatten)]
        client: ClientArgs,

        /// Fail if successors, predecessors or fingers are inconsistent.
        #[arg(long)]
        verify: bool,

        /// Print the reports as JSON instead of tables.
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    /// Ring configuration this command runs with.
    pub fn ring_config(&self) -> anyhow::Result<RingConfig> {
        match self {
            Command::Member { .. } => Ok(RingConfig::default()),
            Command::Coordinator { ring } | Command::Local { ring, .. } => ring.load(),
            Command::Publish { client, .. }
            | Command::Subscribe { client, .. }
            | Command::Dump { client, .. } => client.ring.load(),
        }
    }

    pub async fn execute(&self, config: &RingConfig) -> CommandResult {
        match self {
            Command::Member { listen } => Ok(run_member(*listen).await?),
            Command::Coordinator { .. } => Ok(run_coordinator(config).await?),
            Command::Local {
                publishes,
                queries,
                dump,
                serve,
                ..
            } => run_local(config, publishes, queries, *dump, *serve).await,
            Command::Publish {
                client: args,
                tag,
                urls,
            } => {
                let mut client = args.connect(config).await?;
                publish(&mut client, tag, urls.clone()).await?;
                args.save(&client)
            }
            Command::Subscribe { client, query } => {
                let mut client = client.connect(config).await?;
                subscribe(&mut client, query).await
            }
            Command::Dump {
                client,
                verify,
                json,
            } => {
                let client = client.connect(config).await?;
                dump(&client, *verify, *json).await
            }
        }
    }
}

async fn run_local(
    config: &RingConfig,
    publishes: &[String],
    queries: &[String],
    show_dump: bool,
    serve: bool,
) -> CommandResult {
    let ring = LocalRing::launch(config).await?;
    println!("Coordinator: {}", ring.coordinator());
    for member in ring.members() {
        println!("Member:      {}", member);
    }

    let tags = TagRegistry::new(ring.space(), config.hash);
    let reply = SocketAddr::new(config.host, 0);
    let mut client = Client::new(ring.coordinator().addr, reply, tags).await?;

    for entry in publishes {
        let (tag, urls) = parse_publish(entry)?;
        publish(&mut client, &tag, urls).await?;
    }
    for query in queries {
        subscribe(&mut client, query).await?;
    }
    if show_dump {
        dump(&client, true, false).await?;
    }

    if serve {
        info!("serving until interrupted");
        ring.wait().await?;
    }
    Ok(())
}

async fn publish(client: &mut Client, tag: &str, urls: Vec<String>) -> CommandResult {
    let count = urls.len();
    let trace = client.publish(tag, urls).await?;
    let id = client
        .tags()
        .resolve(tag)
        .ok_or_else(|| anyhow!("tag {:?} lost its identifier", tag))?;
    println!("Published {} URL(s) under {:?} (id {})", count, tag, id);
    print_trace(&trace);
    Ok(())
}

async fn subscribe(client: &mut Client, query: &str) -> CommandResult {
    let subscription = client.subscribe(query).await?;
    print_subscription(query, &subscription);
    Ok(())
}

async fn dump(client: &Client, verify: bool, json: bool) -> CommandResult {
    let reports = client.dump().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_reports(&reports);
    }

    if verify {
        let topology = Topology::new(client.tags().space(), reports.iter().map(|r| r.node.id));
        let violations = topology.verify(&reports);
        if !violations.is_empty() {
            for violation in &violations {
                eprintln!("{}", violation);
            }
            bail!("ring state is inconsistent ({} violations)", violations.len());
        }
        println!("Ring state verified: {} members", reports.len());
    }
    Ok(())
}

/// Splits `tag=url1,url2`.
fn parse_publish(entry: &str) -> anyhow::Result<(String, Vec<String>)> {
    let (tag, urls) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("expected TAG=URL[,URL...], got {:?}", entry))?;
    let tag = tag.trim();
    let urls: Vec<String> = urls
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from)
        .collect();
    if tag.is_empty() || urls.is_empty() {
        bail!("expected TAG=URL[,URL...], got {:?}", entry);
    }
    Ok((tag.to_string(), urls))
}

fn print_trace(trace: &Trace) {
    for (step, id) in trace.hops().iter().enumerate() {
        println!("Step {} - Node ID is: {}", step + 1, id);
    }
}

fn print_subscription(query: &str, subscription: &Subscription) {
    for (tag, trace) in &subscription.traces {
        println!("Tag {:?}:", tag);
        print_trace(trace);
    }
    if subscription.urls.is_empty() {
        println!("No matching URLs were found for {:?}", query);
        return;
    }
    println!("URLs found:");
    for url in &subscription.urls {
        println!("- {}", url);
    }
}

fn print_reports(reports: &[NodeSnapshot]) {
    for report in reports {
        println!();
        println!("Node {} ({})", report.node.id, report.node.addr);
        println!("  entries:     {}", report.entry_count);
        println!("  successor:   {}", report.successor.id);
        println!("  predecessor: {}", report.predecessor.id);
        println!("  {:>5} {:>6} {:>6}", "index", "start", "node");
        for (index, finger) in report.fingers.iter().enumerate() {
            println!(
                "  {:>5} {:>6} {:>6}",
                index + 1,
                finger.start.to_string(),
                finger.node.id.to_string()
            );
        }
    }
}
