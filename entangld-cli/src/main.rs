use clap::{Parser, Subcommand, ValueEnum};

mod network;
mod scenarios;

#[derive(Parser, Debug)]
#[command(name = "entangld")]
pub struct EntangldCommand {
    #[command(subcommand)]
    pub command: EntangldSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum EntangldSubcommand {
    /// List the scenarios `demo` can run.
    List {},
    /// Run one federation scenario against an in-process network of stores and narrate
    /// what it observes.
    Demo {
        scenario: Scenario,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum Scenario {
    /// Plain local set followed by a get at the same path.
    BasicSetGet,
    /// A callable leaf invoked as an RPC and continued into its result.
    RpcLeaf,
    /// One store's data read through a second store that has it mounted.
    MountedRemote,
    /// A subscription installed on a parent, fired by a write on its mounted child.
    RemoteSubscription,
    /// The same remote subscription, now throttled to every other write.
    ThrottledSubscription,
    /// Three stores mounted in a ring; a write on one reaches a subscription on
    /// another by crossing the ring twice.
    CyclicChain,
    /// Two subscriptions on one path; unsubscribing one leaves the other live.
    UnsubscribeById,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cmd = EntangldCommand::parse();

    match cmd.command {
        EntangldSubcommand::List {} => {
            for scenario in Scenario::value_variants() {
                let ids = scenario.to_possible_value().expect("every scenario has a possible value");
                println!("{}\t{}", ids.get_name(), ids.get_help().map(|h| h.to_string()).unwrap_or_default());
            }
        }
        EntangldSubcommand::Demo { scenario } => run(scenario).await?,
    }

    Ok(())
}

async fn run(scenario: Scenario) -> anyhow::Result<()> {
    match scenario {
        Scenario::BasicSetGet => scenarios::basic_set_get().await,
        Scenario::RpcLeaf => scenarios::rpc_leaf().await,
        Scenario::MountedRemote => scenarios::mounted_remote().await,
        Scenario::RemoteSubscription => scenarios::remote_subscription().await,
        Scenario::ThrottledSubscription => scenarios::throttled_subscription().await,
        Scenario::CyclicChain => scenarios::cyclic_chain().await,
        Scenario::UnsubscribeById => scenarios::unsubscribe_by_id().await,
    }
}
