use disruptor::actions;
use disruptor::config::DisruptorConfig;
use disruptor::error::{self, Result};
use disruptor::notify::TracingNotifier;
use disruptor::selector::select_active_nodes;
use disruptor::{DrainOrchestrator, NodeTarget, SelectionPolicy};
use models::cluster::K8SClusterClient;
use models::constants::{DEFAULT_CHAOS_LABEL, DEFAULT_CHAOS_LABEL_VALUE, DEFAULT_NAMESPACE};
use models::node::Taint;
use models::telemetry;

use argh::FromArgs;
use snafu::ResultExt;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{event, Level};

#[derive(FromArgs, Debug)]
/// Disrupts Kubernetes nodes and pods for chaos experiments.
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Command {
    ListNodes(ListNodesArgs),
    Drain(DrainArgs),
    Cordon(CordonArgs),
    Uncordon(UncordonArgs),
    DeleteNodes(DeleteNodesArgs),
    Taint(TaintArgs),
    RemoveTaints(RemoveTaintsArgs),
    Label(LabelArgs),
    Unlabel(UnlabelArgs),
    LabelRandom(LabelRandomArgs),
    TerminatePods(TerminatePodsArgs),
}

#[derive(FromArgs, Debug)]
/// List the nodes eligible for experiments.
#[argh(subcommand, name = "list-nodes")]
struct ListNodesArgs {
    /// only consider nodes matching this label selector
    #[argh(option)]
    label_selector: Option<String>,
}

#[derive(FromArgs, Debug)]
/// Cordon nodes and evict their pods.
#[argh(subcommand, name = "drain")]
struct DrainArgs {
    /// the node to drain
    #[argh(option)]
    name: Option<String>,

    /// drain every node matching this label selector
    #[argh(option)]
    label_selector: Option<String>,

    /// also evict pods with emptyDir volumes, losing their data
    #[argh(switch)]
    delete_local_storage: bool,

    /// seconds to wait for evicted pods to go, overriding DRAIN_TIMEOUT_SECONDS
    #[argh(option)]
    timeout_seconds: Option<u64>,
}

#[derive(FromArgs, Debug)]
/// Mark nodes unschedulable.
#[argh(subcommand, name = "cordon")]
struct CordonArgs {
    /// the node to cordon
    #[argh(option)]
    name: Option<String>,

    /// cordon every node matching this label selector
    #[argh(option)]
    label_selector: Option<String>,
}

#[derive(FromArgs, Debug)]
/// Mark nodes schedulable again.
#[argh(subcommand, name = "uncordon")]
struct UncordonArgs {
    /// the node to uncordon
    #[argh(option)]
    name: Option<String>,

    /// uncordon every node matching this label selector
    #[argh(option)]
    label_selector: Option<String>,
}

#[derive(FromArgs, Debug)]
/// Delete nodes without draining them first.
#[argh(subcommand, name = "delete-nodes")]
struct DeleteNodesArgs {
    /// only consider nodes matching this label selector
    #[argh(option)]
    label_selector: Option<String>,

    /// which nodes to delete: all, first, random or random:<count>
    #[argh(option, default = "SelectionPolicy::First")]
    policy: SelectionPolicy,

    /// grace period for the deletion, in seconds
    #[argh(option)]
    grace_period_seconds: Option<u32>,
}

#[derive(FromArgs, Debug)]
/// Replace the taints of nodes with a single taint.
#[argh(subcommand, name = "taint")]
struct TaintArgs {
    /// only taint nodes matching this label selector
    #[argh(option)]
    label_selector: Option<String>,

    /// taint key
    #[argh(option)]
    key: String,

    /// taint value
    #[argh(option)]
    value: Option<String>,

    /// taint effect, such as NoSchedule
    #[argh(option)]
    effect: String,
}

#[derive(FromArgs, Debug)]
/// Remove every taint from nodes.
#[argh(subcommand, name = "remove-taints")]
struct RemoveTaintsArgs {
    /// only consider nodes matching this label selector
    #[argh(option)]
    label_selector: Option<String>,
}

#[derive(FromArgs, Debug)]
/// Label nodes.
#[argh(subcommand, name = "label")]
struct LabelArgs {
    /// only label nodes matching this label selector
    #[argh(option)]
    label_selector: Option<String>,

    /// label key
    #[argh(option, default = "DEFAULT_CHAOS_LABEL.to_string()")]
    key: String,

    /// label value
    #[argh(option, default = "DEFAULT_CHAOS_LABEL_VALUE.to_string()")]
    value: String,
}

#[derive(FromArgs, Debug)]
/// Remove a label from the eligible nodes.
#[argh(subcommand, name = "unlabel")]
struct UnlabelArgs {
    /// only consider nodes matching this label selector
    #[argh(option)]
    label_selector: Option<String>,

    /// label key
    #[argh(option, default = "DEFAULT_CHAOS_LABEL.to_string()")]
    key: String,
}

#[derive(FromArgs, Debug)]
/// Label one eligible node, picked at random.
#[argh(subcommand, name = "label-random")]
struct LabelRandomArgs {
    /// only consider nodes matching this label selector
    #[argh(option)]
    label_selector: Option<String>,

    /// label key
    #[argh(option, default = "DEFAULT_CHAOS_LABEL.to_string()")]
    key: String,

    /// label value
    #[argh(option, default = "DEFAULT_CHAOS_LABEL_VALUE.to_string()")]
    value: String,
}

#[derive(FromArgs, Debug)]
/// Delete pods.
#[argh(subcommand, name = "terminate-pods")]
struct TerminatePodsArgs {
    /// namespace of the pods
    #[argh(option, default = "DEFAULT_NAMESPACE.to_string()")]
    namespace: String,

    /// only consider pods matching this label selector
    #[argh(option)]
    label_selector: Option<String>,

    /// only consider pods whose name starts with a match of this regular expression
    #[argh(option)]
    name_pattern: Option<String>,

    /// which pods to delete: all, first, random or random:<count>
    #[argh(option, default = "SelectionPolicy::First")]
    policy: SelectionPolicy,
}

fn node_target(name: Option<String>, label_selector: Option<String>) -> NodeTarget {
    match name {
        Some(name) => NodeTarget::Name(name),
        None => NodeTarget::Labels(label_selector),
    }
}

fn print_names<S: AsRef<str>>(names: &[S]) {
    for name in names {
        println!("{}", name.as_ref());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = argh::from_env();

    telemetry::init_telemetry_from_env().context(error::TelemetryInitSnafu)?;
    let config = DisruptorConfig::from_env()?;

    let k8s_client = kube::Client::try_default()
        .await
        .context(error::ClientCreateSnafu)?;
    let client = K8SClusterClient::new(k8s_client);

    run(args.command, client, &config).await
}

async fn run(command: Command, client: K8SClusterClient, config: &DisruptorConfig) -> Result<()> {
    match command {
        Command::ListNodes(args) => {
            let ignore_list = config.ignore_list()?;
            let nodes =
                select_active_nodes(&client, args.label_selector.as_deref(), &ignore_list).await?;
            for node in nodes {
                println!("{}", node.name());
            }
        }
        Command::Drain(args) => {
            let ignore_list = config.ignore_list()?;
            let mut settings = config.drain_settings(args.delete_local_storage);
            if let Some(timeout) = args.timeout_seconds {
                settings.timeout = Duration::from_secs(timeout);
            }
            let orchestrator = DrainOrchestrator::new(client, settings)
                .with_ignore_list(ignore_list)
                .with_notifier(Arc::new(TracingNotifier));
            let reports = orchestrator
                .drain(&node_target(args.name, args.label_selector))
                .await?;
            for report in reports {
                event!(
                    Level::INFO,
                    node = %report.node_name,
                    "Evicted: [{}]",
                    report.evicted_pod_names().join(", ")
                );
                println!("{}", report.node_name);
            }
        }
        Command::Cordon(args) => {
            let target = node_target(args.name, args.label_selector);
            print_names(&actions::cordon_nodes(&client, &target).await?);
        }
        Command::Uncordon(args) => {
            let target = node_target(args.name, args.label_selector);
            print_names(&actions::uncordon_nodes(&client, &target).await?);
        }
        Command::DeleteNodes(args) => {
            let deleted = actions::delete_nodes(
                &client,
                args.label_selector.as_deref(),
                args.policy,
                args.grace_period_seconds,
            )
            .await?;
            print_names(&deleted);
        }
        Command::Taint(args) => {
            let taint =
                Taint::new(args.key, args.value, args.effect).context(error::InvalidTaintSnafu)?;
            let tainted =
                actions::taint_nodes(&client, args.label_selector.as_deref(), &taint).await?;
            print_names(&tainted);
        }
        Command::RemoveTaints(args) => {
            print_names(&actions::remove_taints(&client, args.label_selector.as_deref()).await?);
        }
        Command::Label(args) => {
            let labelled = actions::add_label_to_nodes(
                &client,
                args.label_selector.as_deref(),
                &args.key,
                &args.value,
            )
            .await?;
            print_names(&labelled);
        }
        Command::Unlabel(args) => {
            let ignore_list = config.ignore_list()?;
            let unlabelled = actions::remove_label_from_nodes(
                &client,
                args.label_selector.as_deref(),
                &args.key,
                &ignore_list,
            )
            .await?;
            print_names(&unlabelled);
        }
        Command::LabelRandom(args) => {
            let ignore_list = config.ignore_list()?;
            let labelled = actions::label_random_node(
                &client,
                args.label_selector.as_deref(),
                &args.key,
                &args.value,
                &ignore_list,
            )
            .await?;
            println!("{}", labelled);
        }
        Command::TerminatePods(args) => {
            let terminated = actions::terminate_pods(
                &client,
                &args.namespace,
                args.label_selector.as_deref(),
                args.name_pattern.as_deref(),
                args.policy,
            )
            .await?;
            print_names(&terminated);
        }
    }
    Ok(())
}
