use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{crate_description, crate_version, Parser};
use const_format::concatcp;
use kgateway_enterprise_policy::{
    attachment::Precedence,
    client::{self, PolicyClient},
    crd::{self, v1alpha1::EnterpriseKgatewayTrafficPolicy},
    documents::{self, Document},
    extensions::{self, ExtensionKind},
    merge::merge_by_precedence,
};
use serde::Serialize;
use stackable_operator::{
    kube::{CustomResourceExt as _, ResourceExt},
    logging::TracingTarget,
};

pub const APP_NAME: &str = "kgateway-enterprise-policy";
pub const ENV_VAR_LOGGING: &str = "KGATEWAY_ENTERPRISE_POLICY_LOG";

const DEMO_LABEL_DOMAIN: &str = "examples.solo.io";
const UPDATED_LABEL: &str = concatcp!(DEMO_LABEL_DOMAIN, "/updated");
const DEMO_POLICY_NAME: &str = "enterprise-policy-demo";
const DEMO_POLICY_SPEC: &str = r#"
targetRefs:
- group: gateway.networking.k8s.io
  kind: Gateway
  name: http
entExtAuth:
  authConfigRef:
    name: basic-auth
entRateLimit:
  global:
    rateLimitConfigRefs:
    - name: per-user
"#;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(clap::Parser)]
#[clap(author, version)]
struct Opts {
    /// Tracing log collector system
    #[arg(long, env, default_value_t, value_enum, global = true)]
    tracing_target: TracingTarget,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Print the CRDs, including their validation rules, as YAML
    Crd,

    /// Validate every resource in the given manifest files and directories
    Validate(ValidateArgs),

    /// Merge policies attached at different levels and print the policy in effect
    Merge(MergeArgs),

    /// Create, update, list and delete a demo EnterpriseKgatewayTrafficPolicy
    Demo(DemoArgs),
}

#[derive(clap::Args)]
struct ValidateArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Shared extensions that are currently deployed, used to plan changes for parameters
    #[arg(long, env, value_delimiter = ',')]
    deployed_extensions: Vec<ExtensionKind>,
}

#[derive(clap::Args)]
struct MergeArgs {
    /// A manifest with the policies attached at LEVEL, for example `route=route-policy.yaml`
    #[arg(long = "layer", value_name = "LEVEL=FILE", required = true, value_parser = parse_layer)]
    layers: Vec<(Precedence, PathBuf)>,
}

#[derive(clap::Args)]
struct DemoArgs {
    #[arg(long, short, env)]
    namespace: String,

    /// Defaults to the kubeconfig of the environment, or the in-cluster configuration
    #[arg(long, env)]
    kubeconfig: Option<PathBuf>,
}

fn parse_layer(layer: &str) -> Result<(Precedence, PathBuf), String> {
    let (level, path) = layer
        .split_once('=')
        .ok_or_else(|| format!("expected LEVEL=FILE, got {layer:?}"))?;
    let level = level
        .parse()
        .map_err(|_| format!("unknown attachment level {level:?}"))?;
    Ok((level, PathBuf::from(path)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    match opts.cmd {
        Command::Crd => print_crds(),
        Command::Validate(args) => {
            start(opts.tracing_target);
            validate(&args)
        }
        Command::Merge(args) => {
            start(opts.tracing_target);
            merge(&args)
        }
        Command::Demo(args) => {
            start(opts.tracing_target);
            demo(&args.namespace, args.kubeconfig.as_deref()).await
        }
    }
}

fn start(tracing_target: TracingTarget) {
    stackable_operator::logging::initialize_logging(ENV_VAR_LOGGING, APP_NAME, tracing_target);
    stackable_operator::utils::print_startup_string(
        crate_description!(),
        crate_version!(),
        built_info::GIT_VERSION,
        built_info::TARGET,
        built_info::BUILT_TIME_UTC,
        built_info::RUSTC_VERSION,
    );
}

fn print_crds() -> anyhow::Result<()> {
    let crds = crd::crds()?
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    print!("{}", crds.join("---\n"));
    Ok(())
}

fn validate(args: &ValidateArgs) -> anyhow::Result<()> {
    let deployed: BTreeSet<_> = args.deployed_extensions.iter().copied().collect();
    let documents = documents::load_paths(&args.paths)?;
    let mut invalid = 0;
    for (path, document) in &documents {
        let path = path.display();
        let (kind, name) = (document.kind(), document.name());
        match document.validate() {
            Ok(()) => tracing::info!(%path, %kind, %name, "valid"),
            Err(violations) => {
                invalid += 1;
                for violation in &violations {
                    tracing::error!(%path, %kind, %name, %violation, "invalid");
                }
            }
        }
        if let Some(parameters) = document.shared_extensions() {
            let plan = extensions::plan(&deployed, parameters);
            tracing::info!(
                %path,
                %name,
                provision = ?plan.provision,
                garbage_collect = ?plan.garbage_collect,
                "planned shared extensions"
            );
        }
    }
    if invalid > 0 {
        bail!("{invalid} of {} documents are invalid", documents.len());
    }
    Ok(())
}

fn merge(args: &MergeArgs) -> anyhow::Result<()> {
    let mut agentgateway = Vec::new();
    let mut traffic = Vec::new();
    for (level, path) in &args.layers {
        for document in documents::load_file(path)? {
            if let Err(violations) = document.validate() {
                bail!(
                    "{} {:?} in {} is invalid: {violations}",
                    document.kind(),
                    document.name(),
                    path.display()
                );
            }
            match document {
                Document::AgentgatewayPolicy(policy) => agentgateway.push((*level, policy.spec)),
                Document::TrafficPolicy(policy) => traffic.push((*level, policy.spec)),
                other => bail!(
                    "{} in {} is not a policy that can be merged",
                    other.kind(),
                    path.display()
                ),
            }
        }
    }

    match (agentgateway.is_empty(), traffic.is_empty()) {
        (false, false) => bail!("can only merge policies of one kind at a time"),
        (false, true) => print_yaml(&merge_by_precedence(agentgateway)),
        (true, false) => print_yaml(&merge_by_precedence(traffic)),
        (true, true) => bail!("no policies to merge"),
    }
}

fn print_yaml(value: &impl Serialize) -> anyhow::Result<()> {
    let mut out = Vec::new();
    serde_yaml::with::singleton_map_recursive::serialize(
        value,
        &mut serde_yaml::Serializer::new(&mut out),
    )?;
    print!("{}", String::from_utf8(out)?);
    Ok(())
}

fn demo_policy(namespace: &str) -> anyhow::Result<EnterpriseKgatewayTrafficPolicy> {
    let spec = serde_yaml::with::singleton_map_recursive::deserialize(
        serde_yaml::Deserializer::from_str(DEMO_POLICY_SPEC),
    )
    .context("failed to parse demo policy")?;
    let mut policy = EnterpriseKgatewayTrafficPolicy::new(DEMO_POLICY_NAME, spec);
    policy.metadata.namespace = Some(namespace.to_string());
    Ok(policy)
}

async fn demo(namespace: &str, kubeconfig: Option<&Path>) -> anyhow::Result<()> {
    let client = PolicyClient::new(client::connect(kubeconfig).await?, namespace);
    tracing::info!(
        crd = %EnterpriseKgatewayTrafficPolicy::crd_name(),
        namespace = client.namespace(),
        "running demo"
    );

    client.create(&demo_policy(namespace)?).await?;
    let result = async {
        client
            .update_with_retry(DEMO_POLICY_NAME, |policy: &mut EnterpriseKgatewayTrafficPolicy| {
                policy
                    .labels_mut()
                    .insert(UPDATED_LABEL.to_string(), "true".to_string());
            })
            .await?;
        for policy in client.list::<EnterpriseKgatewayTrafficPolicy>().await? {
            let accepted = policy
                .status
                .as_ref()
                .map(|status| status.condition_statuses("Accepted").collect::<Vec<_>>());
            tracing::info!(
                name = %policy.name_any(),
                labels = ?policy.labels(),
                ?accepted,
                "listed policy"
            );
        }
        Ok::<_, client::Error>(())
    }
    .await;
    if let Err(err) = &result {
        tracing::error!(
            error = err as &dyn std::error::Error,
            "demo failed, cleaning up"
        );
    }

    client
        .delete::<EnterpriseKgatewayTrafficPolicy>(DEMO_POLICY_NAME)
        .await?;
    result?;
    Ok(())
}
