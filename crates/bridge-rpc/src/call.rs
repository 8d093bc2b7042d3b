//! One-shot satellite: forward a single call and print what came back.

use anyhow::{Context, Result};
use bridge_core::{Mutation, MutatorHandle, Returned, Satellite, ServiceHandle};
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use tracing::debug;

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Host address, as printed by `serve` (e.g. 127.0.0.1:40123)
    #[arg(long)]
    pub addr: SocketAddr,

    /// Service or mutator name
    pub service: String,

    /// Method to call
    pub method: String,

    /// Positional arguments as a JSON array
    #[arg(long, default_value = "[]")]
    pub args: String,

    /// Treat `service` as a mutator built from these constructor args (JSON array)
    #[arg(long)]
    pub constructor_args: Option<String>,
}

#[derive(Serialize)]
struct CallOutput {
    result: Value,
    remote: bool,
    mutations: Vec<Mutation>,
}

fn parse_list(flag: &str, raw: &str) -> Result<Vec<Value>> {
    serde_json::from_str(raw).with_context(|| format!("--{} must be a JSON array", flag))
}

fn describe(handle: &ServiceHandle) -> Value {
    match handle.mutator_handle() {
        Some(h) => serde_json::to_value(h).unwrap_or(Value::Null),
        None => Value::String(handle.name().to_string()),
    }
}

pub async fn run(args: CallArgs) -> Result<()> {
    let call_args = parse_list("args", &args.args)?;

    let satellite = Satellite::connect(
        args.addr,
        bridge_services::registry()?,
        bridge_services::default_allow_list(),
    )
    .await?;

    let target = match &args.constructor_args {
        Some(raw) => {
            let ctor = parse_list("constructor-args", raw)?;
            satellite.mutator(MutatorHandle::new(args.service.as_str(), ctor))?
        }
        None => satellite.service(&args.service).await?,
    };
    debug!(target = %target.name(), remote = target.is_remote(), "Calling {}", args.method);

    let result = match target.call(&args.method, call_args).await? {
        Returned::Data(value) => value,
        Returned::Mutator(handle) => describe(&handle),
        Returned::Mutators(handles) => Value::Array(handles.iter().map(describe).collect()),
    };

    let output = CallOutput {
        result,
        remote: target.is_remote(),
        mutations: satellite.history()?,
    };
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}
