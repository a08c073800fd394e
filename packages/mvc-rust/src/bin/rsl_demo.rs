//! Runs one request through a demo application and prints the response.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use http::{Method, Uri};
use rsl_core::Outcome;
use rsl_mvc::logging::{init_tracing, LogFormat};
use rsl_mvc::services::service_names::{CONTROLLER_MANAGER, REQUEST};
use rsl_mvc::{Application, ApplicationConfig, ControllerManager, Module, MvcEvent, Request, ServiceManager};
use serde_json::{json, Value};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rsl-demo")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON application configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request method
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Request path
    #[arg(short, long, default_value = "/")]
    path: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Filter directive used when `RUST_LOG` is unset
    #[arg(long, env = "RSL_LOG", default_value = "info")]
    log_level: String,
}

/// Contributes two routes and their controllers.
struct Demo;

impl Module for Demo {
    fn name(&self) -> &str {
        "Demo"
    }

    fn config(&self) -> Value {
        json!({
            "router": {"routes": {
                "home": {"path": "/", "controller": "Index"},
                "hello": {"path": "/hello", "controller": "Index", "action": "hello", "methods": ["GET"]}
            }}
        })
    }

    fn on_load(&self, services: &ServiceManager) -> anyhow::Result<()> {
        let controllers = services.get::<ControllerManager>(CONTROLLER_MANAGER)?;
        controllers.register("Index", |_| Ok(index));
        Ok(())
    }
}

fn index(event: &mut MvcEvent) -> anyhow::Result<Outcome> {
    let action = event
        .param("action")
        .and_then(Value::as_str)
        .unwrap_or("index")
        .to_string();
    Ok(Outcome::Value(json!({
        "action": action,
        "request_id": event.request_id().to_string(),
    })))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format, &args.log_level)?;

    let mut config = match &args.config {
        Some(path) => ApplicationConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ApplicationConfig::default(),
    };
    if !config.modules.iter().any(|name| name == "Demo") {
        config.modules.insert(0, "Demo".to_string());
    }

    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method `{}`", args.method))?;
    let uri: Uri = args
        .path
        .parse()
        .with_context(|| format!("invalid path `{}`", args.path))?;
    let service_manager = std::mem::take(&mut config.service_manager)
        .module(Demo)
        .service(REQUEST, Request::new(method, uri));
    config.service_manager = service_manager;

    let mut app = Application::init(config)?;
    app.run()?;
    info!(listeners = ?app.listeners(), "done");

    let response = app.into_response();
    println!("{}", response.status());
    for (name, value) in response.headers() {
        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    println!();
    println!("{}", String::from_utf8_lossy(response.body()));
    Ok(())
}
