use actix_server::ServerHandle;
use actix_web::{
    App, HttpServer,
    web::{self, Data},
};
use anyhow::{Context, Result, anyhow};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info};
use std::{io::Write, sync::Arc};
use tokio::signal::unix::{SignalKind, signal};
use wifi_setup::{
    api::Api,
    command::SystemCommandRunner,
    config::AppConfig,
    error::Cancelled,
    network_probe::WpaCliProbe,
    platform::{Platform, PlatformKind},
    services::{
        connectivity::{ConnectivityStateMachine, PollOutcome},
        next_stage::CommandNextStage,
        shutdown::{ShutdownSignal, ShutdownTrigger},
    },
};

type Probe = WpaCliProbe<SystemCommandRunner>;
type Launcher = CommandNextStage<SystemCommandRunner>;
type SetupApi = Api<Probe, Launcher>;

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let config = AppConfig::get().context("failed to load configuration")?;

    let (trigger, shutdown) = ShutdownSignal::channel();
    forward_signals(trigger)?;

    let runner = SystemCommandRunner;
    let kind = PlatformKind::resolve(config.wifi.platform, &runner).await;
    let platform = Platform::new(kind, &config.wifi.interface, config.wifi.ap_address);

    let machine = Arc::new(ConnectivityStateMachine::new(
        WpaCliProbe::new(runner, platform),
        CommandNextStage::new(runner, config.next_stage.command.clone()),
        config.connectivity,
        shutdown,
    ));

    match machine.wait_for_connection().await {
        Ok(PollOutcome::Connected) => {
            machine.hand_off().await;
            return Ok(());
        }
        Ok(PollOutcome::Exhausted) => {}
        Err(Cancelled) => {
            info!("shutting down");
            return Ok(());
        }
    }

    let (server_handle, server_task) = run_server(config.ui.port, SetupApi::new(machine.clone()))?;

    let result = tokio::select! {
        result = machine.provision() => result,
        result = server_task => {
            match result {
                Ok(Ok(())) => debug!("server stopped normally"),
                Ok(Err(e)) => error!("server stopped with error: {e}"),
                Err(e) => error!("server task panicked: {e}"),
            }
            Err(anyhow!("provisioning portal stopped unexpectedly"))
        }
    };

    server_handle.stop(true).await;

    match result {
        Ok(()) => {
            info!("provisioning complete");
            Ok(())
        }
        Err(e) if e.downcast_ref::<Cancelled>().is_some() => {
            info!("shutting down");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}

/// Fire `trigger` on SIGINT or SIGTERM
fn forward_signals(trigger: ShutdownTrigger) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => debug!("ctrl-c received"),
            _ = sigterm.recv() => debug!("SIGTERM received"),
        }
        trigger.trigger();
    });

    Ok(())
}

fn run_server(
    port: u16,
    api: SetupApi,
) -> Result<(
    ServerHandle,
    tokio::task::JoinHandle<Result<(), std::io::Error>>,
)> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(api.clone()))
            .route("/", web::get().to(SetupApi::index))
            .route("/connect", web::post().to(SetupApi::connect))
            .route("/networks", web::get().to(SetupApi::networks))
            .route("/status", web::get().to(SetupApi::status))
            .route("/version", web::get().to(SetupApi::version))
            .default_service(web::route().to(SetupApi::index))
    })
    .workers(1)
    .bind(("0.0.0.0", port))
    .context("failed to bind server")?
    .disable_signals()
    .run();

    info!("provisioning portal listening on port {port}");

    Ok((server.handle(), tokio::spawn(server)))
}
