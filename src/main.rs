use anyhow::{Context, Result};
use switcheroo_status::{
    arg_parser::ArgsOptions, config_manager::ConfigManager,
    consumer::LabelConsumer, logger, poller::Poller,
};
use tokio::{
    select,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logging();

    // Parse the command line arguments
    let args_options = ArgsOptions::parse();

    // Load the configuration and apply the command line overrides
    let mut config = ConfigManager::new(&args_options.config_file_path)
        .load()
        .with_context(|| "Failed to load the configuration")?;
    args_options.apply(&mut config);

    // The active GPU label is printed on stdout
    let consumer = LabelConsumer::new(std::io::stdout());
    let mut poller = Poller::from_config(&config, consumer)
        .with_context(|| "Failed to set up the switcheroo poller")?;

    if args_options.once {
        let active = poller.poll().await;
        info!("Active GPU: {}", active.label());

        return Ok(());
    }

    // This token and tracker will be used to handle graceful shutdown
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    // Start the poller
    {
        let token = token.clone();

        tracker.spawn(async move {
            poller.run(token).await;
        });
    }

    wait_for_shutdown().await?;

    // Cancel the token to stop the timer, no poll
    // is reported after this point
    token.cancel();

    // Wait for the tasks to finish
    tracker.close();
    tracker.wait().await;

    Ok(())
}

// Wait for either SIGINT or SIGTERM
async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())
        .with_context(|| "Failed to install the SIGTERM handler")?;

    select! {
        result = ctrl_c() => {
            result.with_context(|| "Failed to listen for Ctrl-C")?;
        }
        _ = terminate.recv() => {}
    }

    info!("Shutting down");

    Ok(())
}
