use std::sync::Arc;

use titlebot_common::config::AppConfig;
use titlebot_engine::{
    Alerter, ChannelRegistry, DeliverySettings, Dispatcher, PipelineSettings,
};
use titlebot_irc::{IrcClient, IrcConfig};
use titlebot_titles::{HttpTitleFetcher, HttpTitleFetcherConfig, RegexUrlFinder};

const DEFAULT_LOG_FILTER: &str =
    "titlebot=info,titlebot_irc=info,titlebot_engine=info,titlebot_titles=info";

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration; it decides the log format
    let config = AppConfig::from_env()?;
    init_tracing(config.log_json);

    tracing::info!("Titlebot starting...");
    tracing::info!(
        channels = %config.channels.join(", "),
        max_workers_per_channel = config.max_workers_per_channel,
        title_timeout_secs = config.title_timeout_secs,
        "Serving channels"
    );
    let mut client = IrcClient::new(IrcConfig::from_app_config(&config));
    let transport = Arc::new(client.transport());
    let alerter = Alerter::new(transport.clone(), config.alerts_channel.clone());
    tracing::info!(
        alerts_channel = alerter.alerts_channel().unwrap_or("none"),
        "Alerts will be sent to the alerts channel"
    );

    let fetcher = HttpTitleFetcher::new(HttpTitleFetcherConfig {
        user_agent: config.user_agent.clone(),
        timeout: config.http_timeout(),
        verify_tls: config.http_verify_tls,
        max_body_bytes: config.http_max_body_bytes,
    })?;

    let settings = PipelineSettings {
        max_workers: config.max_workers_per_channel,
        delivery: DeliverySettings {
            timeout: config.title_timeout(),
            prefix: config.title_prefix.clone(),
            skip_titles: config.skip_titles.clone(),
        },
    };
    let registry = ChannelRegistry::start(
        &config.channels,
        &settings,
        Arc::new(fetcher),
        transport,
        alerter.clone(),
    );
    let started: Vec<&str> = registry.channel_names().into_iter().map(|c| c.as_str()).collect();
    tracing::info!(channels = %started.join(", "), "Channel pipelines started");

    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        Arc::new(RegexUrlFinder::new()),
        alerter,
        config.ignores.clone(),
    );
    client.set_inbound_handler(Arc::new(dispatcher));

    // Run until Ctrl+C, then leave the network cleanly
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received shutdown signal, stopping gracefully...");
    };

    if let Err(e) = client.run(shutdown).await {
        tracing::error!(error = %e, "IRC client exited with error");
        return Err(e.into());
    }

    tracing::info!("Titlebot stopped.");
    Ok(())
}
