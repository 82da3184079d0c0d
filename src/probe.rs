//! probe command: Fetch one site and report what came back
//!
//! Output is one compact JSON object on stdout, progress on stderr.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use sitefetch::{
    ChromiumBackend, Dispatcher, EmulatedFetcher, FetchConfig, FetchRequest, RegistryBuilder,
    ReqwestTransport, SiteSchema, StaticProxy,
};
use std::path::PathBuf;

#[derive(Args)]
pub struct ProbeArgs {
    /// Site URL (e.g. https://tracker.example)
    #[arg(long)]
    url: String,

    /// Site name used in logs
    #[arg(long, default_value = "site")]
    site: String,

    /// Cookie header of a logged-in session
    #[arg(long, env = "SITEFETCH_COOKIE", hide_env_values = true)]
    cookie: Option<String>,

    /// User-Agent to send
    #[arg(long)]
    user_agent: Option<String>,

    /// Fetch through headless Chrome (falls back to plain HTTP if Chrome is missing)
    #[arg(long)]
    emulate: bool,

    /// Route requests through --proxy-url
    #[arg(long)]
    proxy: bool,

    /// Proxy URL (e.g. http://127.0.0.1:7890)
    #[arg(long, env = "SITEFETCH_PROXY")]
    proxy_url: Option<String>,

    /// Timeout per request in milliseconds
    #[arg(long, default_value = "20000")]
    timeout: u64,

    /// Chrome/Chromium executable
    #[arg(long, env = "SITEFETCH_CHROME")]
    chrome: Option<PathBuf>,
}

/// Probe result (compact)
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub site: String,
    pub url: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SiteSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    pub len: usize,
}

/// Run the probe command
pub async fn run_probe(args: ProbeArgs) -> Result<()> {
    let report = probe(&args).await?;

    println!("{}", serde_json::to_string(&report)?);

    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn probe(args: &ProbeArgs) -> Result<ProbeReport> {
    let parsed = url::Url::parse(&args.url).with_context(|| format!("Invalid URL: {}", args.url))?;
    let url = parsed.as_str().trim_end_matches('/').to_string();

    let transport = ReqwestTransport::new(FetchConfig {
        timeout_ms: args.timeout,
        ..FetchConfig::default()
    });
    let mut dispatcher = Dispatcher::new(RegistryBuilder::new().register_snapshots(), transport)?
        .with_proxy_source(StaticProxy::new(args.proxy_url.clone()));

    if args.emulate {
        eprintln!("Launching Chrome...");
        let backend =
            ChromiumBackend::launch_or_unavailable(args.chrome.clone(), args.timeout).await;
        dispatcher = dispatcher.with_browser(EmulatedFetcher::new(backend));
    }

    let mut request = FetchRequest::new(url.clone(), args.site.clone())
        .emulate(args.emulate)
        .proxy(args.proxy);
    request.cookie = args.cookie.clone();
    request.user_agent = args.user_agent.clone();

    eprintln!("  -> {}", url);

    let report = match dispatcher.try_build(&request).await {
        Ok(parser) => ProbeReport {
            site: args.site.clone(),
            url,
            ok: true,
            schema: Some(parser.schema()),
            err: None,
            len: parser.html().len(),
        },
        Err(e) => ProbeReport {
            site: args.site.clone(),
            url,
            ok: false,
            schema: None,
            err: Some(e.to_string()),
            len: 0,
        },
    };
    Ok(report)
}
