use anyhow::Context;
use log::info;
use quota_guard::cli;
use quota_guard::config::Config;
use quota_guard::http::GuardedClient;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::build_cli();
    let matches = cmd.get_matches();
    let log_level = matches.get_one::<String>("log-level").cloned();
    let version_flag = matches.get_flag("version");

    cli::init_logging(log_level.as_deref());

    if version_flag {
        println!("quota-guard {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let raw_url = matches
        .get_one::<String>("url")
        .context("--url is required")?;
    let count = *matches.get_one::<u32>("count").expect("defaulted");

    let target = url::Url::parse(raw_url).context("invalid --url")?;
    let mut path = target.path().to_string();
    if let Some(query) = target.query() {
        path.push('?');
        path.push_str(query);
    }
    let mut cfg = Config::from_env();
    cfg.base_url = target.origin().ascii_serialization();

    info!("probing {} ({} requests)", raw_url, count);
    let client = GuardedClient::new(cfg)?;
    for i in 1..=count {
        let res = client.get_text_with_accept(&path, "*/*").await;
        let line = serde_json::json!({
            "request": i,
            "status": res.status.as_u16(),
            "quota": res.quota,
            "error": res.error,
        });
        println!("{}", line);
    }
    Ok(())
}
