use anyhow::Context;

pub(crate) struct Args {
    pub endpoint: Option<String>,
    pub registry_url: Option<String>,
    pub camera_id: Option<String>,
    pub config_path: Option<String>,
    pub stun_urls: Vec<String>,
}

pub(crate) fn parse_args() -> anyhow::Result<Args> {
    let mut endpoint = None;
    let mut registry_url = None;
    let mut camera_id = None;
    let mut config_path = None;
    let mut stun_urls: Vec<String> = Vec::new();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-V" | "--version" => {
                println!("farmsight-viewer {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-h" | "--help" => {
                println!("farmsight-viewer - headless camera stream viewer");
                println!();
                println!("USAGE:");
                println!("    farmsight-viewer [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    --endpoint <URL>         Camera negotiation endpoint (skips the registry)");
                println!("    --registry-url <URL>     Camera registry base URL");
                println!("    --camera-id <ID>         Camera to resolve via the registry");
                println!("    --config <PATH>          Stream configuration TOML file");
                println!("    --stun <URL>             STUN server URL (repeatable, overrides config)");
                println!("    -V, --version            Print version and exit");
                println!("    -h, --help               Print this help and exit");
                std::process::exit(0);
            }
            "--endpoint" => {
                i += 1;
                endpoint = Some(args.get(i).context("Missing --endpoint value")?.clone());
            }
            "--registry-url" => {
                i += 1;
                registry_url = Some(args.get(i).context("Missing --registry-url value")?.clone());
            }
            "--camera-id" => {
                i += 1;
                camera_id = Some(args.get(i).context("Missing --camera-id value")?.clone());
            }
            "--config" => {
                i += 1;
                config_path = Some(args.get(i).context("Missing --config value")?.clone());
            }
            "--stun" => {
                i += 1;
                stun_urls.push(args.get(i).context("Missing --stun value")?.clone());
            }
            other => anyhow::bail!("Unknown argument: {other}"),
        }
        i += 1;
    }

    if endpoint.is_none() && (registry_url.is_none() || camera_id.is_none()) {
        anyhow::bail!("Either --endpoint or both --registry-url and --camera-id are required");
    }

    Ok(Args {
        endpoint,
        registry_url,
        camera_id,
        config_path,
        stun_urls,
    })
}
