use clap::Parser;
use duckpond::cli::Cli;
use duckpond::config::Settings;
use std::io::Read;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&settings.log_level);

    if cli.wants_post_mode() {
        return run_post_mode(&cli, &settings).await;
    }

    run_server(&settings).await
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_server(settings: &Settings) -> ExitCode {
    let app = match duckpond::build_app(settings) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("failed to build app: {err}");
            return ExitCode::FAILURE;
        }
    };

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("failed to bind {addr}: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%addr, "duckpond listening");
    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("server error: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// `--post /query|/parse`: a one-shot client. Reads a single SQL statement
/// from stdin, submits it to the running server named by `settings.host`/
/// `settings.port`, and prints the JSON response.
async fn run_post_mode(cli: &Cli, settings: &Settings) -> ExitCode {
    let path = cli.post.as_deref().unwrap_or("/query");

    let mut body = String::new();
    if let Err(err) = std::io::stdin().read_to_string(&mut body) {
        eprintln!("failed to read statement from stdin: {err}");
        return ExitCode::FAILURE;
    }
    let body = body.trim().to_string();

    let url = format!("http://{}:{}{}", settings.host, settings.port, path);
    let client = reqwest::Client::new();
    let mut request = client.post(&url).body(body);
    if let Some(token) = &settings.bearer_token {
        request = request.bearer_auth(token);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            eprintln!("request to {url} failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    println!("{text}");

    if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
