//! Woolly CLI: run a demo live-view server or talk to one.

use std::env;
use std::process;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use woolly::client::{ClientEvent, WoollyClient};
use woolly::config::{ClientConfig, SyncConfig, DEFAULT_PORT};
use woolly::route::Params;
use woolly::server::{view_fn, Handler, WoollyServer};
use woolly::telemetry;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Serve the demo views
    Serve { host: String, port: u16 },
    /// Print every state change of a channel
    Watch { url: String, path: String },
    /// Invoke one action and print its result
    Call {
        url: String,
        path: String,
        action: String,
        params: Value,
    },
    Help,
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    log: Option<String>,
    sync: SyncConfig,
}

fn print_usage() {
    eprintln!("Woolly {} - live views over WebSocket", VERSION);
    eprintln!();
    eprintln!("Usage: woolly serve [--host HOST] [--port PORT] [timing options]");
    eprintln!("       woolly watch <url> <path>");
    eprintln!("       woolly call <url> <path> <action> [params-json]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  serve                Serve the demo views /count and /echo/:a/:b");
    eprintln!("  watch <url> <path>   Print the state of <path> on every change");
    eprintln!("  call <url> <path> <action> [params]");
    eprintln!("                       Invoke an action and print the acknowledgement");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --host HOST          Bind address for serve (default: 127.0.0.1)");
    eprintln!("  --port PORT          Port for serve (default: {})", DEFAULT_PORT);
    eprintln!("  --tick MS            Sync loop tick interval (env WOOLLY_TICK_MS)");
    eprintln!("  --watchdog MS        Forced resync interval (env WOOLLY_WATCHDOG_MS)");
    eprintln!("  --idle MS            Idle channel grace period (env WOOLLY_IDLE_GRACE_MS)");
    eprintln!("  --socket-path PATH   Socket path prefix (env WOOLLY_SOCKET_PATH)");
    eprintln!("  --log FILTER         Log filter, overrides RUST_LOG");
    eprintln!("  --help, -h           Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  woolly serve --port 3000");
    eprintln!("  woolly watch ws://127.0.0.1:3000 /count");
    eprintln!("  woolly call ws://127.0.0.1:3000 /count inc");
    eprintln!("  woolly call ws://127.0.0.1:3000 /echo/foo/bar check '{{\"x\": 10}}'");
}

fn usage_error(message: &str) -> ! {
    eprintln!("{}", message);
    print_usage();
    process::exit(64);
}

fn parse_millis(flag: &str, value: Option<&String>) -> Duration {
    let Some(value) = value else {
        usage_error(&format!("{} requires a value in milliseconds", flag));
    };
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Duration::from_millis(ms),
        _ => usage_error(&format!("Invalid value for {}: {}", flag, value)),
    }
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut options = Options {
        command: Command::Help,
        log: None,
        sync: SyncConfig::from_env(),
    };
    let mut host = "127.0.0.1".to_string();
    let mut port = DEFAULT_PORT;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--help" | "-h" => {
                options.command = Command::Help;
                return options;
            }
            "--host" => {
                i += 1;
                host = args
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| usage_error("--host requires an address"));
            }
            "--port" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    usage_error("--port requires a port number");
                };
                port = value
                    .parse()
                    .unwrap_or_else(|_| usage_error(&format!("Invalid port number: {}", value)));
            }
            "--tick" => {
                i += 1;
                options.sync.tick_interval = parse_millis("--tick", args.get(i));
            }
            "--watchdog" => {
                i += 1;
                options.sync.watchdog_interval = parse_millis("--watchdog", args.get(i));
            }
            "--idle" => {
                i += 1;
                options.sync.idle_grace = parse_millis("--idle", args.get(i));
            }
            "--socket-path" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    usage_error("--socket-path requires a path");
                };
                options.sync = options.sync.clone().with_socket_path(path);
            }
            "--log" => {
                i += 1;
                options.log = Some(
                    args.get(i)
                        .cloned()
                        .unwrap_or_else(|| usage_error("--log requires a filter")),
                );
            }
            other if other.starts_with("--") => {
                usage_error(&format!("Unknown option: {}", other));
            }
            _ => positional.push(arg.clone()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    options.command = match positional.next().as_deref() {
        None => Command::Help,
        Some("serve") => Command::Serve { host, port },
        Some("watch") => {
            let (Some(url), Some(path)) = (positional.next(), positional.next()) else {
                usage_error("watch requires a server url and a path");
            };
            Command::Watch { url, path }
        }
        Some("call") => {
            let (Some(url), Some(path), Some(action)) =
                (positional.next(), positional.next(), positional.next())
            else {
                usage_error("call requires a server url, a path and an action name");
            };
            let params = match positional.next() {
                Some(raw) => serde_json::from_str(&raw)
                    .unwrap_or_else(|e| usage_error(&format!("Invalid params JSON: {}", e))),
                None => Value::Object(Default::default()),
            };
            Command::Call {
                url,
                path,
                action,
                params,
            }
        }
        Some(other) => usage_error(&format!("Unknown command: {}", other)),
    };
    if let Some(extra) = positional.next() {
        usage_error(&format!("Unexpected argument: {}", extra));
    }

    options
}

fn main() {
    let options = parse_args();
    if let Command::Help = options.command {
        print_usage();
        return;
    }

    if let Err(e) = telemetry::init(options.log.as_deref()) {
        eprintln!("{}", e);
        process::exit(64);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    let client_config = ClientConfig::default().with_socket_path(&options.sync.socket_path);
    let code = runtime.block_on(async move {
        match options.command {
            Command::Serve { host, port } => run_serve(options.sync, &host, port).await,
            Command::Watch { url, path } => run_watch(client_config, &url, &path).await,
            Command::Call {
                url,
                path,
                action,
                params,
            } => run_call(client_config, &url, &path, &action, params).await,
            Command::Help => 0,
        }
    });
    process::exit(code);
}

fn demo_server(config: SyncConfig) -> WoollyServer {
    let server = WoollyServer::with_config(config);
    let counter = Arc::new(AtomicI64::new(0));
    let (view, inc, dec, reset) = (counter.clone(), counter.clone(), counter.clone(), counter);

    let count = Handler::new("/count", view_fn(move |_: &Params| view.load(Ordering::SeqCst)))
        .action("inc", move |_| {
            Ok::<_, String>(inc.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .action("dec", move |_| {
            Ok::<_, String>(dec.fetch_sub(1, Ordering::SeqCst) - 1)
        })
        .action("reset", move |_| {
            reset.store(0, Ordering::SeqCst);
            Ok::<_, String>(0)
        });

    let echo = Handler::new("/echo/:a/:b", view_fn(|params: &Params| params.clone()))
        .action("check", |params| Ok::<_, String>(Value::Object(params)));

    let registered = server
        .handler(count)
        .and_then(|server| server.handler(echo))
        .map(|_| ());
    if let Err(e) = registered {
        tracing::error!(target: "woolly::cli", error = %e, "invalid demo route");
    }
    server
}

async fn run_serve(config: SyncConfig, host: &str, port: u16) -> i32 {
    let socket_path = config.socket_path.clone();
    let server = demo_server(config);
    let addr = match server.listen((host, port)).await {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Failed to listen on {}:{}: {}", host, port, e);
            return 1;
        }
    };

    println!("Woolly listening on ws://{}{}", addr, socket_path);
    println!("  views: /count (inc, dec, reset), /echo/:a/:b (check)");

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to wait for shutdown signal: {}", e);
    }
    server.close().await;
    0
}

async fn run_watch(config: ClientConfig, url: &str, path: &str) -> i32 {
    let client = WoollyClient::with_config(config);
    let mut events = client.subscribe();
    if let Err(e) = client.connect(url, path).await {
        eprintln!("Failed to connect: {}", e);
        return 1;
    }

    loop {
        match events.recv().await {
            Ok(ClientEvent::Changed(state)) => println!("{}", state),
            Ok(ClientEvent::Ready { actions, .. }) => {
                let names: Vec<&str> = actions.iter().map(|a| a.name()).collect();
                eprintln!("ready, actions: {}", names.join(", "));
            }
            Ok(ClientEvent::Error(message)) => eprintln!("error: {}", message),
            Ok(ClientEvent::Disconnected) => return 0,
            Ok(ClientEvent::Connected) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                eprintln!("missed {} notifications", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return 0,
        }
    }
}

async fn run_call(
    config: ClientConfig,
    url: &str,
    path: &str,
    action: &str,
    params: Value,
) -> i32 {
    let client = WoollyClient::with_config(config);
    let mut events = client.subscribe();
    if let Err(e) = client.connect(url, path).await {
        eprintln!("Failed to connect: {}", e);
        return 1;
    }

    // Wait for the handshake so unknown channels fail fast.
    loop {
        match events.recv().await {
            Ok(ClientEvent::Ready { .. }) => break,
            Ok(ClientEvent::Error(message)) => {
                eprintln!("error: {}", message);
                return 1;
            }
            Ok(ClientEvent::Disconnected) | Err(_) => {
                eprintln!("disconnected before the handshake completed");
                return 1;
            }
            Ok(_) => {}
        }
    }

    let code = match client.invoke(action, params).await {
        Ok(result) => {
            println!("{}", result);
            0
        }
        Err(e) => {
            eprintln!("{} failed: {}", action, e);
            1
        }
    };
    client.disconnect();
    code
}
